//! Source and destination resolution for COPY and ADD, matching Docker's
//! reference semantics: environment replacement, wildcard matching, source
//! validation, and destination path computation.

use std::collections::{BTreeMap, HashSet};

use glob::{MatchOptions, Pattern};
use kbuild_core::error::{BuildError, Result};

use crate::context::BuildContext;

/// Wildcard matching is per path segment, like Go's `filepath.Match`:
/// `*` and `?` never cross a `/`.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Expand `$VAR` and `${VAR}` references against the image config env.
///
/// `\$` is a literal `$`; unknown variables expand to the empty string.
/// Trailing slashes survive expansion, which matters because they drive the
/// dest-is-directory rule.
pub fn resolve_environment(value: &str, env: &[String]) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                chars.next();
                out.push('$');
            }
            '$' => {
                let braced = chars.peek() == Some(&'{');
                if braced {
                    chars.next();
                }
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if braced && next == '}' {
                        chars.next();
                        break;
                    }
                    if !braced && !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                if name.is_empty() {
                    out.push('$');
                } else {
                    out.push_str(lookup_env(&name, env).unwrap_or(""));
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Expand every value in `values`.
pub fn resolve_environment_list(values: &[String], env: &[String]) -> Vec<String> {
    values.iter().map(|v| resolve_environment(v, env)).collect()
}

fn lookup_env<'a>(name: &str, env: &'a [String]) -> Option<&'a str> {
    env.iter().find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}

/// True if any source contains a wildcard metacharacter.
pub fn contains_wildcards<S: AsRef<str>>(sources: &[S]) -> bool {
    sources
        .iter()
        .any(|s| s.as_ref().contains(['*', '?', '[']))
}

/// Destinations are directories iff they end in `/`.
pub fn is_dest_dir(path: &str) -> bool {
    path.ends_with('/')
}

/// True for the URL sources only ADD accepts.
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Lexical path cleaning in the manner of Go's `filepath.Clean`.
pub fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        match comp {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Join path segments and clean the result (Go `filepath.Join`).
pub fn go_join(segments: &[&str]) -> String {
    let non_empty: Vec<&str> = segments.iter().copied().filter(|s| !s.is_empty()).collect();
    clean_path(&non_empty.join("/"))
}

/// The path of `file` relative to `src`, both cleaned. `"."` when equal.
pub fn rel_path(src: &str, file: &str) -> String {
    let src = clean_path(src);
    let file = clean_path(file);
    if src == file {
        return ".".to_string();
    }
    if src == "." {
        return file;
    }
    if src == "/" {
        return file.trim_start_matches('/').to_string();
    }
    match file.strip_prefix(&format!("{}/", src)) {
        Some(rest) => rest.to_string(),
        None => file,
    }
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

fn rooted(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// Match wildcard sources against the full context file list.
///
/// Each comparison is tried twice: the source and file as written, and both
/// rooted with a leading `/`. The second form makes `COPY /pkg/* /dst/`
/// match the context file `pkg/a`, and a relative pattern match a file
/// listed absolutely.
pub fn match_sources<S: AsRef<str>>(sources: &[S], files: &[String]) -> Result<Vec<String>> {
    let mut matched = Vec::new();
    let mut seen = HashSet::new();
    for src in sources {
        let cleaned = clean_path(src.as_ref());
        let pattern = Pattern::new(&cleaned)
            .map_err(|e| BuildError::Resolve(format!("bad pattern {}: {}", cleaned, e)))?;
        let rooted_pattern = Pattern::new(&rooted(&cleaned))
            .map_err(|e| BuildError::Resolve(format!("bad pattern {}: {}", cleaned, e)))?;
        for file in files {
            if pattern.matches_with(file, MATCH_OPTIONS)
                || rooted_pattern.matches_with(&rooted(file), MATCH_OPTIONS)
            {
                if seen.insert(file.clone()) {
                    matched.push(file.clone());
                }
            }
        }
    }
    Ok(matched)
}

/// True if `file` was named by one of the source specs directly:
/// `match(src, file) || src == file`. ADD only untars archives that pass
/// this predicate.
pub fn is_filename_source<'a>(
    mut sources: impl Iterator<Item = &'a String>,
    file: &str,
) -> Result<bool> {
    sources.try_fold(false, |found, src| {
        if found {
            return Ok(true);
        }
        let pattern = Pattern::new(src)
            .map_err(|e| BuildError::Resolve(format!("bad pattern {}: {}", src, e)))?;
        Ok(pattern.matches_with(file, MATCH_OPTIONS) || src == file)
    })
}

/// Map each source to the files rooted at it, resolving wildcards first and
/// validating the result.
///
/// Keys are cleaned, context-relative source paths; values are
/// context-relative file lists (the source entry itself included, so
/// directory sources materialize their directory).
pub fn resolve_sources<S: AsRef<str>>(
    sources: &[S],
    dest: &str,
    ctx: &BuildContext,
) -> Result<BTreeMap<String, Vec<String>>> {
    let resolved: Vec<String> = if contains_wildcards(sources) {
        tracing::debug!("resolving wildcard sources");
        let files = ctx.list("")?;
        match_sources(sources, &files)?
    } else {
        sources.iter().map(|s| s.as_ref().to_string()).collect()
    };

    let src_map = sources_to_files_map(&resolved, ctx)?;
    validate_sources(sources, dest, &src_map)?;
    Ok(src_map)
}

fn sources_to_files_map(sources: &[String], ctx: &BuildContext) -> Result<BTreeMap<String, Vec<String>>> {
    let mut map = BTreeMap::new();
    for src in sources {
        // Literal sources are context-relative by definition; a leading
        // slash is rooted at the context, not the host.
        let cleaned = clean_path(src.trim_start_matches('/'));
        if cleaned == ".." || cleaned.starts_with("../") {
            return Err(BuildError::InvalidSources(format!(
                "source {} escapes the build context",
                src
            )));
        }
        let files = ctx.list(&cleaned)?;
        map.insert(cleaned, files);
    }
    Ok(map)
}

fn validate_sources<S: AsRef<str>>(
    sources: &[S],
    dest: &str,
    src_map: &BTreeMap<String, Vec<String>>,
) -> Result<()> {
    let total: usize = src_map.values().map(Vec::len).sum();
    if total == 0 {
        return Err(BuildError::InvalidSources(
            "no source files matched".to_string(),
        ));
    }
    if !contains_wildcards(sources) {
        if sources.len() > 1 && !is_dest_dir(dest) {
            return Err(BuildError::InvalidSources(
                "with multiple sources the destination must be a directory and end in '/'"
                    .to_string(),
            ));
        }
        return Ok(());
    }
    if total > 1 && !is_dest_dir(dest) {
        return Err(BuildError::InvalidSources(
            "with multiple sources the destination must be a directory and end in '/'".to_string(),
        ));
    }
    Ok(())
}

/// Compute where `file` (resolved from source spec `src`) lands in the
/// image filesystem.
///
/// If the source is a directory or the destination names a directory, the
/// file keeps its path relative to the source under the destination;
/// otherwise the destination is the literal target filename. Relative
/// destinations are rooted at `cwd`.
pub fn destination_filepath(
    file: &str,
    src: &str,
    dest: &str,
    cwd: &str,
    src_is_dir: bool,
    file_is_dir: bool,
) -> String {
    if src_is_dir || is_dest_dir(dest) {
        let mut rel = rel_path(src, file);
        if rel == "." && !file_is_dir {
            rel = basename(file).to_string();
        }
        if dest.starts_with('/') {
            go_join(&[dest, &rel])
        } else {
            go_join(&[cwd, dest, &rel])
        }
    } else if dest.starts_with('/') {
        dest.to_string()
    } else {
        go_join(&[cwd, dest])
    }
}
