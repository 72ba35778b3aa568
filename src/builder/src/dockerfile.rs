//! Dockerfile parser.
//!
//! Parses a Dockerfile into `FROM`-rooted stages, each holding an ordered
//! list of instructions. Supports line continuations (`\`), comments, and
//! both shell and JSON (exec) forms for RUN/CMD/ENTRYPOINT.

use kbuild_core::error::{BuildError, Result};

/// A single Dockerfile instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `RUN <command>` or `RUN ["exec", "form"]`
    Run {
        cmdline: Vec<String>,
        prepend_shell: bool,
    },
    /// `COPY [--from=<stage>] [--chown=<user>] <src>... <dst>`
    Copy {
        sources: Vec<String>,
        dest: String,
        from: Option<String>,
        chown: Option<String>,
    },
    /// `ADD [--chown=<user>] <src>... <dst>`
    Add {
        sources: Vec<String>,
        dest: String,
        chown: Option<String>,
    },
    /// `ENV <key>=<value> ...` or `ENV <key> <value>`
    Env { pairs: Vec<(String, String)> },
    /// `WORKDIR <path>`
    Workdir { path: String },
    /// `EXPOSE <port>[/<proto>] ...`
    Expose { ports: Vec<String> },
    /// `CMD ["exec", "form"]` or `CMD command`
    Cmd {
        argv: Vec<String>,
        prepend_shell: bool,
    },
    /// `ENTRYPOINT ["exec", "form"]` or `ENTRYPOINT command`
    Entrypoint {
        argv: Vec<String>,
        prepend_shell: bool,
    },
    /// `USER <user>[:<group>]`
    User { user: String },
    /// `VOLUME ["/path", ...]` or `VOLUME /path ...`
    Volume { paths: Vec<String> },
    /// `LABEL <key>=<value> ...`
    Label { pairs: Vec<(String, String)> },
}

/// One `FROM`-rooted segment of a Dockerfile.
#[derive(Debug, Clone)]
pub struct Stage {
    pub index: usize,
    pub name: Option<String>,
    pub base_image_ref: String,
    pub instructions: Vec<Instruction>,
}

/// Parse a Dockerfile into its stages.
pub fn parse(content: &str) -> Result<Vec<Stage>> {
    let mut stages: Vec<Stage> = Vec::new();

    for line in join_continuation_lines(content) {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let (keyword, rest) = split_first_word(trimmed);
        if keyword.eq_ignore_ascii_case("FROM") {
            let (image, name) = parse_from(rest)?;
            stages.push(Stage {
                index: stages.len(),
                name,
                base_image_ref: image,
                instructions: Vec::new(),
            });
            continue;
        }

        let stage = stages.last_mut().ok_or_else(|| {
            BuildError::Parse("first instruction must be FROM".to_string())
        })?;
        stage.instructions.push(parse_instruction(keyword, rest)?);
    }

    if stages.is_empty() {
        return Err(BuildError::Parse(
            "Dockerfile is empty or contains no instructions".to_string(),
        ));
    }
    Ok(stages)
}

/// Resolve a `COPY --from` reference (stage index or stage name) to the
/// index of the stage it names.
pub fn stage_index(stages: &[Stage], reference: &str) -> Option<usize> {
    if let Ok(index) = reference.parse::<usize>() {
        return (index < stages.len()).then_some(index);
    }
    stages
        .iter()
        .find(|s| s.name.as_deref() == Some(reference))
        .map(|s| s.index)
}

/// Join lines ending with `\` into single logical lines.
fn join_continuation_lines(content: &str) -> Vec<String> {
    let mut logical_lines = Vec::new();
    let mut current = String::new();

    for line in content.lines() {
        if let Some(stripped) = line.strip_suffix('\\') {
            current.push_str(stripped.trim_end());
            current.push(' ');
        } else {
            current.push_str(line);
            logical_lines.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        logical_lines.push(current);
    }
    logical_lines
}

fn split_first_word(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.find(char::is_whitespace) {
        Some(pos) => (&s[..pos], s[pos..].trim_start()),
        None => (s, ""),
    }
}

fn parse_instruction(keyword: &str, rest: &str) -> Result<Instruction> {
    match keyword.to_uppercase().as_str() {
        "RUN" => parse_run(rest),
        "COPY" => parse_copy(rest),
        "ADD" => parse_add(rest),
        "ENV" => parse_env(rest),
        "WORKDIR" => parse_workdir(rest),
        "EXPOSE" => parse_expose(rest),
        "CMD" => parse_cmd_like(rest, "CMD").map(|(argv, prepend_shell)| Instruction::Cmd {
            argv,
            prepend_shell,
        }),
        "ENTRYPOINT" => {
            parse_cmd_like(rest, "ENTRYPOINT").map(|(argv, prepend_shell)| Instruction::Entrypoint {
                argv,
                prepend_shell,
            })
        }
        "USER" => parse_user(rest),
        "VOLUME" => parse_volume(rest),
        "LABEL" => parse_label(rest),
        other => Err(BuildError::Parse(format!(
            "unsupported instruction '{}'",
            other
        ))),
    }
}

// --- Individual instruction parsers ---

fn parse_from(rest: &str) -> Result<(String, Option<String>)> {
    if rest.is_empty() {
        return Err(BuildError::Parse("FROM requires an image argument".to_string()));
    }
    let parts: Vec<&str> = rest.split_whitespace().collect();
    match parts.as_slice() {
        [image] => Ok((image.to_string(), None)),
        [image, kw, name] if kw.eq_ignore_ascii_case("AS") => {
            Ok((image.to_string(), Some(name.to_string())))
        }
        _ => Err(BuildError::Parse(format!("invalid FROM: '{}'", rest))),
    }
}

fn parse_run(rest: &str) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(BuildError::Parse("RUN requires a command".to_string()));
    }
    if rest.starts_with('[') {
        return Ok(Instruction::Run {
            cmdline: parse_json_array(rest)?,
            prepend_shell: false,
        });
    }
    Ok(Instruction::Run {
        cmdline: vec![rest.to_string()],
        prepend_shell: true,
    })
}

fn parse_copy(rest: &str) -> Result<Instruction> {
    let (flags, operands) = split_flags(rest);
    let mut from = None;
    let mut chown = None;
    for flag in flags {
        if let Some(value) = flag.strip_prefix("--from=") {
            from = Some(value.to_string());
        } else if let Some(value) = flag.strip_prefix("--chown=") {
            chown = Some(value.to_string());
        } else {
            return Err(BuildError::Parse(format!("unknown COPY flag '{}'", flag)));
        }
    }
    let (sources, dest) = split_sources_and_dest(&operands, "COPY")?;
    Ok(Instruction::Copy {
        sources,
        dest,
        from,
        chown,
    })
}

fn parse_add(rest: &str) -> Result<Instruction> {
    let (flags, operands) = split_flags(rest);
    let mut chown = None;
    for flag in flags {
        if let Some(value) = flag.strip_prefix("--chown=") {
            chown = Some(value.to_string());
        } else {
            return Err(BuildError::Parse(format!("unknown ADD flag '{}'", flag)));
        }
    }
    let (sources, dest) = split_sources_and_dest(&operands, "ADD")?;
    Ok(Instruction::Add {
        sources,
        dest,
        chown,
    })
}

fn parse_env(rest: &str) -> Result<Instruction> {
    let pairs = parse_pairs(rest, "ENV")?;
    Ok(Instruction::Env { pairs })
}

fn parse_workdir(rest: &str) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(BuildError::Parse("WORKDIR requires a path".to_string()));
    }
    Ok(Instruction::Workdir {
        path: rest.to_string(),
    })
}

fn parse_expose(rest: &str) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(BuildError::Parse("EXPOSE requires a port".to_string()));
    }
    Ok(Instruction::Expose {
        ports: rest.split_whitespace().map(str::to_string).collect(),
    })
}

fn parse_cmd_like(rest: &str, keyword: &str) -> Result<(Vec<String>, bool)> {
    if rest.is_empty() {
        return Err(BuildError::Parse(format!("{} requires an argument", keyword)));
    }
    if rest.starts_with('[') {
        return Ok((parse_json_array(rest)?, false));
    }
    Ok((vec![rest.to_string()], true))
}

fn parse_user(rest: &str) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(BuildError::Parse("USER requires a username".to_string()));
    }
    Ok(Instruction::User {
        user: rest
            .split_whitespace()
            .next()
            .unwrap_or(rest)
            .to_string(),
    })
}

fn parse_volume(rest: &str) -> Result<Instruction> {
    if rest.is_empty() {
        return Err(BuildError::Parse("VOLUME requires a path".to_string()));
    }
    let paths = if rest.starts_with('[') {
        parse_json_array(rest)?
    } else {
        rest.split_whitespace().map(str::to_string).collect()
    };
    Ok(Instruction::Volume { paths })
}

fn parse_label(rest: &str) -> Result<Instruction> {
    let pairs = parse_pairs(rest, "LABEL")?;
    Ok(Instruction::Label { pairs })
}

// --- Helpers ---

/// Leading `--flag` tokens, then the quoted-token operand list.
fn split_flags(rest: &str) -> (Vec<String>, Vec<String>) {
    let tokens = shell_split(rest);
    let flag_count = tokens.iter().take_while(|t| t.starts_with("--")).count();
    let flags = tokens[..flag_count].to_vec();
    let operands = tokens[flag_count..].to_vec();
    (flags, operands)
}

fn split_sources_and_dest(operands: &[String], keyword: &str) -> Result<(Vec<String>, String)> {
    if operands.len() < 2 {
        return Err(BuildError::Parse(format!(
            "{} requires at least one source and a destination",
            keyword
        )));
    }
    let dest = operands[operands.len() - 1].clone();
    let sources = operands[..operands.len() - 1].to_vec();
    Ok((sources, dest))
}

/// Parse `K=V K2="v 2"` pairs, falling back to the legacy `KEY VALUE` form.
fn parse_pairs(rest: &str, keyword: &str) -> Result<Vec<(String, String)>> {
    if rest.is_empty() {
        return Err(BuildError::Parse(format!(
            "{} requires a key and value",
            keyword
        )));
    }
    let first_word_has_eq = rest
        .split_whitespace()
        .next()
        .is_some_and(|w| w.contains('='));
    if !first_word_has_eq {
        let (key, value) = split_first_word(rest);
        if value.is_empty() {
            return Err(BuildError::Parse(format!(
                "{} requires a key and value",
                keyword
            )));
        }
        return Ok(vec![(key.to_string(), unquote(value))]);
    }

    let mut pairs = Vec::new();
    for token in shell_split(rest) {
        let (key, value) = token.split_once('=').ok_or_else(|| {
            BuildError::Parse(format!("{}: expected key=value, got '{}'", keyword, token))
        })?;
        pairs.push((key.to_string(), value.to_string()));
    }
    Ok(pairs)
}

/// Parse a JSON array string like `["a", "b"]`.
fn parse_json_array(s: &str) -> Result<Vec<String>> {
    serde_json::from_str(s)
        .map_err(|e| BuildError::Parse(format!("invalid JSON array '{}': {}", s, e)))
}

/// Remove surrounding quotes from a string.
fn unquote(s: &str) -> String {
    let s = s.trim();
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Whitespace tokenizer that keeps quoted spans together and strips the
/// quotes.
fn shell_split(s: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in s.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '"' | '\'' => {
                    quote = Some(c);
                    in_token = true;
                }
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                }
                _ => {
                    current.push(c);
                    in_token = true;
                }
            },
        }
    }
    if in_token {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_continuation_lines() {
        let input = "RUN apt-get update && \\\n    apt-get install -y curl";
        let lines = join_continuation_lines(input);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("apt-get update"));
        assert!(lines[0].contains("apt-get install"));
    }

    #[test]
    fn test_parse_minimal() {
        let stages = parse("FROM scratch\nCOPY foo /bar").unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].base_image_ref, "scratch");
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Copy {
                sources: vec!["foo".to_string()],
                dest: "/bar".to_string(),
                from: None,
                chown: None,
            }
        );
    }

    #[test]
    fn test_parse_multi_stage() {
        let content = "FROM golang:1.10 AS builder\nRUN make\nFROM scratch\nCOPY --from=builder /out/app /app";
        let stages = parse(content).unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name.as_deref(), Some("builder"));
        assert_eq!(stages[0].index, 0);
        assert_eq!(stages[1].index, 1);
        assert_eq!(
            stages[1].instructions[0],
            Instruction::Copy {
                sources: vec!["/out/app".to_string()],
                dest: "/app".to_string(),
                from: Some("builder".to_string()),
                chown: None,
            }
        );
    }

    #[test]
    fn test_stage_index_by_name_and_number() {
        let stages = parse("FROM a AS builder\nFROM b").unwrap();
        assert_eq!(stage_index(&stages, "builder"), Some(0));
        assert_eq!(stage_index(&stages, "0"), Some(0));
        assert_eq!(stage_index(&stages, "1"), Some(1));
        assert_eq!(stage_index(&stages, "missing"), None);
        assert_eq!(stage_index(&stages, "7"), None);
    }

    #[test]
    fn test_parse_run_shell_form() {
        let stages = parse("FROM scratch\nRUN echo hello && ls").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Run {
                cmdline: vec!["echo hello && ls".to_string()],
                prepend_shell: true,
            }
        );
    }

    #[test]
    fn test_parse_run_exec_form() {
        let stages = parse("FROM scratch\nRUN [\"echo\", \"hello\"]").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Run {
                cmdline: vec!["echo".to_string(), "hello".to_string()],
                prepend_shell: false,
            }
        );
    }

    #[test]
    fn test_parse_env_pairs() {
        let stages = parse("FROM scratch\nENV A=1 B=\"two words\"").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Env {
                pairs: vec![
                    ("A".to_string(), "1".to_string()),
                    ("B".to_string(), "two words".to_string()),
                ],
            }
        );
    }

    #[test]
    fn test_parse_env_legacy_form() {
        let stages = parse("FROM scratch\nENV MY_VAR my value").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Env {
                pairs: vec![("MY_VAR".to_string(), "my value".to_string())],
            }
        );
    }

    #[test]
    fn test_parse_copy_chown() {
        let stages = parse("FROM scratch\nCOPY --chown=1000:1000 a b /dest/").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Copy {
                sources: vec!["a".to_string(), "b".to_string()],
                dest: "/dest/".to_string(),
                from: None,
                chown: Some("1000:1000".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_add() {
        let stages = parse("FROM scratch\nADD archive.tar /x/").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Add {
                sources: vec!["archive.tar".to_string()],
                dest: "/x/".to_string(),
                chown: None,
            }
        );
    }

    #[test]
    fn test_parse_expose_multiple() {
        let stages = parse("FROM scratch\nEXPOSE 8080 9090/udp").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Expose {
                ports: vec!["8080".to_string(), "9090/udp".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_cmd_forms() {
        let stages = parse("FROM scratch\nCMD [\"app\", \"--serve\"]\nCMD app --serve").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Cmd {
                argv: vec!["app".to_string(), "--serve".to_string()],
                prepend_shell: false,
            }
        );
        assert_eq!(
            stages[0].instructions[1],
            Instruction::Cmd {
                argv: vec!["app --serve".to_string()],
                prepend_shell: true,
            }
        );
    }

    #[test]
    fn test_parse_volume_forms() {
        let stages = parse("FROM scratch\nVOLUME [\"/data\"]\nVOLUME /a /b").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Volume {
                paths: vec!["/data".to_string()],
            }
        );
        assert_eq!(
            stages[0].instructions[1],
            Instruction::Volume {
                paths: vec!["/a".to_string(), "/b".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_label_quoted() {
        let stages = parse("FROM scratch\nLABEL version=\"1.0.0\"").unwrap();
        assert_eq!(
            stages[0].instructions[0],
            Instruction::Label {
                pairs: vec![("version".to_string(), "1.0.0".to_string())],
            }
        );
    }

    #[test]
    fn test_parse_comments_and_blanks() {
        let content = "\n# comment\n\nFROM alpine\n\n# another\nRUN echo hi\n\n";
        let stages = parse(content).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].instructions.len(), 1);
    }

    #[test]
    fn test_parse_instruction_before_from() {
        assert!(matches!(
            parse("RUN echo hello"),
            Err(BuildError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_empty() {
        assert!(matches!(parse("# only comments\n"), Err(BuildError::Parse(_))));
    }

    #[test]
    fn test_parse_unsupported_instruction() {
        assert!(matches!(
            parse("FROM scratch\nHEALTHCHECK CMD true"),
            Err(BuildError::Parse(_))
        ));
    }

    #[test]
    fn test_shell_split_quotes() {
        assert_eq!(
            shell_split("a \"b c\" 'd e' f"),
            vec!["a", "b c", "d e", "f"]
        );
    }
}
