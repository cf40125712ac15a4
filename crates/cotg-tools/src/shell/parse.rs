//! Shell-like tokenization and structural classification of command lines.
//!
//! Classification is advisory: it labels commands for display and audit and
//! never executes or rejects anything.

use serde::{Deserialize, Serialize};

const READ_PROGRAMS: &[&str] = &["cat", "head", "tail"];
const SEARCH_PROGRAMS: &[&str] = &["rg", "ripgrep", "ag", "ack", "grep", "egrep", "fgrep"];
const MUTATING_PROGRAMS: &[&str] = &[
    "rm", "mv", "cp", "mkdir", "rmdir", "touch", "chmod", "chown", "ln", "truncate", "tee",
];
const NETWORK_PROGRAMS: &[&str] = &[
    "curl", "wget", "nc", "ncat", "netcat", "ssh", "scp", "rsync", "ping",
];
const GIT_NETWORK_SUBCOMMANDS: &[&str] = &["clone", "fetch", "pull", "push"];

/// Structural label for a command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedCommand {
    Read {
        cmd: String,
        files: Vec<String>,
    },
    ListFiles {
        cmd: String,
        path: String,
    },
    Search {
        cmd: String,
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    Mutating {
        cmd: String,
        program: String,
    },
    Network {
        cmd: String,
        program: String,
    },
    Unknown {
        cmd: String,
    },
}

/// Coarse risk bucket derived from a [`ParsedCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandRisk {
    ReadOnly,
    Mutating,
    Networked,
    Unknown,
}

impl ParsedCommand {
    /// The original command line.
    #[must_use]
    pub fn cmd(&self) -> &str {
        match self {
            Self::Read { cmd, .. }
            | Self::ListFiles { cmd, .. }
            | Self::Search { cmd, .. }
            | Self::Mutating { cmd, .. }
            | Self::Network { cmd, .. }
            | Self::Unknown { cmd } => cmd,
        }
    }

    #[must_use]
    pub fn risk(&self) -> CommandRisk {
        match self {
            Self::Read { .. } | Self::ListFiles { .. } | Self::Search { .. } => {
                CommandRisk::ReadOnly
            }
            Self::Mutating { .. } => CommandRisk::Mutating,
            Self::Network { .. } => CommandRisk::Networked,
            Self::Unknown { .. } => CommandRisk::Unknown,
        }
    }

    /// Read, list and search commands only look at the workspace.
    #[must_use]
    pub fn is_exploration(&self) -> bool {
        self.risk() == CommandRisk::ReadOnly
    }
}

/// Split a command line into words the way a POSIX shell would for simple
/// commands: whitespace separates words, quotes group, backslash escapes.
#[must_use]
pub fn tokenize(command: &str) -> Vec<String> {
    if command.trim().is_empty() {
        return Vec::new();
    }
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for ch in command.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == '\'' && !in_double {
            in_single = !in_single;
        } else if ch == '"' && !in_single {
            in_double = !in_double;
        } else if ch.is_whitespace() && !in_single && !in_double {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if escaped {
        current.push('\\');
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Classify `command` given its word split `argv`.
#[must_use]
pub fn classify(command: &str, argv: &[String]) -> ParsedCommand {
    let unknown = || ParsedCommand::Unknown {
        cmd: command.to_owned(),
    };
    let Some((first, args)) = argv.split_first() else {
        return unknown();
    };
    if has_control_operator(command) {
        return unknown();
    }

    let program = program_name(first);
    let program = program.as_str();
    if READ_PROGRAMS.contains(&program) {
        classify_read(command, args)
    } else if program == "ls" {
        classify_list(command, args)
    } else if SEARCH_PROGRAMS.contains(&program) {
        classify_search(command, args)
    } else if MUTATING_PROGRAMS.contains(&program)
        || (program == "sed" && args.iter().any(|a| a.starts_with("-i")))
    {
        ParsedCommand::Mutating {
            cmd: command.to_owned(),
            program: program.to_owned(),
        }
    } else if NETWORK_PROGRAMS.contains(&program) || is_git_network(program, args) {
        ParsedCommand::Network {
            cmd: command.to_owned(),
            program: program.to_owned(),
        }
    } else {
        unknown()
    }
}

fn classify_read(command: &str, args: &[String]) -> ParsedCommand {
    let files: Vec<String> = operands(args).map(str::to_owned).collect();
    if files.is_empty() {
        return ParsedCommand::Unknown {
            cmd: command.to_owned(),
        };
    }
    ParsedCommand::Read {
        cmd: command.to_owned(),
        files,
    }
}

fn classify_list(command: &str, args: &[String]) -> ParsedCommand {
    ParsedCommand::ListFiles {
        cmd: command.to_owned(),
        path: operands(args).next().unwrap_or(".").to_owned(),
    }
}

fn classify_search(command: &str, args: &[String]) -> ParsedCommand {
    let mut operands = operands(args);
    match operands.next() {
        Some(query) => ParsedCommand::Search {
            cmd: command.to_owned(),
            query: query.to_owned(),
            path: operands.next().map(str::to_owned),
        },
        None => ParsedCommand::Unknown {
            cmd: command.to_owned(),
        },
    }
}

fn is_git_network(program: &str, args: &[String]) -> bool {
    program == "git"
        && operands(args)
            .next()
            .is_some_and(|sub| GIT_NETWORK_SUBCOMMANDS.contains(&sub))
}

fn operands(args: &[String]) -> impl Iterator<Item = &str> {
    args.iter()
        .map(String::as_str)
        .filter(|arg| !arg.starts_with('-'))
}

fn program_name(token: &str) -> String {
    token
        .rsplit('/')
        .next()
        .unwrap_or(token)
        .to_lowercase()
}

/// True when the unquoted part of `command` contains pipes, lists,
/// redirections or substitutions.
fn has_control_operator(command: &str) -> bool {
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;
    let mut prev = '\0';
    for ch in command.chars() {
        if escaped {
            escaped = false;
        } else if ch == '\\' && !in_single {
            escaped = true;
        } else if ch == '\'' && !in_double {
            in_single = !in_single;
        } else if ch == '"' && !in_single {
            in_double = !in_double;
        } else if !in_single && (ch == '`' || (prev == '$' && ch == '(')) {
            return true;
        } else if !in_single && !in_double && matches!(ch, '|' | ';' | '&' | '>' | '<') {
            return true;
        }
        prev = ch;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(command: &str) -> ParsedCommand {
        classify(command, &tokenize(command))
    }

    #[test]
    fn tokenize_blank() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn tokenize_whitespace() {
        assert_eq!(tokenize("ls  -la\tsrc"), vec!["ls", "-la", "src"]);
    }

    #[test]
    fn tokenize_quotes() {
        assert_eq!(
            tokenize(r#"grep "hello world" 'a b' src"#),
            vec!["grep", "hello world", "a b", "src"]
        );
        assert_eq!(tokenize(r#"echo "it's""#), vec!["echo", "it's"]);
        assert_eq!(tokenize(r#"echo 'say "hi"'"#), vec!["echo", r#"say "hi""#]);
        assert_eq!(tokenize(r#"echo "a"'b'c"#), vec!["echo", "abc"]);
    }

    #[test]
    fn tokenize_escapes() {
        assert_eq!(tokenize(r"cat my\ file.txt"), vec!["cat", "my file.txt"]);
        assert_eq!(tokenize(r"echo trailing\"), vec!["echo", r"trailing\"]);
    }

    #[test]
    fn read_commands() {
        assert_eq!(
            parse("cat -n src/main.rs build.gradle"),
            ParsedCommand::Read {
                cmd: "cat -n src/main.rs build.gradle".to_owned(),
                files: vec!["src/main.rs".to_owned(), "build.gradle".to_owned()],
            }
        );
        assert!(matches!(parse("tail -f"), ParsedCommand::Unknown { .. }));
        assert!(matches!(parse("/bin/cat a"), ParsedCommand::Read { .. }));
    }

    #[test]
    fn list_commands() {
        assert_eq!(
            parse("ls -la"),
            ParsedCommand::ListFiles {
                cmd: "ls -la".to_owned(),
                path: ".".to_owned(),
            }
        );
        assert_eq!(
            parse("LS app/src"),
            ParsedCommand::ListFiles {
                cmd: "LS app/src".to_owned(),
                path: "app/src".to_owned(),
            }
        );
    }

    #[test]
    fn search_commands() {
        assert_eq!(
            parse("rg -n \"fn main\" src"),
            ParsedCommand::Search {
                cmd: "rg -n \"fn main\" src".to_owned(),
                query: "fn main".to_owned(),
                path: Some("src".to_owned()),
            }
        );
        assert_eq!(
            parse("grep TODO"),
            ParsedCommand::Search {
                cmd: "grep TODO".to_owned(),
                query: "TODO".to_owned(),
                path: None,
            }
        );
        assert!(matches!(parse("grep -r"), ParsedCommand::Unknown { .. }));
    }

    #[test]
    fn mutating_commands() {
        assert!(matches!(
            parse("rm -f build/out.apk"),
            ParsedCommand::Mutating { ref program, .. } if program == "rm"
        ));
        assert!(matches!(
            parse("sed -i 's/a/b/' file"),
            ParsedCommand::Mutating { .. }
        ));
        assert!(matches!(parse("sed 's/a/b/' file"), ParsedCommand::Unknown { .. }));
    }

    #[test]
    fn network_commands() {
        assert!(matches!(
            parse("curl https://example.com"),
            ParsedCommand::Network { ref program, .. } if program == "curl"
        ));
        assert!(matches!(
            parse("git push origin main"),
            ParsedCommand::Network { ref program, .. } if program == "git"
        ));
        assert!(matches!(parse("git status"), ParsedCommand::Unknown { .. }));
    }

    #[test]
    fn compound_commands_are_unknown() {
        assert!(matches!(parse("cat a | grep b"), ParsedCommand::Unknown { .. }));
        assert!(matches!(parse("ls && rm x"), ParsedCommand::Unknown { .. }));
        assert!(matches!(parse("cat a > b"), ParsedCommand::Unknown { .. }));
        assert!(matches!(parse("cat $(ls)"), ParsedCommand::Unknown { .. }));
        assert!(matches!(parse("cat `ls`"), ParsedCommand::Unknown { .. }));
    }

    #[test]
    fn quoted_operators_do_not_make_compound() {
        assert!(matches!(
            parse("grep 'a|b' src"),
            ParsedCommand::Search { ref query, .. } if query == "a|b"
        ));
    }

    #[test]
    fn empty_argv_is_unknown() {
        assert_eq!(
            classify("", &[]),
            ParsedCommand::Unknown { cmd: String::new() }
        );
    }

    #[test]
    fn risk_and_exploration() {
        assert_eq!(parse("cat a").risk(), CommandRisk::ReadOnly);
        assert!(parse("ls").is_exploration());
        assert_eq!(parse("mv a b").risk(), CommandRisk::Mutating);
        assert_eq!(parse("wget x").risk(), CommandRisk::Networked);
        assert_eq!(parse("./gradlew build").risk(), CommandRisk::Unknown);
        assert!(!parse("./gradlew build").is_exploration());
    }

    #[test]
    fn serializes_with_type_tag() {
        let json = serde_json::to_string(&parse("ls src")).unwrap();
        insta::assert_snapshot!(json, @r#"{"type":"list_files","cmd":"ls src","path":"src"}"#);
    }

    mod proptest_parse {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn never_panics(command in "\\PC{0,200}") {
                let argv = tokenize(&command);
                let parsed = classify(&command, &argv);
                prop_assert_eq!(parsed.cmd(), command.as_str());
            }

            #[test]
            fn plain_words_round_trip(words in proptest::collection::vec("[a-zA-Z0-9_./-]{1,12}", 0..10)) {
                let command = words.join(" ");
                prop_assert_eq!(tokenize(&command), words);
            }
        }
    }
}
