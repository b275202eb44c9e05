//! Command line splitting.

use thiserror::Error;

/// Command line parse error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandLineError {
    #[error("Command line cannot be parsed: {0}")]
    Unparsable(String),
    #[error("Command line is empty after parsing")]
    Empty,
}

/// A command line split into name and arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Command name (first word).
    pub name: String,
    /// Remaining words.
    pub args: Vec<String>,
}

impl CommandLine {
    /// Split a line shell-style, honouring quotes and escapes.
    ///
    /// # Errors
    /// Returns error on unbalanced quotes or an empty line.
    pub fn parse(line: &str) -> Result<Self, CommandLineError> {
        let mut parts =
            shlex::split(line).ok_or_else(|| CommandLineError::Unparsable(line.to_string()))?;
        if parts.is_empty() {
            return Err(CommandLineError::Empty);
        }

        let name = parts.remove(0);
        Ok(Self { name, args: parts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_honours_quotes() {
        let parsed = CommandLine::parse(r#"echo "hello world" it\'s"#).unwrap();
        assert_eq!(parsed.name, "echo");
        assert_eq!(parsed.args, ["hello world", "it's"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(CommandLine::parse("   "), Err(CommandLineError::Empty));
        assert!(matches!(
            CommandLine::parse("echo \"unterminated"),
            Err(CommandLineError::Unparsable(_))
        ));
    }
}
