//! Worker command construction
//!
//! Turns a command template plus a group's items into a structured
//! invocation (program, arguments, environment) for one worker.

use std::collections::BTreeMap;
use std::fmt;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Token expanded to the worker's item identifiers
pub const ITEMS_PLACEHOLDER: &str = "{items}";

/// Command template errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command template is empty")]
    Empty,

    #[error("Unterminated quote in: {0}")]
    UnterminatedQuote(String),
}

/// A fully built process invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Run a shell command line through `sh -c`
    pub fn shell(command_line: impl Into<String>) -> Self {
        Self::new("sh").arg("-c").arg(command_line)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Build a process command with piped output and no stdin
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        command
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.env {
            write!(f, "{key}={value:?} ")?;
        }
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Where a template puts the worker's items
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemPlacement {
    Placeholder,
    Append,
    Ignore,
}

/// Command line shared by all workers of a run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
    options: Vec<String>,
    placement: ItemPlacement,
}

impl CommandTemplate {
    /// Parse a template such as `rspec --color {items}`.
    ///
    /// Without a `{items}` token the items are appended at the end.
    pub fn parse(template: &str) -> Result<Self, CommandError> {
        let mut words = split_words(template)?.into_iter();
        let program = words.next().ok_or(CommandError::Empty)?;
        let args: Vec<String> = words.collect();

        let placement = if args.iter().any(|a| a == ITEMS_PLACEHOLDER) {
            ItemPlacement::Placeholder
        } else {
            ItemPlacement::Append
        };

        Ok(Self {
            program,
            args,
            options: Vec::new(),
            placement,
        })
    }

    /// Run the same shell command line in every worker, ignoring items
    pub fn shell(command_line: &str) -> Result<Self, CommandError> {
        if command_line.trim().is_empty() {
            return Err(CommandError::Empty);
        }

        Ok(Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), command_line.to_string()],
            options: Vec::new(),
            placement: ItemPlacement::Ignore,
        })
    }

    /// Extra options placed right after the program
    pub fn with_options(mut self, options: &str) -> Result<Self, CommandError> {
        self.options = split_words(options)?;
        Ok(self)
    }

    /// Build the invocation for one worker's items
    pub fn render(&self, items: &[&str]) -> Invocation {
        let mut invocation = Invocation::new(&self.program);
        invocation.args.extend(self.options.iter().cloned());

        for arg in &self.args {
            if arg == ITEMS_PLACEHOLDER && self.placement == ItemPlacement::Placeholder {
                invocation.args.extend(items.iter().map(|i| i.to_string()));
            } else {
                invocation.args.push(arg.clone());
            }
        }

        if self.placement == ItemPlacement::Append {
            invocation.args.extend(items.iter().map(|i| i.to_string()));
        }

        invocation
    }

    /// Whether workers with no items still have something to run
    pub fn runs_without_items(&self) -> bool {
        self.placement == ItemPlacement::Ignore
    }
}

/// Split a command line into words, honoring quotes and backslash escapes
pub fn split_words(line: &str) -> Result<Vec<String>, CommandError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                    in_word = true;
                }
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quote.is_some() {
        return Err(CommandError::UnterminatedQuote(line.to_string()));
    }
    if in_word {
        words.push(current);
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_words() {
        assert_eq!(
            split_words(r#"ruby -e 'puts "hi"' "a b" c\ d"#).unwrap(),
            vec!["ruby", "-e", r#"puts "hi""#, "a b", "c d"]
        );
        assert_eq!(split_words("  ").unwrap(), Vec::<String>::new());
        assert_eq!(split_words("''").unwrap(), vec![""]);
    }

    #[test]
    fn test_split_unterminated() {
        assert!(matches!(
            split_words("echo 'oops"),
            Err(CommandError::UnterminatedQuote(_))
        ));
    }

    #[test]
    fn test_empty_template() {
        assert_eq!(CommandTemplate::parse("   ").unwrap_err(), CommandError::Empty);
        assert_eq!(CommandTemplate::shell("").unwrap_err(), CommandError::Empty);
    }

    #[test]
    fn test_render_appends_items() {
        let template = CommandTemplate::parse("rspec --color").unwrap();
        let invocation = template.render(&["a_spec.rb", "b spec.rb"]);

        assert_eq!(invocation.program, "rspec");
        assert_eq!(invocation.args, vec!["--color", "a_spec.rb", "b spec.rb"]);
    }

    #[test]
    fn test_render_placeholder() {
        let template = CommandTemplate::parse("ruby -Itest {items} --verbose").unwrap();
        let invocation = template.render(&["a_test.rb", "b_test.rb"]);

        assert_eq!(
            invocation.args,
            vec!["-Itest", "a_test.rb", "b_test.rb", "--verbose"]
        );
    }

    #[test]
    fn test_render_options_after_program() {
        let template = CommandTemplate::parse("rspec {items}")
            .unwrap()
            .with_options("--format 'progress bar'")
            .unwrap();
        let invocation = template.render(&["x_spec.rb"]);

        assert_eq!(
            invocation.args,
            vec!["--format", "progress bar", "x_spec.rb"]
        );
    }

    #[test]
    fn test_shell_ignores_items() {
        let template = CommandTemplate::shell("echo $TEST_ENV_NUMBER").unwrap();
        let invocation = template.render(&["ignored"]);

        assert_eq!(invocation.program, "sh");
        assert_eq!(invocation.args, vec!["-c", "echo $TEST_ENV_NUMBER"]);
        assert!(template.runs_without_items());
    }

    #[test]
    fn test_invocation_display() {
        let invocation = Invocation::new("rspec")
            .arg("a b.rb")
            .env("TEST_ENV_NUMBER", "2");
        assert_eq!(invocation.to_string(), r#"TEST_ENV_NUMBER="2" rspec "a b.rb""#);
    }
}
