//! Argument-list construction for the external tools.

use super::Redactor;
use crate::{Error, Result};

/// A program plus its discrete argument list.
///
/// Arguments are handed to the child process as-is; no shell ever sees them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn to_command(&self) -> tokio::process::Command {
        let mut cmd = process_utils::tokio_command(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Shell-quoted rendering for logs, with credentials redacted.
    pub fn display(&self, redactor: &Redactor) -> String {
        std::iter::once(&self.program)
            .chain(&self.args)
            .map(|part| {
                let redacted = redactor.redact(part);
                match shlex::try_quote(&redacted) {
                    Ok(quoted) => quoted.into_owned(),
                    Err(_) => redacted.into_owned(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split free-text extra arguments into tokens, honouring shell-style quoting.
///
/// `--add-header "User-Agent:Mozilla/5.0 (X11)"` yields two tokens. Unbalanced
/// quotes are a configuration error.
pub fn tokenize_args(text: &str) -> Result<Vec<String>> {
    shlex::split(text)
        .ok_or_else(|| Error::config("unbalanced quotes or trailing escape in extra arguments"))
}
