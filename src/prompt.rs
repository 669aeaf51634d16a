use anyhow::{Context, Result};
use std::io::{BufRead, Write};

/// Asks the user whether to go ahead with an action.
pub trait Confirm: Send + Sync {
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Prompts on stdout and reads a `y`/`yes` answer from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, message: &str) -> Result<bool> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{} Would you like to proceed? y/N", message.trim_end())?;
        stdout.flush()?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("failed to read confirmation from stdin")?;
        Ok(is_yes(&answer))
    }
}

/// Answers every prompt the same way. Useful for scripts and tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Confirm for FixedAnswer {
    fn confirm(&self, _message: &str) -> Result<bool> {
        Ok(self.0)
    }
}

pub(crate) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
