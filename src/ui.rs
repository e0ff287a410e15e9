//! Host-facing prompts and notifications.

use std::io::{self, BufRead, Write};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{Result, KanifyError};

static API_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-fA-F0-9]{32}$").expect("api key regex"));

/// Check that a credential looks like a WaniKani v1 API key
pub fn validate_api_key(candidate: &str) -> Result<()> {
    if API_KEY_RE.is_match(candidate) {
        Ok(())
    } else {
        Err(KanifyError::InvalidCredentialFormat)
    }
}

/// Prompting and notification surface provided by the host
pub trait UserInterface: Send + Sync {
    /// Ask the user for a value. `None` means the prompt was cancelled.
    fn prompt(&self, message: &str) -> Option<String>;

    /// Blocking notification
    fn alert(&self, message: &str);
}

/// Terminal implementation: secrets are read without echo, alerts go to stderr
#[derive(Debug, Default)]
pub struct TerminalUi;

impl TerminalUi {
    pub fn new() -> Self {
        Self
    }
}

impl UserInterface for TerminalUi {
    fn prompt(&self, message: &str) -> Option<String> {
        let answer = rpassword::prompt_password(format!("{}: ", message))
            .or_else(|e| {
                // no tty, e.g. piped input
                debug!("Falling back to plain stdin prompt: {}", e);
                read_plain_line(message)
            })
            .ok()?;

        let answer = answer.trim().to_string();
        if answer.is_empty() { None } else { Some(answer) }
    }

    fn alert(&self, message: &str) {
        eprintln!("[wanikanify] {}", message);
    }
}

fn read_plain_line(message: &str) -> io::Result<String> {
    eprint!("{}: ", message);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_api_key() {
        assert!(validate_api_key("0123456789abcdefABCDEF0123456789").is_ok());
        assert!(matches!(
            validate_api_key("0123456789abcdef"),
            Err(KanifyError::InvalidCredentialFormat)
        ));
        assert!(validate_api_key("0123456789abcdefABCDEF012345678g").is_err());
        assert!(validate_api_key(" 0123456789abcdefABCDEF0123456789").is_err());
        assert!(validate_api_key("").is_err());
    }
}
