//! Interactive review loop
//!
//! After a suggestion is merged into the buffer the user decides what to do
//! with it, one command per line:
//!
//! ```text
//! revise <prompt>   ask for another take within the same session
//! suggest <prompt>  start over on the original selection
//! approve           keep it
//! discard           roll the buffer back and stop
//! cancel            abandon the session and stop
//! show              print the current buffer
//! help              list commands
//! ```

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Revise(String),
    Suggest(String),
    Approve,
    Discard,
    Cancel,
    Show,
    Help,
}

pub const HELP: &str = "commands: revise <prompt> | suggest <prompt> | approve | discard | cancel | show | help";

/// Parse one input line; `Ok(None)` for a blank line
pub fn parse_command(line: &str) -> Result<Option<ReplCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "revise" | "r" => {
            if rest.is_empty() {
                return Err("revise needs a prompt".to_string());
            }
            ReplCommand::Revise(rest.to_string())
        }
        "suggest" | "g" => {
            if rest.is_empty() {
                return Err("suggest needs a prompt".to_string());
            }
            ReplCommand::Suggest(rest.to_string())
        }
        "approve" | "a" => ReplCommand::Approve,
        "discard" | "d" => ReplCommand::Discard,
        "cancel" | "q" | "quit" => ReplCommand::Cancel,
        "show" | "s" => ReplCommand::Show,
        "help" | "h" | "?" => ReplCommand::Help,
        other => return Err(format!("unknown command: {}", other)),
    };
    Ok(Some(command))
}

/// Read the next valid command; `None` at end of input
pub async fn next_command<R>(input: &mut R) -> Result<Option<ReplCommand>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        eprint!("zenedit> ");
        line.clear();
        if input.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        match parse_command(&line) {
            Ok(Some(command)) => return Ok(Some(command)),
            Ok(None) => continue,
            Err(message) => eprintln!("{}\n{}", message, HELP),
        }
    }
}
