//! CLI argument parsing
//!
//! ```text
//! zenedit [--config PATH] [--json-logs] <command>
//!
//! COMMANDS:
//!   login --username U --password P
//!   books
//!   edit --book B --chapter C (--from N --to M | --all) --prompt P
//!        [--file PATH] [--provider anthropic|openai] [--interactive]
//!   insert-links --file PATH URL...
//! ```

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::agent::api::Provider;

/// ZenEdit - AI-assisted chapter editing from the terminal
#[derive(Parser, Debug)]
#[command(name = "zenedit", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Log in and cache the access token
    Login {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        password: String,
    },

    /// List books
    Books,

    /// Ask the agent to rewrite part of a chapter
    Edit(EditArgs),

    /// Insert image links after the first heading of a local file
    InsertLinks {
        /// Markdown file to amend in place
        #[arg(long)]
        file: PathBuf,

        /// Image URLs, inserted in the order given
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
#[command(group(ArgGroup::new("range").required(true).args(["from", "all"])))]
pub struct EditArgs {
    /// Book slug
    #[arg(long)]
    pub book: String,

    /// Chapter slug
    #[arg(long)]
    pub chapter: String,

    /// Selection start (UTF-16 offset)
    #[arg(long, requires = "to")]
    pub from: Option<usize>,

    /// Selection end (UTF-16 offset, exclusive)
    #[arg(long, requires = "from")]
    pub to: Option<usize>,

    /// Select the whole chapter
    #[arg(long)]
    pub all: bool,

    /// Instruction for the agent
    #[arg(short, long)]
    pub prompt: String,

    /// Edit a local copy instead of the stored chapter; approval writes it back
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Generation provider (overrides config)
    #[arg(long)]
    pub provider: Option<Provider>,

    /// Review the suggestion before approving (revise/suggest/approve/discard/cancel)
    #[arg(short, long)]
    pub interactive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("zenedit").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_edit_range() {
        let cli = parse(&[
            "edit", "--book", "b", "--chapter", "c", "--from", "8", "--to", "12", "-p", "shout",
            "--provider", "openai",
        ])
        .unwrap();
        match cli.command {
            Command::Edit(args) => {
                assert_eq!((args.from, args.to), (Some(8), Some(12)));
                assert_eq!(args.provider, Some(Provider::OpenAi));
                assert!(!args.all);
                assert!(!args.interactive);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_edit_requires_range() {
        assert!(parse(&["edit", "--book", "b", "--chapter", "c", "-p", "x"]).is_err());
        assert!(parse(&["edit", "--book", "b", "--chapter", "c", "--from", "1", "-p", "x"]).is_err());
        assert!(parse(&[
            "edit", "--book", "b", "--chapter", "c", "--from", "1", "--to", "2", "--all", "-p", "x"
        ])
        .is_err());
    }

    #[test]
    fn test_parse_edit_all_interactive() {
        let cli = parse(&[
            "--config", "/tmp/z.toml", "edit", "--book", "b", "--chapter", "c", "--all", "-p", "x",
            "-i", "--file", "ch.md",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/z.toml")));
        match cli.command {
            Command::Edit(args) => {
                assert!(args.all && args.interactive);
                assert_eq!(args.file, Some(PathBuf::from("ch.md")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_insert_links() {
        let cli = parse(&["insert-links", "--file", "ch.md", "a.png", "b.png"]).unwrap();
        assert_eq!(
            cli.command,
            Command::InsertLinks {
                file: PathBuf::from("ch.md"),
                urls: vec!["a.png".to_string(), "b.png".to_string()],
            }
        );
        assert!(parse(&["insert-links", "--file", "ch.md"]).is_err());
    }

    #[test]
    fn test_parse_unknown_provider() {
        assert!(parse(&[
            "edit", "--book", "b", "--chapter", "c", "--all", "-p", "x", "--provider", "gemini"
        ])
        .is_err());
    }
}
