//! CLI module
//!
//! Provides:
//! - Argument parsing (`clap`)
//! - Command dispatch (login, books, edit, insert-links)
//! - Interactive review loop for suggestions

pub mod args;
pub mod dispatch;
pub mod repl;

pub use args::{Cli, Command, EditArgs};
pub use dispatch::{build_api, run_cli};
pub use repl::{parse_command, ReplCommand};

use crate::error::ClientError;

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_REAUTH: i32 = 3;

/// Map a command error to its exit code
pub fn exit_code(err: &anyhow::Error) -> i32 {
    let unauthorized = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ClientError>())
        .any(ClientError::is_unauthorized);
    if unauthorized {
        EXIT_REAUTH
    } else {
        EXIT_FAILURE
    }
}
