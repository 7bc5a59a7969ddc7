//! ZenEdit - streaming AI edit sessions for chapter text
//!
//! The protocol pieces (selection snapshots, stream decoding, the session
//! state machine, merging) live in `zenedit-core`; this crate adds the HTTP
//! client, configuration, logging and the command line.

pub mod agent;
pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod logging;

pub use agent::{SessionClient, StreamOutcome, SuggestParams};
pub use config::{ConfigManager, ZenEditConfig};
pub use editor::EditorBuffer;
pub use error::ClientError;
