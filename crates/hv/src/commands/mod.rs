//! Command handlers, one module per `hv` subcommand.

pub mod check;
pub mod completion;
pub mod config_cmd;
pub mod harvest;
pub mod init;
pub mod issues;
pub mod jobs;
pub mod recover;
pub mod reload;
pub mod serve;
pub mod status_cmd;
pub mod types_cmd;
pub mod version;
