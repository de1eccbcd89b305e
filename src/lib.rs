//! Microsoft 365 administration from the command line
//!
//! Commands translate options into Microsoft Graph, SharePoint and Power
//! Platform calls. The shared layers are [`api::odata`] (paged retrieval),
//! [`api::operation`] (long-running operation polling) and [`cmd::options`]
//! (option-set validation driven by [`cmd::run_command`]).

pub mod api;
pub mod cmd;
pub mod config;
pub mod error;
pub mod output;
pub mod progress;
pub mod telemetry;
pub mod validation;
