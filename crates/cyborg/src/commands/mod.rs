//! Command dispatch: bridges CLI args -> conductor operations -> output formatting.

pub mod config_cmd;
pub mod devices;
pub mod providers;
pub mod reconcile;
pub mod util;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that works on inventory or Placement.
pub async fn dispatch(cmd: Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Report(args) => reconcile::report(args, global).await,
        Command::Diff(args) => reconcile::diff(args, global).await,
        Command::Plan(args) => reconcile::plan(args, global).await,
        Command::Providers(args) => providers::handle(args, global).await,
        Command::Devices(args) => devices::handle(args, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
        Command::Completions(_) => Err(CliError::Internal {
            message: "completions are generated before dispatch".into(),
        }),
    }
}
