//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to [`run`] or
//! [`health`]. Each handler lives in its own submodule.

pub mod health;
pub mod run;

use crate::cli::{Cli, Commands};
use crate::error::ProxyError;

pub async fn dispatch(cli: Cli) -> Result<(), ProxyError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  extraction-proxy v{version} \u{2014} multipart metadata rewriting proxy\n\n  \
         No command provided. To get started:\n\n    \
         extraction-proxy run -t <upstream-url>    Start the proxy\n    \
         extraction-proxy health                   Check a running instance\n    \
         extraction-proxy --help                   See all commands and options\n"
    );
}
