//! aniplay - Terminal client for browsing and playing anime streams
//!
//! # Usage
//!
//! ```bash
//! aniplay top --window week
//! aniplay episodes one-piece-100
//! aniplay resolve one-piece-100 --episode 3 --variant dub
//! aniplay play one-piece-100 --episode 3
//! ```

use clap::Parser;

use aniplay::cli::{Cli, Command, ExitCode, Output};
use aniplay::commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let base_url = cli.base_url.as_deref();

    match cli.command {
        Command::Top(cmd) => commands::top_cmd(cmd, base_url, &output).await,

        Command::Info(cmd) => commands::info_cmd(cmd, base_url, &output).await,

        Command::Episodes(cmd) => commands::episodes_cmd(cmd, base_url, &output).await,

        Command::Servers(cmd) => commands::servers_cmd(cmd, base_url, &output).await,

        Command::Manifest(cmd) => commands::manifest_cmd(cmd, base_url, &output).await,

        Command::Resolve(cmd) => commands::resolve_cmd(cmd, base_url, &output).await,

        Command::Subtitles(cmd) => commands::subtitles_cmd(cmd, base_url, &output).await,

        Command::Play(cmd) => commands::play_cmd(cmd, base_url, &output).await,
    }
}
