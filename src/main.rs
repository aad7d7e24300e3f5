mod cli;
mod commands;
mod config;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use commands::adopt::Capture;
use config::KeelConfig;
use declarative::ExitCode;
use ledger::StateStore;
use remote::RestApi;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: KeelConfig,
}

impl Context {
    /// Ledger at the configured location
    pub fn store(&self) -> Result<StateStore> {
        Ok(StateStore::new(self.config.state_file()?))
    }

    /// REST client for the configured server
    pub fn api(&self) -> RestApi {
        if self.config.token().is_none() {
            log::warn!(
                "{} is not set; requests will be unauthenticated",
                self.config.api.token_env
            );
        }
        RestApi::new(self.config.token(), self.config.api.insecure)
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    match run(cli) {
        Ok(code) => code.into(),
        Err(e) => {
            report(&e);
            ExitCode::Error.into()
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let overrides = cli.overrides();
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config: KeelConfig::load_default()?.with_overrides(overrides),
    };

    match &cli.command {
        Command::Merge(args) => commands::merge::run(args),
        Command::Diff(args) => commands::diff::run(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::Adopt(args) => commands::adopt::run(&ctx, args, Capture::Adopt),
        Command::Snapshot(args) => commands::adopt::run(&ctx, args, Capture::Snapshot),
        Command::State(cmd) => commands::state::run(&ctx, cmd),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(*shell, &mut cmd, "keel", &mut io::stdout());
            Ok(ExitCode::Success)
        }
    }
}

/// Print an error chain, with advice when it came from the server
fn report(err: &anyhow::Error) {
    ui::error(&format!("{err:#}"));
    if let Some(remote_err) = err.chain().find_map(|e| e.downcast_ref::<remote::Error>()) {
        let category = remote_err.category();
        ui::dim(&format!("{category}: {}", category.advice()));
    }
}
