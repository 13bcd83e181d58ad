//! Entry point: parses arguments and dispatches to the `filter`/`split`/`merge`
//! subcommands.
//!
//! Grounded on `elprep.cpp`'s `main`: `split`/`merge` exist as named
//! subcommands but are not implemented, exiting with an error rather than
//! silently doing nothing.

use clap::Parser;
use log::error;

use samflow::{
    cli::{run_filter, Cli, Command},
    error::{ConfigError, Error},
};

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Filter(args) => run_filter(args),
        Command::Split => Err(Error::Config(ConfigError::UnsupportedOption(
            "split".to_owned(),
        ))),
        Command::Merge => Err(Error::Config(ConfigError::UnsupportedOption(
            "merge".to_owned(),
        ))),
    };

    if let Err(err) = result {
        error!("{err}");
        std::process::exit(1);
    }
}
