use std::process::ExitCode;

use clap::Parser;
use db_backup_lib::cli::Cli;
use db_backup_lib::command::SystemRunner;
use db_backup_lib::config::Config;
use db_backup_lib::pipeline;
use db_backup_lib::storage::SupabaseStorage;

fn main() -> ExitCode {
    // .env has to be merged before clap reads option defaults from the environment
    let dotenv = dotenv::dotenv();
    let cli = Cli::parse();

    // init logger
    let mut env_logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    env_logger.try_init().expect("env_logger should not fail");

    match dotenv {
        Ok(path) => log::debug!(target: "config", "Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => log::debug!(target: "config", "No .env file found"),
        Err(e) => log::warn!(target: "config", "Reading the .env file failed: {e}"),
    }

    let config = match Config::from_env(&cli) {
        Ok(config) => config,
        Err(e) => {
            log::error!(target: "config", "{e}");
            return ExitCode::FAILURE;
        }
    };

    let store = match SupabaseStorage::new(&config.storage) {
        Ok(store) => store,
        Err(e) => {
            log::error!(target: "storage", "Setting up the storage client failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    match pipeline::run(&config, &SystemRunner, &store) {
        Ok(report) if report.success() => {
            log::info!(target: "pipeline", "Backup finished");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            log::warn!(target: "pipeline", "Backup finished with errors: {report:?}");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!(target: "pipeline", "{e}");
            ExitCode::FAILURE
        }
    }
}
