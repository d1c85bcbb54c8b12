use std::process::ExitCode;

use clap::Parser;
use tracing::{Instrument, error};

use ip_analyzer::cli::{Cli, Commands};
use ip_analyzer::config::{AppConfig, init_config};
use ip_analyzer::runtime::{run_supervisor, run_worker};
use ip_analyzer::services::hash_secret;
use ip_analyzer::system::platform::{ProcessSignal, notify_supervisor};
use ip_analyzer::system::{init_logging, worker_span};

fn signal_supervisor(sig: ProcessSignal) -> ExitCode {
    match notify_supervisor(sig) {
        Ok(()) => {
            println!("Signal sent to ip-analyzer ({:?})", sig);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e.format_colored());
            ExitCode::FAILURE
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 不需要加载配置的命令
    match cli.command() {
        Commands::HashPassword { secret } => {
            return match hash_secret(secret) {
                Ok(hash) => {
                    println!("{}", hash);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("{}", e.format_colored());
                    ExitCode::FAILURE
                }
            };
        }
        Commands::GenerateConfig => {
            println!("{}", AppConfig::generate_sample_config());
            return ExitCode::SUCCESS;
        }
        Commands::Reload => {
            return signal_supervisor(ProcessSignal::Reload);
        }
        Commands::Stop => {
            return signal_supervisor(ProcessSignal::Terminate);
        }
        _ => {}
    }

    let config = match init_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.format_colored());
            return ExitCode::FAILURE;
        }
    };

    if cli.command() == &Commands::CheckConfig {
        println!("Configuration OK");
        return ExitCode::SUCCESS;
    }

    let _guard = init_logging(&config);

    let result = match cli.worker_id {
        Some(worker_id) => run_worker(worker_id).instrument(worker_span(worker_id)).await,
        None => run_supervisor(config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
