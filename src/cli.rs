//! Command-line interface definitions using clap
//!
//! This module defines the CLI structure for ip-analyzer using clap's derive macros.

use clap::{Parser, Subcommand};

/// ip-analyzer - IP geolocation lookup service
#[derive(Parser, Debug)]
#[command(name = "ip-analyzer")]
#[command(version)]
#[command(about = "IP geolocation lookup service", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, short = 'c', global = true)]
    pub config: Option<String>,

    /// Run as worker process with the given id (used by the supervisor)
    #[arg(long, hide = true)]
    pub worker_id: Option<usize>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available commands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start the supervisor and its worker processes (default)
    Start,

    /// Ask the running supervisor to reload its configuration (SIGHUP)
    Reload,

    /// Ask the running supervisor to stop (SIGTERM)
    Stop,

    /// Print an Argon2 hash to use as `auth.hash`
    HashPassword {
        /// Plain text secret
        secret: String,
    },

    /// Load and validate the configuration, then exit
    CheckConfig,

    /// Print a sample configuration file
    GenerateConfig,
}

impl Cli {
    /// Command to run, `start` when none was given
    pub fn command(&self) -> &Commands {
        self.command.as_ref().unwrap_or(&Commands::Start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_start() {
        let cli = Cli::parse_from(["ip-analyzer"]);
        assert_eq!(cli.command(), &Commands::Start);
        assert!(cli.worker_id.is_none());
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::parse_from(["ip-analyzer", "reload", "-c", "custom.toml"]);
        assert_eq!(cli.config.as_deref(), Some("custom.toml"));
        assert_eq!(cli.command(), &Commands::Reload);
    }

    #[test]
    fn test_worker_id_flag() {
        let cli = Cli::parse_from(["ip-analyzer", "--worker-id", "3", "--config=a.toml"]);
        assert_eq!(cli.worker_id, Some(3));
        assert_eq!(cli.config.as_deref(), Some("a.toml"));
    }

    #[test]
    fn test_hash_password_takes_secret() {
        let cli = Cli::parse_from(["ip-analyzer", "hash-password", "s3cret"]);
        assert_eq!(
            cli.command(),
            &Commands::HashPassword {
                secret: "s3cret".to_string()
            }
        );
    }
}
