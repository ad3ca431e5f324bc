//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Storefront auth - inspect configuration and route admission
#[derive(Parser, Debug)]
#[command(name = "storefront-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "STOREFRONT_AUTH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "STOREFRONT_AUTH_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "STOREFRONT_AUTH_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load and validate the configuration, then print it
    CheckConfig,

    /// Show which decision a navigation would get
    Explain {
        /// Navigation path, e.g. /admin/users
        #[arg(required = true)]
        path: String,

        /// Roles of a simulated logged-in user (repeatable)
        #[arg(short, long = "role")]
        roles: Vec<String>,

        /// Take roles from an access token instead (JWT, not verified)
        #[arg(long, conflicts_with = "roles")]
        token: Option<String>,

        /// Simulate a logged-out user
        #[arg(long, conflicts_with_all = ["roles", "token"])]
        anonymous: bool,
    },
}
