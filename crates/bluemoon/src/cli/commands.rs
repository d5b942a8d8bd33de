//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::model::Period;

/// Actor recorded in the audit log for CLI changes.
pub const DEFAULT_ACTOR: &str = "cli";

fn parse_period(value: &str) -> Result<Period, String> {
    value.parse().map_err(|e: crate::Error| e.to_string())
}

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind, overriding `server.bind`
    #[arg(long)]
    pub bind: Option<String>,

    /// Port to listen on, overriding `server.port`
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Database commands.
#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Create the database and apply migrations
    Init,

    /// Show schema version and row counts
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    /// Master-data JSON document
    pub file: PathBuf,

    /// Name recorded in the audit log
    #[arg(long, default_value = DEFAULT_ACTOR)]
    pub actor: String,
}

/// Billing commands.
#[derive(Debug, Subcommand)]
pub enum BillingCommand {
    /// Issue invoices for a fee to every occupied apartment
    Generate {
        /// Fee to bill
        #[arg(long)]
        fee: i64,

        /// Billing month (YYYY-MM)
        #[arg(long, value_parser = parse_period)]
        period: Period,

        /// Name recorded in the audit log
        #[arg(long, default_value = DEFAULT_ACTOR)]
        actor: String,
    },
}

/// Dashboard command arguments.
#[derive(Debug, Args)]
pub struct DashboardCommand {
    /// Billing month (YYYY-MM); defaults to the current month
    #[arg(long, value_parser = parse_period)]
    pub period: Option<Period>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_command_debug() {
        let cmd = ServeCommand {
            bind: None,
            port: Some(9000),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("9000"));
    }

    #[test]
    fn test_db_command_debug() {
        let cmd = DbCommand::Status { json: true };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Status"));
        assert!(debug_str.contains("json"));
    }

    #[test]
    fn test_billing_command_debug() {
        let cmd = BillingCommand::Generate {
            fee: 2,
            period: "2025-04".parse().unwrap(),
            actor: DEFAULT_ACTOR.to_string(),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Generate"));
        assert!(debug_str.contains("fee"));
    }

    #[test]
    fn test_parse_period_message() {
        assert!(parse_period("2025-04").is_ok());
        let err = parse_period("April").unwrap_err();
        assert!(err.contains("YYYY-MM"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
