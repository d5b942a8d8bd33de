//! Command-line interface for bluemoon.
//!
//! This module provides the CLI structure for the `bluemoon` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    BillingCommand, ConfigCommand, DashboardCommand, DbCommand, ImportCommand, ServeCommand,
    DEFAULT_ACTOR,
};

/// bluemoon - Condominium management backend
///
/// Serves the resident registry, fee ledger, parking and visitor logs,
/// incidents, notices and donation campaigns over HTTP, and runs
/// maintenance tasks against the same database.
#[derive(Debug, Parser)]
#[command(name = "bluemoon")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve(ServeCommand),

    /// Manage the database
    #[command(subcommand)]
    Db(DbCommand),

    /// Import a master-data document
    Import(ImportCommand),

    /// Billing tasks
    #[command(subcommand)]
    Billing(BillingCommand),

    /// Print the dashboard for a billing month
    Dashboard(DashboardCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
