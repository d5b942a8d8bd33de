//! `bluemoon` - CLI for the condominium management backend
//!
//! This binary runs the HTTP API and the maintenance commands that share
//! its database.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use anyhow::Context;
use clap::Parser;

use bluemoon::cli::{
    BillingCommand, Cli, Command, ConfigCommand, DashboardCommand, DbCommand, ImportCommand,
    ServeCommand,
};
use bluemoon::model::Period;
use bluemoon::{api, import, init_logging, Config, Storage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    // Execute the command
    match cli.command {
        Command::Serve(cmd) => handle_serve(config, cmd),
        Command::Db(cmd) => handle_db(&config, &cmd),
        Command::Import(cmd) => handle_import(&config, &cmd),
        Command::Billing(cmd) => handle_billing(&config, cmd),
        Command::Dashboard(cmd) => handle_dashboard(&config, &cmd),
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

fn handle_serve(mut config: Config, cmd: ServeCommand) -> anyhow::Result<()> {
    if let Some(bind) = cmd.bind {
        config.server.bind = bind;
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let storage = Storage::open_with_config(&config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;
    runtime.block_on(api::serve(config, storage))?;
    Ok(())
}

fn handle_db(config: &Config, cmd: &DbCommand) -> anyhow::Result<()> {
    let storage = Storage::open_with_config(config)?;
    match cmd {
        DbCommand::Init => {
            println!("Database ready at {}", storage.path().display());
        }
        DbCommand::Status { json } => {
            let stats = storage.stats()?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("bluemoon database");
                println!("-----------------");
                println!("Path:           {}", stats.path.display());
                println!("Schema version: {}", stats.schema_version);
                println!("Size:           {} bytes", stats.db_size_bytes);
                println!();
                for (table, count) in &stats.rows {
                    println!("  {table:<16} {count}");
                }
            }
        }
    }
    Ok(())
}

fn handle_import(config: &Config, cmd: &ImportCommand) -> anyhow::Result<()> {
    let bytes = import::read_document(&cmd.file)
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    let mut storage = Storage::open_with_config(config)?;
    let source = cmd.file.display().to_string();

    let report = match storage.import_master_data(&bytes, Some(&source), &cmd.actor) {
        Ok(report) => report,
        Err(bluemoon::Error::Import { message, failures }) => {
            eprintln!("Import rejected: {message}");
            for failure in &failures {
                eprintln!(
                    "  {} row {}: {}",
                    failure.section, failure.row, failure.message
                );
            }
            anyhow::bail!("{} rows failed validation", failures.len());
        }
        Err(e) => return Err(e.into()),
    };

    if report.already_imported {
        println!("Already imported ({}); nothing written.", report.content_hash);
        return Ok(());
    }
    println!("Imported {}", cmd.file.display());
    for (section, counts) in [
        ("apartments", report.apartments),
        ("residents", report.residents),
        ("vehicles", report.vehicles),
    ] {
        println!(
            "  {section:<11} {} created, {} updated, {} skipped",
            counts.created, counts.updated, counts.skipped
        );
    }
    Ok(())
}

fn handle_billing(config: &Config, cmd: BillingCommand) -> anyhow::Result<()> {
    let mut storage = Storage::open_with_config(config)?;
    match cmd {
        BillingCommand::Generate { fee, period, actor } => {
            let report = storage.generate_invoices(fee, period, &actor)?;
            println!(
                "Fee {} for {}: {} invoices issued ({} VND), {} already billed",
                report.fee_id, report.period, report.created, report.total_amount, report.skipped
            );
        }
    }
    Ok(())
}

fn handle_dashboard(config: &Config, cmd: &DashboardCommand) -> anyhow::Result<()> {
    let storage = Storage::open_with_config(config)?;
    let period = cmd.period.unwrap_or_else(Period::current);
    let summary = storage.dashboard_summary(period, config.dashboard.revenue_months)?;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Dashboard for {}", summary.period);
    println!("==================");
    println!();
    println!(
        "Apartments:  {} total, {} occupied, {} vacant",
        summary.apartments.total, summary.apartments.occupied, summary.apartments.vacant
    );
    println!(
        "Residents:   {} active, {} temporarily absent",
        summary.residents.active, summary.residents.temporarily_absent
    );
    println!(
        "Vehicles:    {} inside; {}",
        summary.vehicles.inside,
        summary
            .vehicles
            .by_kind
            .iter()
            .map(|(kind, count)| format!("{kind} {count}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("Visitors:    {} inside", summary.visitors_inside);
    println!(
        "Incidents:   {}",
        summary
            .open_incidents
            .iter()
            .map(|(priority, count)| format!("{priority} {count}"))
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!();
    println!("[Billing]");
    println!("  Invoiced:        {} VND", summary.billing.invoiced);
    println!("  Collected:       {} VND", summary.billing.collected);
    println!("  Outstanding:     {} VND", summary.billing.outstanding);
    match summary.billing.collection_rate_percent {
        Some(rate) => println!("  Collection rate: {rate:.2}%"),
        None => println!("  Collection rate: -"),
    }
    println!("  Unpaid invoices: {}", summary.billing.unpaid_invoices);
    println!();
    println!("[Revenue]");
    for point in &summary.revenue {
        println!("  {}  {} VND", point.period, point.amount);
    }
    println!();
    println!(
        "Donations to open campaigns: {} VND",
        summary.donations_open_campaigns
    );
    Ok(())
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind:               {}", config.server.bind);
                println!("  Port:               {}", config.server.port);
                println!(
                    "  CORS origins:       {}",
                    config.server.cors_allowed_origins.join(", ")
                );
                println!(
                    "  Page size:          {} (max {})",
                    config.server.default_page_size, config.server.max_page_size
                );
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!("  Busy timeout (ms):  {}", config.storage.busy_timeout_ms);
                println!();
                println!("[Billing]");
                println!("  Due day:            {}", config.billing.due_day);
                println!();
                println!("[Vehicles]");
                println!("  Plate pattern:      {}", config.vehicles.plate_pattern);
                println!();
                println!("[Dashboard]");
                println!("  Revenue months:     {}", config.dashboard.revenue_months);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
