//! Parking Core - command line front end
//!
//! Runs single operations against the configured store. Use the database
//! backend for state that outlives one invocation.
//!
//! ```sh
//! # Validate config without touching storage
//! parking --check
//!
//! # Create the schema
//! parking migrate
//!
//! # Park, price, leave
//! parking check-in ABC123 compact --garage 1
//! parking estimate 1 --at 2024-03-04T11:15:00Z
//! parking check-out 1
//!
//! # Dump Prometheus metrics after the command
//! parking --metrics check-in XYZ999 standard
//! ```

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use parking_core::application::CheckInRequest;
use parking_core::config::{config_path_from_env, AppConfig, StorageBackend};
use parking_core::domain::VehicleType;
use parking_core::{init_database, init_tracing, run_migrations, ParkingCore};

/// Transactional spot assignment and billing for parking garages.
#[derive(Parser, Debug)]
#[command(
    name = "parking",
    version,
    about = "Spot assignment and billing for multi-floor parking garages",
    long_about = "Parking Core - assigns spots, bills sessions and records an audit trail.\n\n\
                  Default config: ~/.config/parking-core/config.toml"
)]
struct Cli {
    /// Path to the configuration file (TOML).
    #[arg(short, long, env = "PARKING_CONFIG")]
    config: Option<PathBuf>,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,

    /// Validate the configuration file and exit.
    #[arg(long)]
    check: bool,

    /// Print Prometheus metrics after the command.
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations.
    Migrate,
    /// Show the spot a vehicle would get, without claiming it.
    Preview {
        vehicle_type: String,
        #[arg(long)]
        garage: Option<i32>,
        #[arg(long = "feature")]
        features: Vec<String>,
    },
    /// Spot counts per status.
    Availability {
        #[arg(long)]
        garage: Option<i32>,
    },
    /// Check a vehicle in.
    CheckIn {
        plate: String,
        vehicle_type: String,
        #[arg(long)]
        garage: Option<i32>,
        #[arg(long = "feature")]
        features: Vec<String>,
    },
    /// Price an open session without closing it.
    Estimate {
        session_id: i32,
        /// RFC 3339 instant; now when absent.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Check a vehicle out and charge it.
    CheckOut { session_id: i32 },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // ── Load configuration ─────────────────────────────────────
    let config_path = cli.config.clone().unwrap_or_else(config_path_from_env);
    let mut config = match AppConfig::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", config_path.display(), e);
            return Err(e.into());
        }
    };
    if let Some(ref level) = cli.log_level {
        config.logging.level = level.clone();
    }
    init_tracing(&config);
    info!("Configuration loaded from {}", config_path.display());

    // ── Config validation mode ─────────────────────────────────
    if cli.check {
        config.validate()?;
        println!("Configuration is valid");
        println!("   Config file : {}", config_path.display());
        println!("   Storage     : {:?}", config.storage.backend);
        println!("   Database    : {}", config.database.url);
        println!("   Garages     : {}", config.garages.len());
        println!("   Log level   : {}", config.logging.level);
        return Ok(());
    }

    let prometheus = if cli.metrics {
        Some(metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?)
    } else {
        None
    };

    let Some(command) = cli.command else {
        error!("No command given; see --help");
        return Ok(());
    };

    let output = match command {
        Command::Migrate => {
            if config.storage.backend == StorageBackend::Memory {
                "In-memory storage has no schema; nothing to migrate".to_string()
            } else {
                let db = init_database(&config.database.connection_config()).await?;
                run_migrations(&db).await?;
                format!("Migrations applied to {}", config.database.url)
            }
        }
        Command::Preview {
            vehicle_type,
            garage,
            features,
        } => {
            let vehicle_type: VehicleType = vehicle_type.parse()?;
            let core = ParkingCore::from_config(&config).await?;
            let spot = core
                .orchestrator
                .find_best_spot(vehicle_type, &features, garage)
                .await?;
            serde_json::to_string_pretty(&spot)?
        }
        Command::Availability { garage } => {
            let core = ParkingCore::from_config(&config).await?;
            serde_json::to_string_pretty(&core.orchestrator.availability(garage).await?)?
        }
        Command::CheckIn {
            plate,
            vehicle_type,
            garage,
            features,
        } => {
            let mut request = CheckInRequest::new(plate, vehicle_type.parse()?).requiring(features);
            request.garage_id = garage;
            let core = ParkingCore::from_config(&config).await?;
            serde_json::to_string_pretty(&core.orchestrator.check_in(request).await?)?
        }
        Command::Estimate { session_id, at } => {
            let core = ParkingCore::from_config(&config).await?;
            let estimate = core.orchestrator.estimate_checkout(session_id, at).await?;
            serde_json::to_string_pretty(&estimate)?
        }
        Command::CheckOut { session_id } => {
            let core = ParkingCore::from_config(&config).await?;
            serde_json::to_string_pretty(&core.orchestrator.check_out(session_id).await?)?
        }
    };
    println!("{}", output);

    if let Some(handle) = prometheus {
        println!("{}", handle.render());
    }
    Ok(())
}
