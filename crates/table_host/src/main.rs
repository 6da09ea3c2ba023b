//! Table host entry point
//!
//! Loads configuration, creates the table listener, attaches bots through
//! the in-process transport and runs until every bot has left or a shutdown
//! signal arrives.

mod bots;
mod cli;
mod config;
mod logging;
mod signals;
mod table;

use local_transport::{Listener, Registry};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::bots::{join_bots, spawn_bots};
use crate::cli::CliArgs;
use crate::config::AppConfig;
use crate::logging::setup_logging;
use crate::signals::wait_for_shutdown_signal;
use crate::table::{reap_departed, run_accept_loop};

/// Main application struct
pub struct Application {
    config: AppConfig,
    registry: Arc<Registry<Value>>,
    listener: Arc<Listener<Value>>,
}

impl Application {
    /// Loads configuration, sets up logging and creates the table listener.
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Configuration comes first so logging can honour its settings.
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        config.apply_overrides(&args);
        if let Err(e) = config.validate() {
            anyhow::bail!("Configuration validation failed: {}", e);
        }

        setup_logging(&config.logging)?;

        let registry = Arc::new(Registry::with_config(config.transport.clone()));
        let listener = registry.create_listener(config.table.name.as_str())?;

        info!(
            "Config: {} | Table: {} | Bots: {} | Backlog: {}",
            args.config_path.display(),
            config.table.name,
            config.table.bots,
            config.transport.backlog_capacity
        );

        Ok(Self {
            config,
            registry,
            listener,
        })
    }

    /// Runs the table until the bots are done or a signal arrives.
    pub async fn run(self) -> anyhow::Result<()> {
        let accept_handle = {
            let listener = self.listener.clone();
            tokio::task::spawn_blocking(move || run_accept_loop(listener))
        };

        let reaper_handle = {
            let listener = self.listener.clone();
            let period = Duration::from_millis(self.config.table.reap_interval_ms);
            tokio::spawn(async move {
                let mut ticker = interval(period);
                loop {
                    ticker.tick().await;
                    reap_departed(&listener);
                }
            })
        };

        let bot_handles = spawn_bots(
            &self.registry,
            &self.config.table.name,
            self.config.table.bots,
            self.config.table.rounds,
        )?;
        let bots_done = tokio::task::spawn_blocking(move || join_bots(bot_handles));

        info!("Table {} is open", self.config.table.name);

        tokio::select! {
            outcome = bots_done => {
                let outcome = outcome?;
                info!(
                    "All bots finished: {} completed, {} failed",
                    outcome.reports.len(),
                    outcome.failed
                );
                for report in &outcome.reports {
                    info!(bot = %report.name, seat = report.seat, rolls = ?report.rolls, "bot report");
                }
            }
            signal = wait_for_shutdown_signal() => {
                if let Err(e) = signal {
                    warn!("Signal handling failed: {}", e);
                }
                info!("Shutdown signal received, closing table");
            }
        }

        // One last sweep so seats vacated during the final rounds are released gracefully.
        reap_departed(&self.listener);
        self.listener.close();
        reaper_handle.abort();

        let stats = accept_handle.await??;
        info!(
            "Table {} closed: {} seats served, {} messages handled",
            self.config.table.name, stats.seats_served, stats.messages_handled
        );
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let args = CliArgs::parse();

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Failed to start application: {:?}", e);
            std::process::exit(1);
        }
    }
}
