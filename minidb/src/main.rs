#![cfg_attr(not(test), deny(clippy::unwrap_used))]

use minidb::config::DbConfig;
use minidb::repl;
use minidb::table::Table;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    // Logs go to stderr; stdout belongs to the REPL
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "minidb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match DbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        "Loaded configuration: database_file={}, order={}, max_rows={}",
        config.database_file.display(),
        config.order,
        config.max_rows
    );

    let mut table = match Table::open(&config) {
        Ok(table) => table,
        Err(e) => {
            tracing::error!("Failed to open {}: {e}", config.database_file.display());
            std::process::exit(1);
        }
    };

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    if let Err(e) = repl::run(&mut table, stdin.lock(), &mut stdout.lock(), &mut rand::rng()) {
        tracing::error!("Failed to read input: {e}");
        std::process::exit(1);
    }

    if let Err(e) = table.close() {
        tracing::error!("Failed to save {}: {e}", config.database_file.display());
        std::process::exit(1);
    }
}
