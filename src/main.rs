use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use datashed::server::{migrate_database, start_server, MigrateDirection};

#[derive(Parser)]
#[command(name = "datashed", about = "Versioned example-dataset store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
        #[arg(short, long, default_value = "datashed.db")]
        database: String,
        /// Capacity of the ingestion admission queue
        #[arg(long, default_value_t = 100)]
        queue_capacity: usize,
        #[arg(long)]
        cors_origin: Option<String>,
    },
    /// Run database migrations
    Migrate {
        #[arg(short, long, default_value = "datashed.db")]
        database: String,
        #[command(subcommand)]
        direction: MigrateDirection,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Serve {
            port,
            database,
            queue_capacity,
            cors_origin,
        } => start_server(port, &database, queue_capacity, cors_origin.as_deref()).await,
        Commands::Migrate {
            database,
            direction,
        } => migrate_database(&database, direction).await,
    }
}
