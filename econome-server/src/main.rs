use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use econome_server::{
    api::{router, AppState},
    config::Config,
    database::Database,
    generation::RecipeGenerator,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Args {
    /// The address and optionally port to bind to
    #[clap(long, default_value = "0.0.0.0:8000")]
    address: String,

    /// Write JSON logs to a daily file in this directory instead of stdout
    #[clap(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    // Parse command line arguments
    let args = Args::parse();

    // initialize tracing
    let _guard = match &args.log_dir {
        Some(log_dir) => {
            let file_appender = tracing_appender::rolling::daily(log_dir, "econome.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .json()
                .with_writer(non_blocking)
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            None
        }
    };

    let config = Config::from_env().context("Loading configuration")?;

    // connect to the database
    let db = Database::connect(&config.database)
        .await
        .with_context(|| format!("Connecting to database at {}", config.database.url))?;
    let generator = RecipeGenerator::from_config(&config).context("Building recipe generator")?;

    let app = router(AppState {
        db,
        generator: Arc::new(generator),
    });

    let listener = tokio::net::TcpListener::bind(&args.address)
        .await
        .with_context(|| format!("Binding to {}", args.address))?;
    tracing::info!("Listening on {}", args.address);
    axum::serve(listener, app).await?;
    Ok(())
}
