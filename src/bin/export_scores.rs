//! Export a player's score records from CouchDB as CSV.
//!
//! Connection settings come from the same environment variables (and `.env`)
//! as the service.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geostudy::{
    config::{Settings, StoreBackend},
    error::{StudyError, StudyResult},
    state::export::{score_history, write_scores_csv, DEFAULT_EXPORT_LIMIT},
    store::CouchStore,
};

#[derive(Parser, Debug)]
#[command(name = "export_scores")]
#[command(about = "Export score records of a study player as CSV")]
struct Args {
    /// Player whose records are exported
    #[arg(short, long)]
    player: String,

    /// Maximum number of records
    #[arg(short, long, default_value_t = DEFAULT_EXPORT_LIMIT)]
    limit: usize,

    /// Output file; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Logs go to stderr so CSV on stdout stays clean
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geostudy=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        tracing::error!("Export failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> StudyResult<()> {
    let settings = Settings::from_env()?;
    if settings.store_backend != StoreBackend::CouchDb {
        return Err(StudyError::Config(
            "Exports read from CouchDB; unset STORE_BACKEND or set it to 'couchdb'".to_string(),
        ));
    }
    let store = CouchStore::new(&settings.couch_config()?)?;

    let records = score_history(&store, &args.player, args.limit).await?;
    tracing::info!(player = %args.player, count = records.len(), "Exporting score records");

    let writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };
    write_scores_csv(writer, &records)?;
    Ok(())
}
