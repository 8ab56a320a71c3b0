use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use replay_history_api::{archive, db, import};

#[derive(Parser)]
#[command(name = "import-history")]
#[command(about = "import listening history exports from disk", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import one or more export files (.json or .zip) for a user
    Import {
        /// User to import for
        #[arg(value_name = "USER")]
        user: String,

        /// Export files, processed in the order given
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the current import status for a user
    Status {
        #[arg(value_name = "USER")]
        user: String,
    },

    /// Delete every imported play for a user
    Reset {
        #[arg(value_name = "USER")]
        user: String,

        /// Required; the deletion cannot be undone
        #[arg(long)]
        confirm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter("import_history=info,replay_history_api=info")
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Import { user, files } => handle_import(&user, &files).await,
        Commands::Status { user } => handle_status(&user).await,
        Commands::Reset { user, confirm } => handle_reset(&user, confirm).await,
    }
}

async fn handle_import(user: &str, paths: &[PathBuf]) -> Result<()> {
    let pool = db::init_db()
        .await
        .context("Failed to initialize database")?;

    // Unwrap every upload first; a corrupt archive skips that unit only
    let mut files = Vec::new();
    for path in paths {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("history.json")
            .to_string();
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        match archive::unwrap_upload(&name, bytes) {
            Ok(unwrapped) => files.extend(unwrapped),
            Err(e) => tracing::warn!("skipping {}: {}", path.display(), e),
        }
    }

    if files.is_empty() {
        tracing::warn!("no history files found in the given paths. Nothing to import.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current file");
            interrupt.cancel();
        }
    });

    tracing::info!("importing {} files for {}", files.len(), user);
    let batch = import::import_batch(&pool, user, &files, &cancel, |outcome| {
        if let Some(error) = &outcome.error {
            eprintln!("  {}: {}", outcome.file_name, error);
        } else if let Some(result) = &outcome.result {
            println!(
                "  {}: {} imported, {} duplicates, {} skipped of {}",
                outcome.file_name,
                result.imported,
                result.duplicates,
                result.skipped.total(),
                result.total
            );
        }
    })
    .await;

    let totals = &batch.totals;
    tracing::info!(
        "done: {} imported, {} duplicates, {} skipped across {} files",
        totals.imported,
        totals.duplicates,
        totals.skipped.total(),
        batch.files.len()
    );

    Ok(())
}

async fn handle_status(user: &str) -> Result<()> {
    let pool = db::init_db()
        .await
        .context("Failed to initialize database")?;

    let status = db::import_status(&pool, user).await?;
    match status.date_range {
        Some(range) => println!(
            "{}: {} distinct tracks, {} to {}",
            user, status.total_tracks, range.first, range.last
        ),
        None => println!("{}: no imported history", user),
    }

    Ok(())
}

async fn handle_reset(user: &str, confirm: bool) -> Result<()> {
    if !confirm {
        anyhow::bail!("refusing to delete imported history for {} without --confirm", user);
    }

    let pool = db::init_db()
        .await
        .context("Failed to initialize database")?;

    let deleted = db::delete_all_plays(&pool, user).await?;
    tracing::info!("deleted {} plays for {}", deleted, user);

    Ok(())
}
