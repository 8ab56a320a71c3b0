use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use tokio_util::sync::CancellationToken;

use crate::archive::ExportFile;
use crate::classify::{self, Classified, SkipCounts};
use crate::db;
use crate::dedupe::{self, PlayKey};
use crate::error::ImportError;
use crate::export;

/// Count breakdown for one file, or for a whole batch once folded.
/// Invariant: total == imported + duplicates + skipped.total().
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportResult {
    pub total: u64,
    pub imported: u64,
    pub duplicates: u64,
    pub skipped: SkipCounts,
}

impl ImportResult {
    pub fn merge(&mut self, other: &ImportResult) {
        self.total += other.total;
        self.imported += other.imported;
        self.duplicates += other.duplicates;
        self.skipped.merge(&other.skipped);
    }

    pub fn is_balanced(&self) -> bool {
        self.total == self.imported + self.duplicates + self.skipped.total()
    }
}

/// What happened to one file of a batch: a count breakdown or an error
/// message, never both.
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ImportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    fn ok(file_name: &str, result: ImportResult) -> Self {
        FileOutcome {
            file_name: file_name.to_string(),
            result: Some(result),
            error: None,
        }
    }

    fn failed(file_name: &str, error: &ImportError) -> Self {
        FileOutcome {
            file_name: file_name.to_string(),
            result: None,
            error: Some(error.to_string()),
        }
    }
}

/// One batch submission: per-file outcomes in submission order plus
/// the totals folded over the files that succeeded.
#[derive(Debug, Serialize)]
pub struct BatchImportResult {
    pub files: Vec<FileOutcome>,
    pub totals: ImportResult,
    pub cancelled: bool,
}

/// Run one file through validate -> classify -> dedupe -> persist.
///
/// Persistence is transactional per file, so a failure here leaves
/// storage exactly as it was and the file is safe to retry in full.
/// Re-submitting an already-imported file reports every entry as a
/// duplicate and imports nothing.
pub async fn import_file(
    pool: &PgPool,
    user_id: &str,
    file: &ExportFile,
) -> Result<ImportResult, ImportError> {
    tracing::debug!("validating {}", file.name);
    let entries = export::parse_export(&file.name, &file.contents)?;
    let total = entries.len() as u64;

    tracing::debug!("classifying {} entries from {}", total, file.name);
    let mut skipped = SkipCounts::default();
    let mut candidates = Vec::new();
    for entry in entries {
        match classify::classify(entry) {
            Classified::Countable(candidate) => candidates.push(candidate),
            Classified::Excluded(reason) => skipped.record(reason),
        }
    }

    tracing::debug!(
        "deduplicating {} candidates from {}",
        candidates.len(),
        file.name
    );
    let keys: Vec<PlayKey> = candidates.iter().map(PlayKey::of).collect();
    let existing = db::fetch_existing_play_keys(pool, user_id, &keys).await?;
    let partition = dedupe::partition(candidates, &existing);

    let attempted = partition.new.len() as u64;
    let inserted = db::insert_plays(pool, user_id, &partition.new).await?;
    // rows lost to a concurrent import of the same key count as duplicates
    let duplicates = partition.duplicates + (attempted - inserted);

    let result = ImportResult {
        total,
        imported: inserted,
        duplicates,
        skipped,
    };
    debug_assert!(result.is_balanced());
    Ok(result)
}

/// Drive a batch of files through the pipeline sequentially, in
/// submission order. Each file is an independent unit of work: a
/// failure is recorded in its outcome and the next file proceeds.
/// `on_file` fires once per completed file; cancellation is honored
/// between files, leaving completed work committed.
pub async fn import_batch(
    pool: &PgPool,
    user_id: &str,
    files: &[ExportFile],
    cancel: &CancellationToken,
    mut on_file: impl FnMut(&FileOutcome),
) -> BatchImportResult {
    let mut outcomes = Vec::with_capacity(files.len());
    let mut totals = ImportResult::default();
    let mut cancelled = false;

    for file in files {
        if cancel.is_cancelled() {
            tracing::warn!(
                "import cancelled with {} of {} files processed",
                outcomes.len(),
                files.len()
            );
            cancelled = true;
            break;
        }

        let outcome = match import_file(pool, user_id, file).await {
            Ok(result) => {
                tracing::info!(
                    "{}: imported {} of {} entries ({} duplicates, {} skipped)",
                    file.name,
                    result.imported,
                    result.total,
                    result.duplicates,
                    result.skipped.total()
                );
                totals.merge(&result);
                FileOutcome::ok(&file.name, result)
            }
            Err(e) => {
                tracing::warn!("{} failed: {}", file.name, e);
                FileOutcome::failed(&file.name, &e)
            }
        };
        on_file(&outcome);
        outcomes.push(outcome);
    }

    BatchImportResult {
        files: outcomes,
        totals,
        cancelled,
    }
}
