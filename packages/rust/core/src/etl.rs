//! Recipe1M and Epicurious dataset loading.
//!
//! `layer1.json` is far too large to buffer, so top-level JSON arrays are
//! parsed element by element on a blocking thread and handed to the async
//! side over a bounded channel.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{self, DeserializeOwned, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use localvore_shared::{LocalvoreError, Recipe, Result};
use localvore_storage::Storage;

use crate::pipeline::ProgressReporter;
use crate::vectorize::{Vectorizer, vectorize_collection};

/// Items buffered between the parser thread and the database writer.
const CHANNEL_CAPACITY: usize = 1024;

/// Report progress every this many streamed items.
const PROGRESS_EVERY: usize = 1000;

// ---------------------------------------------------------------------------
// Streaming JSON arrays
// ---------------------------------------------------------------------------

/// Parse the top-level JSON array in `path` lazily.
///
/// Elements arrive on the returned receiver in file order; the handle yields
/// the element count, or the parse error that stopped the stream.
pub fn stream_json_array<T>(path: &Path) -> (mpsc::Receiver<T>, JoinHandle<Result<usize>>)
where
    T: DeserializeOwned + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    let path = path.to_path_buf();

    let handle = tokio::task::spawn_blocking(move || {
        let file = File::open(&path).map_err(|e| LocalvoreError::io(&path, e))?;
        let mut de = serde_json::Deserializer::from_reader(BufReader::new(file));
        let count = de
            .deserialize_seq(ArrayVisitor {
                tx,
                marker: PhantomData,
            })
            .and_then(|count| de.end().map(|()| count))
            .map_err(|e| LocalvoreError::parse(format!("{}: {e}", path.display())))?;
        Ok(count)
    });

    (rx, handle)
}

struct ArrayVisitor<T> {
    tx: mpsc::Sender<T>,
    marker: PhantomData<fn() -> T>,
}

impl<'de, T: DeserializeOwned> Visitor<'de> for ArrayVisitor<T> {
    type Value = usize;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<usize, A::Error> {
        let mut count = 0;
        while let Some(item) = seq.next_element::<T>()? {
            self.tx
                .blocking_send(item)
                .map_err(|_| de::Error::custom("reader stopped"))?;
            count += 1;
        }
        Ok(count)
    }
}

/// Wait for the parser thread and surface its error.
async fn join_stream(handle: JoinHandle<Result<usize>>) -> Result<usize> {
    handle
        .await
        .map_err(|e| LocalvoreError::parse(format!("JSON stream task failed: {e}")))?
}

// ---------------------------------------------------------------------------
// Batched writes
// ---------------------------------------------------------------------------

/// Commit and reopen the bulk transaction every [`PROGRESS_EVERY`] writes.
async fn checkpoint(storage: &Storage, written: usize) -> Result<()> {
    if written % PROGRESS_EVERY == 0 {
        storage.commit().await?;
        storage.begin().await?;
    }
    Ok(())
}

/// Commit a bulk write loop, or roll back its open batch when it failed.
async fn finish_batch<T>(storage: &Storage, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            storage.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = storage.rollback().await {
                warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Recipe1M layer1
// ---------------------------------------------------------------------------

/// A `{ "text": ... }` entry as used throughout Recipe1M.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextEntry {
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct Layer1Entry {
    id: String,
    title: String,
    url: String,
    #[serde(default)]
    instructions: Vec<TextEntry>,
}

/// Insert `{id, title, url}` for every `layer1.json` entry, upserting by id.
#[instrument(skip_all, fields(path = %path.display(), collection = %collection))]
pub async fn insert_layer1(
    path: &Path,
    storage: &Storage,
    collection: &str,
    progress: &dyn ProgressReporter,
) -> Result<usize> {
    storage.ensure_collection(collection).await?;
    progress.phase("Importing Recipe1M layer1");

    let (mut rx, handle) = stream_json_array::<Layer1Entry>(path);
    let mut inserted = 0;

    storage.begin().await?;
    let outcome = async {
        while let Some(entry) = rx.recv().await {
            let mut recipe = Recipe::new(collection, entry.title);
            recipe.source_id = Some(entry.id);
            recipe.url = Some(entry.url);
            if !entry.instructions.is_empty() {
                recipe.instructions = Some(
                    entry
                        .instructions
                        .into_iter()
                        .map(|t| t.text)
                        .collect::<Vec<_>>()
                        .join("\n"),
                );
            }
            storage.upsert_recipe(&recipe).await?;
            inserted += 1;
            checkpoint(storage, inserted).await?;
            if inserted % PROGRESS_EVERY == 0 {
                progress.item(inserted, 0, "layer1");
            }
        }
        Ok::<(), LocalvoreError>(())
    }
    .await;
    finish_batch(storage, outcome).await?;

    let parsed = join_stream(handle).await?;
    info!(parsed, inserted, "layer1 imported");
    Ok(inserted)
}

// ---------------------------------------------------------------------------
// Ingredient predictions
// ---------------------------------------------------------------------------

/// One `det_ingrs.json` row: raw ingredient lines and their detector flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub ingredients: Vec<TextEntry>,
    pub valid: Vec<bool>,
}

/// A recipe's ingredients after dropping the lines the detector rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredIngredients {
    pub id: String,
    pub ingredients: Vec<String>,
}

/// Read predictions from an `http(s)` URL or a local path.
#[instrument(skip_all, fields(source = %source))]
pub async fn load_predictions(source: &str) -> Result<Vec<Prediction>> {
    let rows: Vec<Prediction> = if source.starts_with("http://") || source.starts_with("https://") {
        let response = reqwest::get(source)
            .await
            .map_err(|e| LocalvoreError::Network(format!("{source}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(LocalvoreError::Network(format!("{source}: HTTP {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| LocalvoreError::Network(format!("{source}: body read failed: {e}")))?;
        serde_json::from_slice(&body)
            .map_err(|e| LocalvoreError::parse(format!("{source}: {e}")))?
    } else {
        let path = PathBuf::from(source);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| LocalvoreError::io(&path, e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LocalvoreError::parse(format!("{source}: {e}")))?
    };

    info!(rows = rows.len(), "predictions loaded");
    Ok(rows)
}

/// Keep the items whose flag is `true`. `None` when nothing is kept.
///
/// Pairs past the end of the shorter list are ignored.
pub fn compress<T: Clone>(items: &[T], valid: &[bool]) -> Option<Vec<T>> {
    let kept: Vec<T> = items
        .iter()
        .zip(valid)
        .filter(|&(_, &ok)| ok)
        .map(|(item, _)| item.clone())
        .collect();
    (!kept.is_empty()).then_some(kept)
}

/// Apply [`compress`] to every row, dropping rows with no valid ingredient.
pub fn filter_predictions(rows: Vec<Prediction>) -> Vec<FilteredIngredients> {
    let total = rows.len();
    let filtered: Vec<FilteredIngredients> = rows
        .into_iter()
        .filter_map(|row| {
            let texts: Vec<String> = row.ingredients.into_iter().map(|t| t.text).collect();
            compress(&texts, &row.valid).map(|ingredients| FilteredIngredients {
                id: row.id,
                ingredients,
            })
        })
        .collect();
    debug!(total, kept = filtered.len(), "predictions filtered");
    filtered
}

/// Overwrite the ingredients of each existing document by source id.
/// Returns `(updated, missing)`; rows with no document are never inserted.
#[instrument(skip_all, fields(collection = %collection, rows = rows.len()))]
pub async fn insert_ingredients(
    storage: &Storage,
    collection: &str,
    rows: &[FilteredIngredients],
    progress: &dyn ProgressReporter,
) -> Result<(usize, usize)> {
    progress.phase("Writing ingredients");
    let mut updated = 0;
    let mut missing = 0;

    storage.begin().await?;
    let outcome = async {
        for (i, row) in rows.iter().enumerate() {
            if storage
                .set_ingredients_by_source_id(collection, &row.id, &row.ingredients)
                .await?
            {
                updated += 1;
            } else {
                missing += 1;
            }
            checkpoint(storage, i + 1).await?;
            if (i + 1) % PROGRESS_EVERY == 0 || i + 1 == rows.len() {
                progress.item(i + 1, rows.len(), &row.id);
            }
        }
        Ok::<(), LocalvoreError>(())
    }
    .await;
    finish_batch(storage, outcome).await?;

    info!(updated, missing, "ingredients written");
    Ok((updated, missing))
}

// ---------------------------------------------------------------------------
// Generic document import
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ImportDocument {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    ingredients: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    categories: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    directions: Vec<String>,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    rating: Option<f64>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}

/// Stream a JSON array of recipe documents (Epicurious `full_format_recipes.json`
/// shape) into `collection`. Entries without a title are skipped; a title already
/// in the collection is overwritten, so re-importing a file is idempotent.
#[instrument(skip_all, fields(path = %path.display(), collection = %collection))]
pub async fn import_documents(
    path: &Path,
    storage: &Storage,
    collection: &str,
    progress: &dyn ProgressReporter,
) -> Result<usize> {
    storage.ensure_collection(collection).await?;
    progress.phase(&format!("Importing into {collection}"));

    let (mut rx, handle) = stream_json_array::<ImportDocument>(path);
    let mut imported = 0;
    let mut skipped = 0;

    storage.begin().await?;
    let outcome = async {
        while let Some(doc) = rx.recv().await {
            let Some(title) = doc.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
            else {
                skipped += 1;
                continue;
            };
            let mut recipe = Recipe::new(collection, title);
            recipe.ingredients = doc.ingredients;
            recipe.categories = doc.categories;
            recipe.instructions = (!doc.directions.is_empty()).then(|| doc.directions.join("\n"));
            recipe.notes = doc.desc;
            recipe.rating = doc.rating.map(|r| r.to_string());

            storage.upsert_recipe_by_title(&recipe).await?;
            imported += 1;
            checkpoint(storage, imported).await?;
            if imported % PROGRESS_EVERY == 0 {
                progress.item(imported, 0, collection);
            }
        }
        Ok::<(), LocalvoreError>(())
    }
    .await;
    finish_batch(storage, outcome).await?;

    join_stream(handle).await?;
    if skipped > 0 {
        warn!(skipped, "documents without a title were skipped");
    }
    info!(imported, "documents imported");
    Ok(imported)
}

// ---------------------------------------------------------------------------
// run_etl
// ---------------------------------------------------------------------------

/// Inputs of a full Recipe1M ETL run.
#[derive(Debug, Clone)]
pub struct EtlOptions {
    pub collection: String,
    /// `layer1.json` to import first; skipped when `None`.
    pub layer1: Option<PathBuf>,
    /// URL or path of `det_ingrs.json`.
    pub predictions: String,
    /// Compute recipe vectors after the ingredients are written.
    pub vectorize: bool,
}

/// Counts from a full ETL run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EtlReport {
    pub layer1_inserted: usize,
    pub predictions: usize,
    /// Prediction rows with no valid ingredient.
    pub dropped: usize,
    pub updated: usize,
    pub missing: usize,
    pub vectorized: usize,
}

/// Collection init, optional layer1 import, prediction filtering and write,
/// then optional vectorization.
#[instrument(skip_all, fields(collection = %options.collection))]
pub async fn run_etl(
    storage: &Storage,
    options: &EtlOptions,
    vectorizer: &dyn Vectorizer,
    progress: &dyn ProgressReporter,
) -> Result<EtlReport> {
    let mut report = EtlReport::default();
    storage.ensure_collection(&options.collection).await?;

    if let Some(layer1) = &options.layer1 {
        report.layer1_inserted = insert_layer1(layer1, storage, &options.collection, progress).await?;
    }

    progress.phase("Loading ingredient predictions");
    let rows = load_predictions(&options.predictions).await?;
    report.predictions = rows.len();
    let filtered = filter_predictions(rows);
    report.dropped = report.predictions - filtered.len();

    let (updated, missing) =
        insert_ingredients(storage, &options.collection, &filtered, progress).await?;
    report.updated = updated;
    report.missing = missing;

    if options.vectorize {
        report.vectorized =
            vectorize_collection(storage, &options.collection, vectorizer, progress).await?;
    }

    progress.done(&format!(
        "{} updated, {} missing, {} vectorized",
        report.updated, report.missing, report.vectorized
    ));
    info!(?report, "ETL complete");
    Ok(report)
}
