//! libSQL document store for recipe collections.
//!
//! The [`Storage`] struct wraps a local libSQL database holding named
//! collections of recipe documents, a lower-cased term index used for
//! "any ingredient in" queries, recipe vectors, saved-page bookkeeping for
//! the scraper, and full-text search over titles.
//!
//! **Access rules:**
//! - CLI pipelines: read-write via [`Storage::open`]
//! - Menu API: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Value, params};
use localvore_shared::{LocalvoreError, Recipe, RecipeId, Result, TermField};
use uuid::Uuid;

/// Columns selected for every recipe read, in [`row_to_recipe`] order.
const RECIPE_COLUMNS: &str = "id, collection, source_id, title, url, ingredients_json, \
     categories_json, keywords_json, cost, rating, instructions, notes, vector, \
     created_at, updated_at";

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LocalvoreError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LocalvoreError::Storage(format!(
                "database {} does not exist",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        LocalvoreError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(LocalvoreError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    /// Start a write transaction.
    pub async fn begin(&self) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute_batch("BEGIN")
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Commit the open transaction.
    pub async fn commit(&self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Roll back the open transaction.
    pub async fn rollback(&self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collection operations
    // -----------------------------------------------------------------------

    /// Create `name` if it does not exist yet.
    pub async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.check_writable()?;
        if name.trim().is_empty() {
            return Err(LocalvoreError::validation("collection name must not be empty"));
        }
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO collections (name, created_at) VALUES (?1, ?2)
                 ON CONFLICT(name) DO NOTHING",
                params![name, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// List collections with their document counts. Returns `Vec<(name, count)>`.
    pub async fn list_collections(&self) -> Result<Vec<(String, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.name, COUNT(r.id)
                 FROM collections c LEFT JOIN recipes r ON r.collection = c.name
                 GROUP BY c.name ORDER BY c.name",
                params![],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push((
                row.get::<String>(0).map_err(storage_err)?,
                row.get::<i64>(1).map_err(storage_err)? as u64,
            ));
        }
        Ok(results)
    }

    /// Whether a collection has been created.
    pub async fn collection_exists(&self, name: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM collections WHERE name = ?1", params![name])
            .await
            .map_err(storage_err)?;
        Ok(matches!(rows.next().await, Ok(Some(_))))
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM recipes WHERE collection = ?1",
                params![collection],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).map_err(storage_err)? as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Delete a collection and all of its documents. Returns the number of documents removed.
    pub async fn drop_collection(&self, name: &str) -> Result<u64> {
        self.check_writable()?;
        self.conn
            .execute(
                "DELETE FROM recipe_terms WHERE recipe_id IN
                   (SELECT id FROM recipes WHERE collection = ?1)",
                params![name],
            )
            .await
            .map_err(storage_err)?;
        let removed = self
            .conn
            .execute("DELETE FROM recipes WHERE collection = ?1", params![name])
            .await
            .map_err(storage_err)?;
        self.conn
            .execute("DELETE FROM collections WHERE name = ?1", params![name])
            .await
            .map_err(storage_err)?;
        tracing::info!(collection = name, removed, "dropped collection");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Recipe operations
    // -----------------------------------------------------------------------

    /// Insert a new recipe document. Fails if its `source_id` or `url` already exists.
    pub async fn insert_recipe(&self, recipe: &Recipe) -> Result<()> {
        self.check_writable()?;
        self.ensure_collection(&recipe.collection).await?;
        self.conn
            .execute(
                "INSERT INTO recipes (id, collection, source_id, title, url, ingredients_json,
                    categories_json, keywords_json, cost, rating, instructions, notes, vector,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                params![
                    recipe.id.to_string(),
                    recipe.collection.as_str(),
                    recipe.source_id.as_deref(),
                    recipe.title.as_str(),
                    recipe.url.as_deref(),
                    to_json(&recipe.ingredients)?,
                    to_json(&recipe.categories)?,
                    to_json(&recipe.keywords)?,
                    recipe.cost.as_deref(),
                    recipe.rating.as_deref(),
                    recipe.instructions.as_deref(),
                    recipe.notes.as_deref(),
                    vector_value(recipe.vector.as_deref()),
                    recipe.created_at.to_rfc3339(),
                    recipe.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(storage_err)?;

        let id = recipe.id.to_string();
        self.replace_terms(&id, TermField::Ingredients, &recipe.ingredients)
            .await?;
        self.replace_terms(&id, TermField::Categories, &recipe.categories)
            .await?;
        self.replace_terms(&id, TermField::Keywords, &recipe.keywords)
            .await?;
        Ok(())
    }

    /// Insert `recipe`, or overwrite the document in the same collection that shares
    /// its `source_id` (checked first) or `url`. Returns the id of the stored document.
    pub async fn upsert_recipe(&self, recipe: &Recipe) -> Result<RecipeId> {
        self.check_writable()?;

        let mut existing = None;
        if let Some(source_id) = &recipe.source_id {
            existing = self
                .find_id("source_id", &recipe.collection, source_id)
                .await?;
        }
        if existing.is_none() {
            if let Some(url) = &recipe.url {
                existing = self.find_id("url", &recipe.collection, url).await?;
            }
        }

        match existing {
            Some(id) => self.overwrite_recipe(&id, recipe).await,
            None => {
                self.insert_recipe(recipe).await?;
                Ok(recipe.id.clone())
            }
        }
    }

    /// Insert `recipe`, or overwrite the document in the same collection with the
    /// same title. For sources that carry neither an id nor a url.
    pub async fn upsert_recipe_by_title(&self, recipe: &Recipe) -> Result<RecipeId> {
        self.check_writable()?;
        match self.find_id("title", &recipe.collection, &recipe.title).await? {
            Some(id) => self.overwrite_recipe(&id, recipe).await,
            None => {
                self.insert_recipe(recipe).await?;
                Ok(recipe.id.clone())
            }
        }
    }

    /// Replace every field of document `id` with those of `recipe`, keeping the id.
    async fn overwrite_recipe(&self, id: &str, recipe: &Recipe) -> Result<RecipeId> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE recipes SET source_id = ?1, title = ?2, url = ?3, ingredients_json = ?4,
                    categories_json = ?5, keywords_json = ?6, cost = ?7, rating = ?8,
                    instructions = ?9, notes = ?10, vector = ?11, updated_at = ?12
                 WHERE id = ?13",
                params![
                    recipe.source_id.as_deref(),
                    recipe.title.as_str(),
                    recipe.url.as_deref(),
                    to_json(&recipe.ingredients)?,
                    to_json(&recipe.categories)?,
                    to_json(&recipe.keywords)?,
                    recipe.cost.as_deref(),
                    recipe.rating.as_deref(),
                    recipe.instructions.as_deref(),
                    recipe.notes.as_deref(),
                    vector_value(recipe.vector.as_deref()),
                    now.as_str(),
                    id,
                ],
            )
            .await
            .map_err(storage_err)?;

        self.replace_terms(id, TermField::Ingredients, &recipe.ingredients)
            .await?;
        self.replace_terms(id, TermField::Categories, &recipe.categories)
            .await?;
        self.replace_terms(id, TermField::Keywords, &recipe.keywords)
            .await?;

        id.parse()
            .map_err(|e| LocalvoreError::Storage(format!("invalid recipe id {id}: {e}")))
    }

    /// Look up a document id by a unique column within a collection.
    async fn find_id(&self, column: &str, collection: &str, value: &str) -> Result<Option<String>> {
        let sql = format!("SELECT id FROM recipes WHERE collection = ?1 AND {column} = ?2");
        let mut rows = self
            .conn
            .query(&sql, params![collection, value])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get a recipe by id.
    pub async fn get_recipe(&self, id: &RecipeId) -> Result<Option<Recipe>> {
        let sql = format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id.to_string()])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_recipe(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Get a recipe by its upstream identifier.
    pub async fn get_by_source_id(
        &self,
        collection: &str,
        source_id: &str,
    ) -> Result<Option<Recipe>> {
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE collection = ?1 AND source_id = ?2"
        );
        let mut rows = self
            .conn
            .query(&sql, params![collection, source_id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_recipe(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// List every document in a collection, in insertion order.
    pub async fn list_recipes(&self, collection: &str) -> Result<Vec<Recipe>> {
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes WHERE collection = ?1 ORDER BY rowid"
        );
        let mut rows = self
            .conn
            .query(&sql, params![collection])
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_recipe(&row)?);
        }
        Ok(results)
    }

    /// Replace a document's ingredient list.
    pub async fn set_ingredients(&self, id: &RecipeId, ingredients: &[String]) -> Result<()> {
        self.check_writable()?;
        let id = id.to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE recipes SET ingredients_json = ?1, updated_at = ?2 WHERE id = ?3",
                params![to_json(ingredients)?, now.as_str(), id.as_str()],
            )
            .await
            .map_err(storage_err)?;
        self.replace_terms(&id, TermField::Ingredients, ingredients)
            .await
    }

    /// Replace the ingredient list of the document with `source_id`.
    /// Returns `false` when no such document exists; nothing is created.
    pub async fn set_ingredients_by_source_id(
        &self,
        collection: &str,
        source_id: &str,
        ingredients: &[String],
    ) -> Result<bool> {
        self.check_writable()?;
        match self.find_id("source_id", collection, source_id).await? {
            Some(id) => {
                let id: RecipeId = id
                    .parse()
                    .map_err(|e| LocalvoreError::Storage(format!("invalid recipe id {id}: {e}")))?;
                self.set_ingredients(&id, ingredients).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Store a document's recipe vector.
    pub async fn set_vector(&self, id: &RecipeId, vector: &[f32]) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE recipes SET vector = ?1, updated_at = ?2 WHERE id = ?3",
                params![vector_value(Some(vector)), now.as_str(), id.to_string()],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Documents in `collection` whose `field` list contains at least one of `terms`.
    ///
    /// Matching is exact after trimming and lower-casing both sides.
    pub async fn find_by_terms(
        &self,
        collection: &str,
        field: TermField,
        terms: &[String],
    ) -> Result<Vec<Recipe>> {
        let normalized: Vec<String> = terms.iter().map(|t| normalize_term(t)).collect();
        let sql = format!(
            "SELECT {RECIPE_COLUMNS} FROM recipes
             WHERE collection = ?1 AND id IN (
                 SELECT recipe_id FROM recipe_terms
                 WHERE field = ?2 AND term IN (SELECT value FROM json_each(?3))
             )
             ORDER BY rowid"
        );
        let mut rows = self
            .conn
            .query(
                &sql,
                params![collection, field.as_str(), to_json(&normalized)?],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_recipe(&row)?);
        }
        Ok(results)
    }

    /// Rewrite the term index rows of one field of a document.
    async fn replace_terms(&self, recipe_id: &str, field: TermField, values: &[String]) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM recipe_terms WHERE recipe_id = ?1 AND field = ?2",
                params![recipe_id, field.as_str()],
            )
            .await
            .map_err(storage_err)?;

        for value in values {
            let term = normalize_term(value);
            if term.is_empty() {
                continue;
            }
            self.conn
                .execute(
                    "INSERT INTO recipe_terms (recipe_id, field, term) VALUES (?1, ?2, ?3)",
                    params![recipe_id, field.as_str(), term],
                )
                .await
                .map_err(storage_err)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // FTS search
    // -----------------------------------------------------------------------

    /// Full-text search over recipe titles in a collection.
    pub async fn search_titles(
        &self,
        collection: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<SearchResult>> {
        let mut rows = self
            .conn
            .query(
                "SELECT r.id, r.title, rank
                 FROM recipes_fts fts
                 JOIN recipes r ON r.rowid = fts.rowid
                 WHERE recipes_fts MATCH ?1 AND r.collection = ?2
                 ORDER BY rank
                 LIMIT ?3",
                params![query, collection, limit],
            )
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let id: String = row.get(0).map_err(storage_err)?;
            let title: String = row.get(1).map_err(storage_err)?;
            let score: f64 = row.get(2).unwrap_or(0.0);
            results.push(SearchResult {
                id: id
                    .parse()
                    .map_err(|e| LocalvoreError::Storage(format!("invalid recipe id {id}: {e}")))?,
                title,
                score,
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Scrape bookkeeping
    // -----------------------------------------------------------------------

    /// Record (or refresh) a saved raw page.
    pub async fn record_page(&self, page: &SavedPage) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO pages (id, site, url, path, content_hash, fetched_at, status_code, content_len)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(url) DO UPDATE SET
                   path = excluded.path,
                   content_hash = excluded.content_hash,
                   fetched_at = excluded.fetched_at,
                   status_code = excluded.status_code,
                   content_len = excluded.content_len",
                params![
                    Uuid::now_v7().to_string(),
                    page.site.as_str(),
                    page.url.as_str(),
                    page.path.as_str(),
                    page.content_hash.as_str(),
                    page.fetched_at.to_rfc3339(),
                    i64::from(page.status_code),
                    page.content_len as i64,
                ],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Get the saved page record for a URL.
    pub async fn get_page(&self, url: &str) -> Result<Option<SavedPage>> {
        let mut rows = self
            .conn
            .query(
                "SELECT site, url, path, content_hash, fetched_at, status_code, content_len
                 FROM pages WHERE url = ?1",
                params![url],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(SavedPage {
                site: row.get::<String>(0).map_err(storage_err)?,
                url: row.get::<String>(1).map_err(storage_err)?,
                path: row.get::<String>(2).map_err(storage_err)?,
                content_hash: row.get::<String>(3).map_err(storage_err)?,
                fetched_at: parse_time(&row.get::<String>(4).map_err(storage_err)?)?,
                status_code: row.get::<i64>(5).map(|v| v as u16).unwrap_or(0),
                content_len: row.get::<i64>(6).map(|v| v as usize).unwrap_or(0),
            })),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Insert a new scrape job. Returns the generated job ID.
    pub async fn insert_scrape_job(&self, site: &str) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO scrape_jobs (id, site, started_at) VALUES (?1, ?2, ?3)",
                params![id.as_str(), site, now.as_str()],
            )
            .await
            .map_err(storage_err)?;
        Ok(id)
    }

    /// Mark a scrape job finished with its stats.
    pub async fn finish_scrape_job(&self, job_id: &str, stats_json: &str) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE scrape_jobs SET finished_at = ?1, stats_json = ?2 WHERE id = ?3",
                params![now.as_str(), stats_json, job_id],
            )
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    /// Id of the most recently started scrape job for `site`.
    pub async fn latest_scrape_job(&self, site: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id FROM scrape_jobs WHERE site = ?1 ORDER BY started_at DESC, id DESC LIMIT 1",
                params![site],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row.get::<String>(0).map_err(storage_err)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// Stats JSON of a finished scrape job, if it has finished.
    pub async fn scrape_job_stats(&self, job_id: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT stats_json FROM scrape_jobs WHERE id = ?1",
                params![job_id],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<String>(0).ok()),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }
}

/// A title search hit from FTS5.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: RecipeId,
    pub title: String,
    /// FTS5 rank score (lower is better).
    pub score: f64,
}

/// A raw recipe page written to disk by the scraper.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedPage {
    /// Site (collection) the page belongs to.
    pub site: String,
    pub url: String,
    /// Path of the saved HTML file.
    pub path: String,
    /// SHA-256 of the page body.
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
    pub status_code: u16,
    pub content_len: usize,
}

/// Encode a vector as a little-endian `f32` blob.
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob.
pub fn decode_vector(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(LocalvoreError::Storage(format!(
            "vector blob of {} bytes is not a whole number of f32 values",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn vector_value(vector: Option<&[f32]>) -> Value {
    match vector {
        Some(v) => Value::Blob(encode_vector(v)),
        None => Value::Null,
    }
}

fn normalize_term(term: &str) -> String {
    term.trim().to_lowercase()
}

fn storage_err(e: impl std::fmt::Display) -> LocalvoreError {
    LocalvoreError::Storage(e.to_string())
}

fn to_json(values: &[String]) -> Result<String> {
    serde_json::to_string(values).map_err(storage_err)
}

fn from_json(s: &str) -> Result<Vec<String>> {
    serde_json::from_str(s).map_err(|e| LocalvoreError::Storage(format!("corrupt list column: {e}")))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LocalvoreError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row selected with [`RECIPE_COLUMNS`] to a [`Recipe`].
fn row_to_recipe(row: &libsql::Row) -> Result<Recipe> {
    let id: String = row.get(0).map_err(storage_err)?;
    let vector = match row.get_value(12).map_err(storage_err)? {
        Value::Blob(bytes) => Some(decode_vector(&bytes)?),
        _ => None,
    };

    Ok(Recipe {
        id: id
            .parse()
            .map_err(|e| LocalvoreError::Storage(format!("invalid recipe id {id}: {e}")))?,
        collection: row.get::<String>(1).map_err(storage_err)?,
        source_id: row.get::<String>(2).ok(),
        title: row.get::<String>(3).map_err(storage_err)?,
        url: row.get::<String>(4).ok(),
        ingredients: from_json(&row.get::<String>(5).map_err(storage_err)?)?,
        categories: from_json(&row.get::<String>(6).map_err(storage_err)?)?,
        keywords: from_json(&row.get::<String>(7).map_err(storage_err)?)?,
        cost: row.get::<String>(8).ok(),
        rating: row.get::<String>(9).ok(),
        instructions: row.get::<String>(10).ok(),
        notes: row.get::<String>(11).ok(),
        vector,
        created_at: parse_time(&row.get::<String>(13).map_err(storage_err)?)?,
        updated_at: parse_time(&row.get::<String>(14).map_err(storage_err)?)?,
    })
}
