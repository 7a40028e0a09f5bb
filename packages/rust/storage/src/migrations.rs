//! SQL migration definitions for the Localvore recipe database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Initial schema: collections, recipes, recipe_terms, FTS5",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named document buckets (BB, recipe1M, Epi, ...)
CREATE TABLE IF NOT EXISTS collections (
    name       TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

-- Recipe documents; list fields are JSON arrays
CREATE TABLE IF NOT EXISTS recipes (
    id               TEXT PRIMARY KEY,
    collection       TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
    source_id        TEXT,
    title            TEXT NOT NULL,
    url              TEXT,
    ingredients_json TEXT NOT NULL DEFAULT '[]',
    categories_json  TEXT NOT NULL DEFAULT '[]',
    keywords_json    TEXT NOT NULL DEFAULT '[]',
    cost             TEXT,
    rating           TEXT,
    instructions     TEXT,
    notes            TEXT,
    vector           BLOB,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE(collection, source_id),
    UNIQUE(collection, url)
);

CREATE INDEX IF NOT EXISTS idx_recipes_collection ON recipes(collection);

-- Lower-cased list entries, for "any element in" queries
CREATE TABLE IF NOT EXISTS recipe_terms (
    recipe_id TEXT NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
    field     TEXT NOT NULL,
    term      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_recipe_terms_lookup ON recipe_terms(field, term);
CREATE INDEX IF NOT EXISTS idx_recipe_terms_recipe ON recipe_terms(recipe_id);

-- Full-text search on titles
CREATE VIRTUAL TABLE IF NOT EXISTS recipes_fts USING fts5(
    title,
    content=recipes,
    content_rowid=rowid
);

CREATE TRIGGER IF NOT EXISTS recipes_fts_insert AFTER INSERT ON recipes BEGIN
    INSERT INTO recipes_fts(rowid, title) VALUES (new.rowid, new.title);
END;

CREATE TRIGGER IF NOT EXISTS recipes_fts_delete AFTER DELETE ON recipes BEGIN
    INSERT INTO recipes_fts(recipes_fts, rowid, title) VALUES ('delete', old.rowid, old.title);
END;

CREATE TRIGGER IF NOT EXISTS recipes_fts_update AFTER UPDATE OF title ON recipes BEGIN
    INSERT INTO recipes_fts(recipes_fts, rowid, title) VALUES ('delete', old.rowid, old.title);
    INSERT INTO recipes_fts(rowid, title) VALUES (new.rowid, new.title);
END;

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Scrape bookkeeping: pages, scrape_jobs",
            sql: r#"
-- Raw pages saved by the scraper
CREATE TABLE IF NOT EXISTS pages (
    id           TEXT PRIMARY KEY,
    site         TEXT NOT NULL,
    url          TEXT NOT NULL UNIQUE,
    path         TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    fetched_at   TEXT NOT NULL,
    status_code  INTEGER,
    content_len  INTEGER
);

CREATE INDEX IF NOT EXISTS idx_pages_site ON pages(site);

-- Scrape run history
CREATE TABLE IF NOT EXISTS scrape_jobs (
    id          TEXT PRIMARY KEY,
    site        TEXT NOT NULL,
    started_at  TEXT NOT NULL,
    finished_at TEXT,
    stats_json  TEXT
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
