//! Ingredient cleanup over stored collections, and tokenization for vectorizers.

use tracing::{info, instrument, warn};

use localvore_shared::Result;
use localvore_storage::Storage;

pub use localvore_scraper::strip_details;

use crate::pipeline::ProgressReporter;

/// Outcome of a [`trim_ingredients`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimResult {
    /// Documents whose ingredient list changed.
    pub updated: usize,
    /// Documents that could not be written back.
    pub failures: usize,
}

/// Apply [`strip_details`] to every document in `collection`.
#[instrument(skip_all, fields(collection = %collection))]
pub async fn trim_ingredients(
    storage: &Storage,
    collection: &str,
    progress: &dyn ProgressReporter,
) -> Result<TrimResult> {
    let recipes = storage.list_recipes(collection).await?;
    let total = recipes.len();
    let mut result = TrimResult::default();

    progress.phase("Trimming ingredients");
    for (i, recipe) in recipes.iter().enumerate() {
        let trimmed = strip_details(&recipe.ingredients);
        if trimmed != recipe.ingredients {
            match storage.set_ingredients(&recipe.id, &trimmed).await {
                Ok(()) => result.updated += 1,
                Err(e) => {
                    warn!(id = %recipe.id, error = %e, "failed to trim ingredients");
                    result.failures += 1;
                }
            }
        }
        progress.item(i + 1, total, &recipe.title);
    }

    info!(
        updated = result.updated,
        failures = result.failures,
        "ingredients trimmed"
    );
    Ok(result)
}

/// Lower-case `text` and split it into word tokens.
///
/// Apostrophes inside a word are kept (`baker's`); everything else that is
/// not alphanumeric separates tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use localvore_shared::Recipe;
    use uuid::Uuid;

    async fn temp_storage() -> (Storage, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("lv_test_{}.db", Uuid::now_v7()));
        (Storage::open(&path).await.unwrap(), path)
    }

    #[test]
    fn tokenize_keeps_inner_apostrophes() {
        assert_eq!(
            tokenize("Baker's  Yeast, 'Dry'-Active"),
            vec!["baker's", "yeast", "dry", "active"]
        );
        assert!(tokenize(" ,;- ").is_empty());
    }

    #[tokio::test]
    async fn trim_updates_only_changed_documents() {
        let (storage, path) = temp_storage().await;

        let mut messy = Recipe::new("BB", "Chili");
        messy.ingredients = vec!["1 onion (large), diced".into(), "kale".into()];
        storage.insert_recipe(&messy).await.unwrap();

        let mut clean = Recipe::new("BB", "Salad");
        clean.ingredients = vec!["lettuce".into()];
        storage.insert_recipe(&clean).await.unwrap();

        let result = trim_ingredients(&storage, "BB", &SilentProgress).await.unwrap();
        assert_eq!(result, TrimResult { updated: 1, failures: 0 });

        let stored = storage.get_recipe(&messy.id).await.unwrap().unwrap();
        assert_eq!(stored.ingredients, vec!["1 onion", "kale"]);

        let _ = std::fs::remove_file(&path);
    }
}
