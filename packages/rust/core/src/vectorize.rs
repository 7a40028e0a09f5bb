//! Recipe vectors: the [`Vectorizer`] trait, a word-vector model, and a
//! hashing fallback for when no model file is configured.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use localvore_shared::{LocalvoreError, Result, VectorizerConfig, expand_home};
use localvore_storage::Storage;

use crate::pipeline::ProgressReporter;
use crate::text::tokenize;

/// Turns recipe text into a fixed-dimension vector.
pub trait Vectorizer: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &str;

    /// Length of every vector returned by [`Vectorizer::embed`].
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Space-joined, lower-cased ingredient list fed to a vectorizer.
pub fn recipe_text<S: AsRef<str>>(ingredients: &[S]) -> String {
    ingredients
        .iter()
        .map(|i| i.as_ref().to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// WordVectors
// ---------------------------------------------------------------------------

/// Pretrained word vectors in word2vec/GloVe text format.
///
/// Each line is `word v1 .. vn`. An optional first line `count dim` is
/// accepted and checked against the rows that follow.
#[derive(Debug)]
pub struct WordVectors {
    name: String,
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl WordVectors {
    /// Load vectors from a text file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| LocalvoreError::io(path, e))?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "word-vectors".into());
        Self::from_reader(BufReader::new(file), name)
    }

    /// Parse vectors from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R, name: impl Into<String>) -> Result<Self> {
        let mut dimension: Option<usize> = None;
        let mut vectors = HashMap::new();

        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line.map_err(|e| LocalvoreError::parse(format!("line {line_no}: {e}")))?;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let rest: Vec<&str> = fields.collect();

            if line_no == 1 && rest.len() == 1 {
                if let (Ok(_), Ok(dim)) = (word.parse::<usize>(), rest[0].parse::<usize>()) {
                    dimension = Some(dim);
                    continue;
                }
            }

            let values = rest
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| LocalvoreError::parse(format!("line {line_no}: {e}")))?;

            match dimension {
                Some(dim) if dim != values.len() => {
                    return Err(LocalvoreError::parse(format!(
                        "line {line_no}: expected {dim} values, found {}",
                        values.len()
                    )));
                }
                Some(_) => {}
                None => dimension = Some(values.len()),
            }

            vectors.insert(word.to_string(), values);
        }

        let dimension = match dimension {
            Some(dim) if dim > 0 && !vectors.is_empty() => dim,
            _ => return Err(LocalvoreError::parse("word vector file contains no vectors")),
        };

        debug!(words = vectors.len(), dimension, "word vectors loaded");
        Ok(Self {
            name: name.into(),
            dimension,
            vectors,
        })
    }

    /// Number of words in the vocabulary.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

impl Vectorizer for WordVectors {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Mean of the vectors of known tokens; zero vector when none are known.
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut sum = vec![0.0f32; self.dimension];
        let mut known = 0usize;

        for token in tokenize(text) {
            if let Some(v) = self.vectors.get(&token) {
                for (acc, x) in sum.iter_mut().zip(v) {
                    *acc += x;
                }
                known += 1;
            }
        }

        if known > 0 {
            for acc in &mut sum {
                *acc /= known as f32;
            }
        }
        sum
    }
}

// ---------------------------------------------------------------------------
// HashingVectorizer
// ---------------------------------------------------------------------------

/// Model-free vectorizer: each token is hashed to a signed bucket.
pub struct HashingVectorizer {
    dimension: usize,
}

impl HashingVectorizer {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Vectorizer for HashingVectorizer {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Averaged signed token buckets, L2-normalised.
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return v;
        }

        for token in &tokens {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }

        let count = tokens.len() as f32;
        for x in &mut v {
            *x /= count;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

/// Build the configured vectorizer: word vectors when `model_path` is set,
/// hashing otherwise.
pub fn load_vectorizer(config: &VectorizerConfig) -> Result<Box<dyn Vectorizer>> {
    match &config.model_path {
        Some(path) => {
            let path = expand_home(path);
            info!(path = %path.display(), "loading word vectors");
            Ok(Box::new(WordVectors::load(&path)?))
        }
        None => Ok(Box::new(HashingVectorizer::new(config.dimension))),
    }
}

/// Compute and store a vector for every document in `collection` that has
/// ingredients. Returns the number of vectors written.
#[instrument(skip_all, fields(collection = %collection, vectorizer = %vectorizer.name()))]
pub async fn vectorize_collection(
    storage: &Storage,
    collection: &str,
    vectorizer: &dyn Vectorizer,
    progress: &dyn ProgressReporter,
) -> Result<usize> {
    let recipes = storage.list_recipes(collection).await?;
    let total = recipes.len();
    let mut written = 0;

    progress.phase("Vectorizing ingredients");
    for (i, recipe) in recipes.iter().enumerate() {
        if recipe.ingredients.is_empty() {
            debug!(id = %recipe.id, "no ingredients, skipping");
        } else {
            let vector = vectorizer.embed(&recipe_text(&recipe.ingredients));
            if let Err(e) = storage.set_vector(&recipe.id, &vector).await {
                warn!(id = %recipe.id, error = %e, "failed to store vector");
            } else {
                written += 1;
            }
        }
        progress.item(i + 1, total, &recipe.title);
    }

    info!(written, total, "collection vectorized");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use localvore_shared::Recipe;
    use uuid::Uuid;

    const GLOVE: &str = "3 2\nkale 1.0 0.0\nonion 0.0 1.0\ngarlic 1.0 1.0\n";

    #[test]
    fn word_vectors_average_known_tokens() {
        let wv = WordVectors::from_reader(GLOVE.as_bytes(), "tiny").unwrap();
        assert_eq!(wv.dimension(), 2);
        assert_eq!(wv.len(), 3);
        assert_eq!(wv.embed("Kale onion"), vec![0.5, 0.5]);
        assert_eq!(wv.embed("kale quinoa"), vec![1.0, 0.0]);
        assert_eq!(wv.embed("quinoa"), vec![0.0, 0.0]);
    }

    #[test]
    fn word_vectors_without_header() {
        let wv = WordVectors::from_reader("a 1 2 3\nb 4 5 6\n".as_bytes(), "plain").unwrap();
        assert_eq!(wv.dimension(), 3);
    }

    #[test]
    fn ragged_rows_report_line_number() {
        let err = WordVectors::from_reader("a 1 2\nb 1 2\nc 1\n".as_bytes(), "bad").unwrap_err();
        assert!(matches!(err, LocalvoreError::Parse { .. }));
        assert!(err.to_string().contains("line 3"));

        let err = WordVectors::from_reader("2 3\na 1 2\n".as_bytes(), "bad").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn empty_model_is_rejected() {
        assert!(WordVectors::from_reader("".as_bytes(), "empty").is_err());
    }

    #[test]
    fn hashing_vectors_are_unit_length_and_stable() {
        let hv = HashingVectorizer::new(64);
        let a = hv.embed("kale onion garlic");
        let b = hv.embed("Kale, onion; garlic");
        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(hv.embed("").iter().all(|&x| x == 0.0));
    }

    #[test]
    fn recipe_text_lowercases_and_joins() {
        assert_eq!(recipe_text(&["Red Onion", "KALE"]), "red onion kale");
    }

    #[test]
    fn hashing_is_default_vectorizer() {
        let v = load_vectorizer(&VectorizerConfig::default()).unwrap();
        assert_eq!(v.name(), "hashing");
        assert_eq!(v.dimension(), 300);
    }

    #[tokio::test]
    async fn vectorize_skips_documents_without_ingredients() {
        let path = std::env::temp_dir().join(format!("lv_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&path).await.unwrap();

        let mut with = Recipe::new("BB", "Kale Chips");
        with.ingredients = vec!["kale".into(), "olive oil".into()];
        storage.insert_recipe(&with).await.unwrap();
        storage.insert_recipe(&Recipe::new("BB", "Water")).await.unwrap();

        let hv = HashingVectorizer::new(16);
        let written = vectorize_collection(&storage, "BB", &hv, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(written, 1);

        let stored = storage.get_recipe(&with.id).await.unwrap().unwrap();
        assert_eq!(stored.vector.unwrap(), hv.embed("kale olive oil"));

        let _ = std::fs::remove_file(&path);
    }
}
