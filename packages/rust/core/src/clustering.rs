//! Sample building, exact nearest-neighbour search, and DBSCAN over recipe vectors.

use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use localvore_shared::{LocalvoreError, Result, TermField};
use localvore_storage::Storage;

/// A named recipe vector fed to the neighbour and cluster searches.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub collection: String,
    pub vector: Vec<f32>,
}

/// Fail unless `collection` exists and holds at least one document.
pub async fn require_collection(storage: &Storage, collection: &str) -> Result<()> {
    if !storage.collection_exists(collection).await? || storage.count(collection).await? == 0 {
        return Err(LocalvoreError::validation(format!(
            "collection '{collection}' is empty or does not exist"
        )));
    }
    Ok(())
}

/// Vectorized documents across `collections` whose `field` matches any of `terms`.
///
/// Samples are keyed by title; a later document with the same title replaces the
/// earlier one in place.
pub async fn create_samples(
    storage: &Storage,
    collections: &[String],
    field: TermField,
    terms: &[String],
) -> Result<Vec<Sample>> {
    let mut samples: Vec<Sample> = Vec::new();
    let mut by_name: HashMap<String, usize> = HashMap::new();

    for collection in collections {
        require_collection(storage, collection).await?;

        for recipe in storage.find_by_terms(collection, field, terms).await? {
            let Some(vector) = recipe.vector else {
                debug!(id = %recipe.id, "no vector, skipping");
                continue;
            };
            let sample = Sample {
                name: recipe.title,
                collection: collection.clone(),
                vector,
            };
            match by_name.get(&sample.name) {
                Some(&i) => samples[i] = sample,
                None => {
                    by_name.insert(sample.name.clone(), samples.len());
                    samples.push(sample);
                }
            }
        }
    }

    if samples.is_empty() {
        return Err(LocalvoreError::not_found("no matching recipes"));
    }
    debug!(count = samples.len(), "samples created");
    Ok(samples)
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

// ---------------------------------------------------------------------------
// NearestNeighbors
// ---------------------------------------------------------------------------

/// Brute-force Euclidean nearest-neighbour index.
#[derive(Debug, Clone)]
pub struct NearestNeighbors {
    points: Vec<Vec<f32>>,
    dimension: usize,
}

impl NearestNeighbors {
    /// Index `points`. All points must share one non-zero dimension.
    pub fn fit(points: Vec<Vec<f32>>) -> Result<Self> {
        let Some(first) = points.first() else {
            return Err(LocalvoreError::validation("cannot fit on zero samples"));
        };
        let dimension = first.len();
        if dimension == 0 {
            return Err(LocalvoreError::validation("samples have zero dimensions"));
        }
        if let Some(i) = points.iter().position(|p| p.len() != dimension) {
            return Err(LocalvoreError::validation(format!(
                "sample {i} has {} dimensions, expected {dimension}",
                points[i].len()
            )));
        }
        Ok(Self { points, dimension })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The `k` nearest points to `query` as `(index, distance)`, closest first.
    /// Ties are broken by index. `k` beyond the sample count is clamped.
    pub fn kneighbors_with_distance(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(LocalvoreError::validation(format!(
                "query has {} dimensions, expected {}",
                query.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Err(LocalvoreError::validation("k must be at least 1"));
        }
        let k = if k > self.points.len() {
            warn!(k, samples = self.points.len(), "k exceeds sample count, clamping");
            self.points.len()
        } else {
            k
        };

        let mut scored: Vec<(usize, f32)> = self
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, euclidean(p, query)))
            .collect();
        scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }

    /// Indices of the `k` nearest points to `query`, closest first.
    pub fn kneighbors(&self, query: &[f32], k: usize) -> Result<Vec<usize>> {
        Ok(self
            .kneighbors_with_distance(query, k)?
            .into_iter()
            .map(|(i, _)| i)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// DBSCAN
// ---------------------------------------------------------------------------

/// Label assigned to points that belong to no cluster.
pub const NOISE: i32 = -1;

const UNVISITED: i32 = -2;

/// Density-based clustering with Euclidean distance.
///
/// A point is a core point when at least `min_samples` points (itself included)
/// lie within `eps`. Returns one label per input: cluster ids from 0 in order of
/// discovery, or [`NOISE`].
pub fn dbscan(vectors: &[Vec<f32>], eps: f32, min_samples: usize) -> Vec<i32> {
    let min_samples = min_samples.max(1);
    let mut labels = vec![UNVISITED; vectors.len()];
    let mut cluster = 0;

    let region = |p: usize| -> Vec<usize> {
        (0..vectors.len())
            .filter(|&q| euclidean(&vectors[p], &vectors[q]) <= eps)
            .collect()
    };

    for p in 0..vectors.len() {
        if labels[p] != UNVISITED {
            continue;
        }
        let neighbours = region(p);
        if neighbours.len() < min_samples {
            labels[p] = NOISE;
            continue;
        }

        labels[p] = cluster;
        let mut queue: VecDeque<usize> = neighbours.into_iter().collect();
        while let Some(q) = queue.pop_front() {
            if labels[q] == NOISE {
                // Border point reached from a core point.
                labels[q] = cluster;
            }
            if labels[q] != UNVISITED {
                continue;
            }
            labels[q] = cluster;
            let reach = region(q);
            if reach.len() >= min_samples {
                queue.extend(reach.into_iter().filter(|&r| labels[r] == UNVISITED || labels[r] == NOISE));
            }
        }
        cluster += 1;
    }

    labels
}

/// Index of the first member of each cluster, in cluster order.
pub fn cluster_representatives(labels: &[i32]) -> Vec<usize> {
    let mut firsts: Vec<(i32, usize)> = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        if label != NOISE && !firsts.iter().any(|(l, _)| *l == label) {
            firsts.push((label, i));
        }
    }
    firsts.sort_by_key(|(label, _)| *label);
    firsts.into_iter().map(|(_, i)| i).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use localvore_shared::Recipe;
    use uuid::Uuid;

    async fn temp_storage() -> (Storage, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("lv_test_{}.db", Uuid::now_v7()));
        (Storage::open(&path).await.unwrap(), path)
    }

    fn recipe(collection: &str, title: &str, ingredients: &[&str], vector: Option<Vec<f32>>) -> Recipe {
        let mut r = Recipe::new(collection, title);
        r.ingredients = ingredients.iter().map(|s| s.to_string()).collect();
        r.vector = vector;
        r
    }

    #[test]
    fn kneighbors_orders_by_distance_then_index() {
        let nn = NearestNeighbors::fit(vec![
            vec![0.0, 0.0],
            vec![3.0, 4.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
        ])
        .unwrap();
        assert_eq!(nn.kneighbors(&[0.0, 0.0], 3).unwrap(), vec![0, 2, 3]);

        let with_d = nn.kneighbors_with_distance(&[0.0, 0.0], 4).unwrap();
        assert_eq!(with_d.last().unwrap(), &(1, 5.0));
    }

    #[test]
    fn kneighbors_clamps_k() {
        let nn = NearestNeighbors::fit(vec![vec![0.0], vec![1.0]]).unwrap();
        assert_eq!(nn.kneighbors(&[0.9], 10).unwrap(), vec![1, 0]);
    }

    #[test]
    fn dimension_mismatches_are_validation_errors() {
        let err = NearestNeighbors::fit(vec![vec![0.0, 1.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, LocalvoreError::Validation { .. }));

        let nn = NearestNeighbors::fit(vec![vec![0.0, 1.0]]).unwrap();
        assert!(nn.kneighbors(&[0.0], 1).is_err());
        assert!(NearestNeighbors::fit(Vec::new()).is_err());
    }

    #[test]
    fn dbscan_finds_two_blobs_and_noise() {
        let points = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![5.0, 5.1],
            vec![20.0, 20.0],
        ];
        let labels = dbscan(&points, 0.5, 2);
        assert_eq!(labels, vec![0, 0, 0, 1, 1, 1, NOISE]);
        assert_eq!(cluster_representatives(&labels), vec![0, 3]);
    }

    #[test]
    fn dbscan_border_points_join_cluster() {
        // Point 3 has only one neighbour within eps, so it is a border point of cluster 0.
        let points = vec![vec![0.0], vec![0.4], vec![0.8], vec![1.2]];
        let labels = dbscan(&points, 0.45, 3);
        assert_eq!(labels, vec![0, 0, 0, 0]);

        let labels = dbscan(&points, 0.3, 2);
        assert_eq!(labels, vec![NOISE; 4]);
    }

    #[test]
    fn dbscan_on_nothing() {
        assert!(dbscan(&[], 1.0, 2).is_empty());
        assert!(cluster_representatives(&[NOISE, NOISE]).is_empty());
    }

    #[tokio::test]
    async fn create_samples_dedupes_titles_and_skips_unvectorized() {
        let (storage, path) = temp_storage().await;
        storage
            .insert_recipe(&recipe("BB", "Kale Chips", &["kale"], Some(vec![1.0, 0.0])))
            .await
            .unwrap();
        storage
            .insert_recipe(&recipe("BB", "Raw Kale", &["kale"], None))
            .await
            .unwrap();
        storage
            .insert_recipe(&recipe("NE", "Kale Chips", &["Kale"], Some(vec![0.0, 1.0])))
            .await
            .unwrap();
        storage
            .insert_recipe(&recipe("NE", "Pesto", &["basil"], Some(vec![0.5, 0.5])))
            .await
            .unwrap();

        let samples = create_samples(
            &storage,
            &["BB".into(), "NE".into()],
            TermField::Ingredients,
            &["kale".into()],
        )
        .await
        .unwrap();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].collection, "NE");
        assert_eq!(samples[0].vector, vec![0.0, 1.0]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn create_samples_errors() {
        let (storage, path) = temp_storage().await;
        storage
            .insert_recipe(&recipe("BB", "Pesto", &["basil"], Some(vec![1.0])))
            .await
            .unwrap();

        let err = create_samples(&storage, &["Epi".into()], TermField::Ingredients, &["kale".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, LocalvoreError::Validation { .. }));

        let err = create_samples(&storage, &["BB".into()], TermField::Ingredients, &["kale".into()])
            .await
            .unwrap_err();
        assert!(matches!(err, LocalvoreError::NotFound { .. }));

        let _ = std::fs::remove_file(&path);
    }
}
