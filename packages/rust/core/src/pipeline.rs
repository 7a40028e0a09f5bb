//! End-to-end menu pipelines: seasonal query, export, recommendation,
//! clustering, and site scraping.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use tracing::{info, instrument};

use localvore_scraper::{RecipeScraper, ScrapeProgress, ScrapeResult, SeasonalGuide};
use localvore_shared::{LocalvoreError, Recipe, Result, ScrapePolicy, SiteTags, TermField};
use localvore_storage::Storage;

use crate::clustering::{
    NearestNeighbors, Sample, cluster_representatives, create_samples, dbscan,
    require_collection,
};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each item of a long loop.
    fn item(&self, current: usize, total: usize, detail: &str);
    /// Called when the pipeline completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _detail: &str) {}
    fn done(&self, _summary: &str) {}
}

/// Inputs of a menu request.
#[derive(Debug, Clone)]
pub struct MenuRequest {
    /// U.S. state the seasonal veggies are looked up for.
    pub state: String,
    /// Collections searched for matching recipes.
    pub collections: Vec<String>,
    /// Number of titles returned.
    pub n: usize,
    /// Title to recommend around; random when `None`.
    pub seed: Option<String>,
}

/// DBSCAN parameters for [`cluster_menu`].
#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub eps: f32,
    pub min_samples: usize,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            eps: 0.2,
            min_samples: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// Seasonal query
// ---------------------------------------------------------------------------

/// Recipes in `collection` that use at least one vegetable in season in `state` today.
#[instrument(skip_all, fields(collection = %collection, state = %state))]
pub async fn backend_query(
    storage: &Storage,
    guide: &SeasonalGuide,
    collection: &str,
    state: &str,
) -> Result<Vec<Recipe>> {
    require_collection(storage, collection).await?;
    let veggies = guide.fetch_today(state).await?;
    let recipes = storage
        .find_by_terms(collection, TermField::Ingredients, &veggies)
        .await?;
    info!(matches = recipes.len(), "seasonal query complete");
    Ok(recipes)
}

/// Write the [`backend_query`] result to `out` as a JSON array. Returns the
/// number of recipes written.
pub async fn export_query(
    storage: &Storage,
    guide: &SeasonalGuide,
    collection: &str,
    state: &str,
    out: &Path,
) -> Result<usize> {
    let recipes: Vec<Recipe> = backend_query(storage, guide, collection, state)
        .await?
        .into_iter()
        .map(|mut r| {
            r.vector = None;
            r
        })
        .collect();

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LocalvoreError::io(parent, e))?;
    }
    let file = File::create(out).map_err(|e| LocalvoreError::io(out, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &recipes)
        .map_err(|e| LocalvoreError::parse(format!("failed to serialize recipes: {e}")))?;
    writer.flush().map_err(|e| LocalvoreError::io(out, e))?;

    info!(count = recipes.len(), path = %out.display(), "query exported");
    Ok(recipes.len())
}

// ---------------------------------------------------------------------------
// Recommendation
// ---------------------------------------------------------------------------

/// Seasonal samples across the requested collections.
async fn seasonal_samples(
    storage: &Storage,
    guide: &SeasonalGuide,
    request: &MenuRequest,
) -> Result<Vec<Sample>> {
    if request.collections.is_empty() {
        return Err(LocalvoreError::validation("at least one collection is required"));
    }
    if request.n == 0 {
        return Err(LocalvoreError::validation("n must be at least 1"));
    }
    let veggies = guide.fetch_today(&request.state).await?;
    create_samples(storage, &request.collections, TermField::Ingredients, &veggies).await
}

/// Titles of the `n` recipes nearest a seed recipe among today's seasonal matches.
/// The seed itself comes first.
#[instrument(skip_all, fields(state = %request.state, n = request.n))]
pub async fn recommend(
    storage: &Storage,
    guide: &SeasonalGuide,
    request: &MenuRequest,
) -> Result<Vec<String>> {
    let samples = seasonal_samples(storage, guide, request).await?;
    let menu = recommend_from(
        &samples,
        request.n,
        request.seed.as_deref(),
        &mut rand::thread_rng(),
    )?;
    info!(samples = samples.len(), menu = menu.len(), "recommendation ready");
    Ok(menu)
}

/// Nearest-neighbour menu over prepared samples.
pub fn recommend_from<R: Rng + ?Sized>(
    samples: &[Sample],
    n: usize,
    seed: Option<&str>,
    rng: &mut R,
) -> Result<Vec<String>> {
    if samples.is_empty() {
        return Err(LocalvoreError::not_found("no matching recipes"));
    }

    let seed_idx = match seed {
        Some(title) => samples
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(title))
            .ok_or_else(|| {
                LocalvoreError::not_found(format!("seed recipe '{title}' is not in season"))
            })?,
        None => rng.gen_range(0..samples.len()),
    };

    let nn = NearestNeighbors::fit(samples.iter().map(|s| s.vector.clone()).collect())?;
    let neighbours = nn.kneighbors(&samples[seed_idx].vector, n)?;

    let mut menu = vec![samples[seed_idx].name.clone()];
    menu.extend(
        neighbours
            .into_iter()
            .filter(|&i| i != seed_idx)
            .map(|i| samples[i].name.clone()),
    );
    menu.truncate(n);
    Ok(menu)
}

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// One representative title per DBSCAN cluster of today's seasonal matches.
#[instrument(skip_all, fields(state = %request.state, eps = params.eps))]
pub async fn cluster_menu(
    storage: &Storage,
    guide: &SeasonalGuide,
    request: &MenuRequest,
    params: ClusterParams,
) -> Result<Vec<String>> {
    let samples = seasonal_samples(storage, guide, request).await?;
    info!(samples = samples.len(), "clustering samples");
    cluster_names(&samples, params, request.n)
}

/// First member of each cluster, at most `n`.
pub fn cluster_names(samples: &[Sample], params: ClusterParams, n: usize) -> Result<Vec<String>> {
    let vectors: Vec<Vec<f32>> = samples.iter().map(|s| s.vector.clone()).collect();
    // Reuse the index's dimension checks.
    NearestNeighbors::fit(vectors.clone())?;

    let labels = dbscan(&vectors, params.eps, params.min_samples);
    let names: Vec<String> = cluster_representatives(&labels)
        .into_iter()
        .take(n)
        .map(|i| samples[i].name.clone())
        .collect();

    if names.is_empty() {
        return Err(LocalvoreError::not_found(format!(
            "every recipe is noise at eps {}; try a larger eps or fewer min samples",
            params.eps
        )));
    }
    Ok(names)
}

// ---------------------------------------------------------------------------
// Scraping
// ---------------------------------------------------------------------------

/// Adapts a `ProgressReporter` to the scraper's `ScrapeProgress` interface.
struct PipelineScrapeProgress<'a> {
    inner: &'a dyn ProgressReporter,
    total: AtomicUsize,
    done: AtomicUsize,
}

impl ScrapeProgress for PipelineScrapeProgress<'_> {
    fn index_page(&self, pages: u32, links: usize) {
        self.inner
            .phase(&format!("Found {links} recipes on {pages} index pages"));
    }

    fn recipes_started(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.inner.phase("Fetching recipes");
    }

    fn recipe_done(&self, url: &str) {
        let current = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner
            .item(current, self.total.load(Ordering::Relaxed), url);
    }
}

/// Scrape one site into its collection.
pub async fn scrape_site(
    storage: &Storage,
    tags: &SiteTags,
    policy: ScrapePolicy,
    progress: &dyn ProgressReporter,
) -> Result<ScrapeResult> {
    progress.phase(&format!("Walking {} index", tags.name));
    let scraper = RecipeScraper::new(tags, policy)?;
    let adapter = PipelineScrapeProgress {
        inner: progress,
        total: AtomicUsize::new(0),
        done: AtomicUsize::new(0),
    };
    let result = scraper.scrape(storage, &adapter).await?;
    progress.done(&format!(
        "{} recipes stored, {} skipped, {} errors",
        result.recipes_stored,
        result.recipes_skipped,
        result.errors.len()
    ));
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use localvore_shared::SeasonalConfig;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use uuid::Uuid;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample(name: &str, vector: Vec<f32>) -> Sample {
        Sample {
            name: name.into(),
            collection: "BB".into(),
            vector,
        }
    }

    fn line_samples() -> Vec<Sample> {
        vec![
            sample("a", vec![0.0]),
            sample("b", vec![1.0]),
            sample("c", vec![2.0]),
            sample("d", vec![10.0]),
        ]
    }

    async fn guide_with(veggies: &[&str]) -> (MockServer, SeasonalGuide) {
        let cards: String = veggies
            .iter()
            .map(|v| format!("<div id=\"col-veg-detail-card\"><a>{v}</a></div>"))
            .collect();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(format!("<html><body>{cards}</body></html>")),
            )
            .mount(&server)
            .await;
        let guide = SeasonalGuide::new(&SeasonalConfig {
            base_url: server.uri(),
            timeout_secs: 5,
        })
        .unwrap();
        (server, guide)
    }

    async fn seeded_storage() -> (Storage, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("lv_test_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&path).await.unwrap();
        for (title, ingredient, v) in [
            ("Kale Chips", "kale", 0.0f32),
            ("Kale Soup", "kale", 0.5),
            ("Asparagus Tart", "asparagus", 5.0),
            ("Beef Stew", "beef", 1.0),
        ] {
            let mut r = Recipe::new("BB", title);
            r.ingredients = vec![ingredient.into()];
            r.vector = Some(vec![v, 0.0]);
            storage.insert_recipe(&r).await.unwrap();
        }
        (storage, path)
    }

    #[test]
    fn named_seed_comes_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let menu = recommend_from(&line_samples(), 3, Some("B"), &mut rng).unwrap();
        assert_eq!(menu, vec!["b", "a", "c"]);
    }

    #[test]
    fn random_seed_is_in_range() {
        let samples = line_samples();
        for s in 0..20 {
            let mut rng = StdRng::seed_from_u64(s);
            let menu = recommend_from(&samples, 2, None, &mut rng).unwrap();
            assert_eq!(menu.len(), 2);
            assert!(samples.iter().any(|x| x.name == menu[0]));
        }
    }

    #[test]
    fn duplicate_vectors_keep_seed_first() {
        let samples = vec![sample("x", vec![1.0]), sample("y", vec![1.0])];
        let mut rng = StdRng::seed_from_u64(0);
        let menu = recommend_from(&samples, 5, Some("y"), &mut rng).unwrap();
        assert_eq!(menu, vec!["y", "x"]);
    }

    #[test]
    fn unknown_seed_is_not_found() {
        let mut rng = StdRng::seed_from_u64(0);
        let err = recommend_from(&line_samples(), 2, Some("zucchini bread"), &mut rng).unwrap_err();
        assert!(matches!(err, LocalvoreError::NotFound { .. }));
    }

    #[test]
    fn cluster_names_pick_first_member() {
        let names = cluster_names(
            &line_samples(),
            ClusterParams {
                eps: 1.5,
                min_samples: 2,
            },
            5,
        )
        .unwrap();
        assert_eq!(names, vec!["a"]);

        let err = cluster_names(
            &line_samples(),
            ClusterParams {
                eps: 0.1,
                min_samples: 2,
            },
            5,
        )
        .unwrap_err();
        assert!(matches!(err, LocalvoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn backend_query_matches_seasonal_ingredients() {
        let (storage, path) = seeded_storage().await;
        let (_server, guide) = guide_with(&["Kale", "Asparagus"]).await;

        let recipes = backend_query(&storage, &guide, "BB", "tennessee").await.unwrap();
        let mut titles: Vec<_> = recipes.into_iter().map(|r| r.title).collect();
        titles.sort();
        assert_eq!(titles, vec!["Asparagus Tart", "Kale Chips", "Kale Soup"]);

        let err = backend_query(&storage, &guide, "Epi", "tennessee").await.unwrap_err();
        assert!(matches!(err, LocalvoreError::Validation { .. }));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn export_writes_json_array() {
        let (storage, path) = seeded_storage().await;
        let (_server, guide) = guide_with(&["asparagus"]).await;
        let out = std::env::temp_dir().join(format!("lv_export_{}.json", Uuid::now_v7()));

        let written = export_query(&storage, &guide, "BB", "tennessee", &out).await.unwrap();
        assert_eq!(written, 1);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        let items = json.as_array().unwrap();
        assert_eq!(items[0]["title"], "Asparagus Tart");
        assert!(items[0].get("vector").is_none());

        let _ = std::fs::remove_file(&out);
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn recommend_around_named_seed() {
        let (storage, path) = seeded_storage().await;
        let (_server, guide) = guide_with(&["kale", "asparagus"]).await;

        let request = MenuRequest {
            state: "tennessee".into(),
            collections: vec!["BB".into()],
            n: 2,
            seed: Some("Asparagus Tart".into()),
        };
        let menu = recommend(&storage, &guide, &request).await.unwrap();
        assert_eq!(menu, vec!["Asparagus Tart", "Kale Soup"]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn recommend_with_nothing_in_season() {
        let (storage, path) = seeded_storage().await;
        let (_server, guide) = guide_with(&["rhubarb"]).await;

        let request = MenuRequest {
            state: "tennessee".into(),
            collections: vec!["BB".into()],
            n: 3,
            seed: None,
        };
        let err = recommend(&storage, &guide, &request).await.unwrap_err();
        assert!(matches!(err, LocalvoreError::NotFound { .. }));

        let _ = std::fs::remove_file(&path);
    }
}
