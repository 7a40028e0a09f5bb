//! Concurrent recipe site scraper.
//!
//! A scrape walks a site's paginated index, collects recipe URLs, fetches the
//! recipe pages concurrently within the site's host, saves each raw page to
//! disk, and upserts the extracted posts into the site's collection.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use localvore_shared::{LocalvoreError, Recipe, RecipePost, Result, ScrapePolicy, SiteTags};
use localvore_storage::{SavedPage, Storage};

use crate::extract::{CompiledTags, slug_of};

/// User-Agent string for every outgoing request.
pub const USER_AGENT: &str = concat!("Localvore/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// ScrapeResult
// ---------------------------------------------------------------------------

/// Summary of a completed site scrape.
#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    /// Index pages that returned recipe links.
    pub index_pages: u32,
    /// Distinct recipe URLs found on the index.
    pub recipes_found: usize,
    /// Posts written to the collection.
    pub recipes_stored: usize,
    /// Pages fetched without any ingredients.
    pub recipes_skipped: usize,
    /// Errors encountered (URL, error message).
    pub errors: Vec<(String, String)>,
    pub duration: Duration,
}

/// Progress callbacks for a running scrape.
pub trait ScrapeProgress: Send + Sync {
    fn index_page(&self, _page: u32, _links: usize) {}
    fn recipes_started(&self, _total: usize) {}
    fn recipe_done(&self, _url: &str) {}
}

/// Scrape progress sink that reports nothing.
pub struct NoProgress;

impl ScrapeProgress for NoProgress {}

/// A recipe page fetched and saved to disk.
#[derive(Debug, Clone)]
pub struct FetchedRecipe {
    /// Extracted post; `None` when the page had no ingredients.
    pub post: Option<RecipePost>,
    pub page: SavedPage,
}

// ---------------------------------------------------------------------------
// RecipeScraper
// ---------------------------------------------------------------------------

/// Scraper for one recipe site, driven by its [`SiteTags`].
pub struct RecipeScraper {
    tags: Arc<CompiledTags>,
    policy: ScrapePolicy,
    client: Client,
}

impl RecipeScraper {
    /// Create a scraper for `tags`. Fails on invalid selectors or root URL.
    pub fn new(tags: &SiteTags, policy: ScrapePolicy) -> Result<Self> {
        let tags = CompiledTags::new(tags)?;
        match tags.root().scheme() {
            "http" | "https" => {}
            other => {
                return Err(LocalvoreError::config(format!(
                    "site '{}' uses unsupported scheme '{other}'",
                    tags.tags.name
                )));
            }
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(Duration::from_secs(policy.timeout_secs))
            .build()
            .map_err(|e| LocalvoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            tags: Arc::new(tags),
            policy,
            client,
        })
    }

    /// Collection name scraped posts are stored under.
    pub fn site(&self) -> &str {
        &self.tags.tags.name
    }

    /// Recipe URLs listed on one index page.
    ///
    /// A 404 is the end of pagination and yields no links. Other non-2xx
    /// responses are errors.
    #[instrument(skip_all, fields(url = %index_url))]
    pub async fn get_page_content(&self, index_url: &Url) -> Result<Vec<Url>> {
        let (status, body) = fetch(&self.client, index_url).await?;
        if status == StatusCode::NOT_FOUND {
            debug!("index page not found");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(LocalvoreError::Network(format!("{index_url}: HTTP {status}")));
        }

        let links = self.tags.recipe_links(&body, index_url);
        debug!(links = links.len(), "index page parsed");
        Ok(links)
    }

    /// Build a post from a fetched recipe page.
    pub fn make_post(&self, html: &str, url: &Url) -> Option<RecipePost> {
        self.tags.make_post(html, url)
    }

    /// Fetch one recipe page, save it, and record it in `storage`.
    pub async fn get_recipe(&self, url: &Url, storage: &Storage) -> Result<FetchedRecipe> {
        let fetched = fetch_recipe(&self.client, &self.tags, &self.policy.html_dir, url).await?;
        storage.record_page(&fetched.page).await?;
        Ok(fetched)
    }

    /// Walk the index and return every in-scope recipe URL, in index order.
    pub async fn collect_links(&self) -> Result<(Vec<Url>, u32)> {
        let cap = match (self.tags.tags.pagination, self.policy.max_pages) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        let mut page: u32 = 1;
        let mut pages_read = 0;

        loop {
            if cap.is_some_and(|cap| page > cap) {
                break;
            }

            let index_url = Url::parse(&self.tags.tags.index_url(page)).map_err(|e| {
                LocalvoreError::config(format!("site '{}' index url: {e}", self.site()))
            })?;

            let found = match self.get_page_content(&index_url).await {
                Ok(found) => found,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "index page failed, stopping pagination");
                    break;
                }
            };

            let before = links.len();
            for url in found {
                if !self.in_scope(&url) {
                    debug!(%url, "out of scope, skipping");
                    continue;
                }
                if seen.insert(url.to_string()) {
                    links.push(url);
                }
            }

            // A page with nothing new means pagination has run out or is looping.
            if links.len() == before {
                break;
            }
            pages_read += 1;
            debug!(page, new = links.len() - before, "index page collected");
            page += 1;
        }

        Ok((links, pages_read))
    }

    /// Scrape the whole site into its collection.
    #[instrument(skip_all, fields(site = %self.site()))]
    pub async fn scrape(
        &self,
        storage: &Storage,
        progress: &dyn ScrapeProgress,
    ) -> Result<ScrapeResult> {
        let start_time = std::time::Instant::now();
        let job_id = storage.insert_scrape_job(self.site()).await?;
        storage.ensure_collection(self.site()).await?;

        info!(
            concurrency = self.policy.concurrency,
            rate_limit_ms = self.policy.rate_limit_ms,
            "starting scrape"
        );

        let (links, index_pages) = match self.collect_links().await {
            Ok(walk) => walk,
            Err(e) => {
                let stats = serde_json::json!({ "status": "failed", "error": e.to_string() });
                if let Err(finish) = storage.finish_scrape_job(&job_id, &stats.to_string()).await {
                    warn!(error = %finish, "failed to record scrape job stats");
                }
                return Err(e);
            }
        };
        progress.index_page(index_pages, links.len());
        progress.recipes_started(links.len());

        let mut result = ScrapeResult {
            index_pages,
            recipes_found: links.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.policy.concurrency.max(1) as usize));
        let mut handles = Vec::with_capacity(links.len());

        for url in links {
            let client = self.client.clone();
            let tags = self.tags.clone();
            let html_dir = self.policy.html_dir.clone();
            let sem = semaphore.clone();
            let rate_limit = self.policy.rate_limit_ms;

            handles.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| (url.to_string(), LocalvoreError::Network(e.to_string())))?;

                if rate_limit > 0 {
                    tokio::time::sleep(Duration::from_millis(rate_limit)).await;
                }

                fetch_recipe(&client, &tags, &html_dir, &url)
                    .await
                    .map_err(|e| (url.to_string(), e))
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(fetched)) => {
                    let url = fetched.page.url.clone();
                    if let Err(e) = self.store(storage, fetched, &mut result).await {
                        warn!(%url, error = %e, "failed to store recipe");
                        result.errors.push((url.clone(), e.to_string()));
                    }
                    progress.recipe_done(&url);
                }
                Ok(Err((url, e))) => {
                    warn!(%url, error = %e, "recipe fetch failed");
                    progress.recipe_done(&url);
                    result.errors.push((url, e.to_string()));
                }
                Err(e) => result.errors.push(("task".into(), e.to_string())),
            }
        }

        result.duration = start_time.elapsed();

        let stats = serde_json::json!({
            "status": if result.errors.is_empty() { "completed" } else { "completed_with_errors" },
            "index_pages": result.index_pages,
            "recipes_found": result.recipes_found,
            "recipes_stored": result.recipes_stored,
            "recipes_skipped": result.recipes_skipped,
            "errors": result.errors.len(),
        });
        if let Err(e) = storage.finish_scrape_job(&job_id, &stats.to_string()).await {
            warn!(error = %e, "failed to record scrape job stats");
        }

        info!(
            recipes_found = result.recipes_found,
            recipes_stored = result.recipes_stored,
            recipes_skipped = result.recipes_skipped,
            errors = result.errors.len(),
            duration_ms = result.duration.as_millis(),
            "scrape completed"
        );

        Ok(result)
    }

    async fn store(
        &self,
        storage: &Storage,
        fetched: FetchedRecipe,
        result: &mut ScrapeResult,
    ) -> Result<()> {
        storage.record_page(&fetched.page).await?;
        match fetched.post {
            Some(post) => {
                storage
                    .upsert_recipe(&Recipe::from_post(self.site(), post))
                    .await?;
                result.recipes_stored += 1;
            }
            None => {
                debug!(url = %fetched.page.url, "no ingredients, skipping");
                result.recipes_skipped += 1;
            }
        }
        Ok(())
    }

    /// Recipe links must stay on the site's own host.
    fn in_scope(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str() == self.tags.root().host_str()
            && url.port_or_known_default() == self.tags.root().port_or_known_default()
    }
}

// ---------------------------------------------------------------------------
// Page fetching
// ---------------------------------------------------------------------------

async fn fetch(client: &Client, url: &Url) -> Result<(StatusCode, String)> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| LocalvoreError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| LocalvoreError::Network(format!("{url}: body read failed: {e}")))?;
    Ok((status, body))
}

/// Fetch a recipe page, write the raw HTML under `html_dir`, and extract its post.
async fn fetch_recipe(
    client: &Client,
    tags: &CompiledTags,
    html_dir: &Path,
    url: &Url,
) -> Result<FetchedRecipe> {
    debug!(%url, "fetching recipe");

    let (status, body) = fetch(client, url).await?;
    if !status.is_success() {
        return Err(LocalvoreError::Network(format!("{url}: HTTP {status}")));
    }

    let path = page_path(html_dir, &tags.tags.name, url);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LocalvoreError::io(parent, e))?;
    }
    tokio::fs::write(&path, &body)
        .await
        .map_err(|e| LocalvoreError::io(&path, e))?;

    let page = SavedPage {
        site: tags.tags.name.clone(),
        url: url.to_string(),
        path: path.display().to_string(),
        content_hash: compute_hash(&body),
        fetched_at: Utc::now(),
        status_code: status.as_u16(),
        content_len: body.len(),
    };

    Ok(FetchedRecipe {
        post: tags.make_post(&body, url),
        page,
    })
}

/// Where a recipe page is saved: `{html_dir}/{site}/{slug}.html`.
pub fn page_path(html_dir: &Path, site: &str, url: &Url) -> PathBuf {
    html_dir.join(site).join(format!("{}.html", slug_of(url)))
}

/// Compute SHA-256 hash of content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod scraper_tests {
    use super::*;
    use crate::sites::naturallyella;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture(name: &str) -> String {
        let path = format!("../../../fixtures/html/{name}");
        std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    fn policy(dir: &Path) -> ScrapePolicy {
        ScrapePolicy {
            concurrency: 2,
            rate_limit_ms: 0,
            timeout_secs: 5,
            max_pages: None,
            html_dir: dir.join("pages"),
        }
    }

    fn mock_site(server: &MockServer) -> SiteTags {
        let mut tags = naturallyella();
        tags.root_url = server.uri();
        tags
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[test]
    fn test_compute_hash() {
        let hash = compute_hash("hello world");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_page_path() {
        let url = Url::parse("https://naturallyella.com/kale-salad/").unwrap();
        assert_eq!(
            page_path(Path::new("/tmp/pages"), "NE", &url),
            PathBuf::from("/tmp/pages/NE/kale-salad.html")
        );
    }

    #[test]
    fn test_rejects_non_http_root() {
        let mut tags = naturallyella();
        tags.root_url = "ftp://naturallyella.com".into();
        let dir = std::env::temp_dir();
        assert!(RecipeScraper::new(&tags, policy(&dir)).is_err());
    }

    #[test]
    fn test_make_post_from_fixture() {
        let dir = std::env::temp_dir();
        let scraper = RecipeScraper::new(&naturallyella(), policy(&dir)).unwrap();
        let url = Url::parse("https://naturallyella.com/crispy-scallion-asparagus-pizza/").unwrap();
        let post = scraper.make_post(&fixture("ne_recipe.html"), &url).unwrap();

        assert_eq!(post.title, "Crispy Scallion and Asparagus Pizza");
        assert_eq!(
            post.ingredients,
            vec![
                "1 pound pizza dough",
                "1 bunch asparagus",
                "4 scallions",
                "4 ounces mozzarella",
                "red pepper flakes",
            ]
        );
        assert_eq!(post.keywords, vec!["pizza", "asparagus", "scallions"]);
        assert_eq!(post.category.as_deref(), Some("Main"));
        assert_eq!(
            post.notes.as_deref(),
            Some("Swap ramps for scallions in early spring.")
        );
        let instructions = post.instructions.unwrap();
        assert_eq!(instructions.lines().count(), 3);
        assert!(instructions.contains("cheese, asparagus and scallions"));
        assert!(post.cost.is_none());
    }

    #[tokio::test]
    async fn test_get_page_content_404_is_empty() {
        let server = MockServer::start().await;
        let dir = std::env::temp_dir();
        let scraper = RecipeScraper::new(&mock_site(&server), policy(&dir)).unwrap();

        let url = Url::parse(&format!("{}/recipes/page/9/", server.uri())).unwrap();
        assert!(scraper.get_page_content(&url).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_page_content_server_error() {
        let server = MockServer::start().await;
        mount(&server, "/recipes/page/1/", 503, String::new()).await;
        let dir = std::env::temp_dir();
        let scraper = RecipeScraper::new(&mock_site(&server), policy(&dir)).unwrap();

        let url = Url::parse(&format!("{}/recipes/page/1/", server.uri())).unwrap();
        let err = scraper.get_page_content(&url).await.unwrap_err();
        assert!(matches!(err, LocalvoreError::Network(_)));
    }

    #[tokio::test]
    async fn test_scrape_with_mock_server() {
        let server = MockServer::start().await;
        let index = fixture("ne_index.html").replace(
            "</main>",
            r#"<h2 class="entry-title"><a href="https://elsewhere.example/recipe/">Offsite</a></h2></main>"#,
        );
        mount(&server, "/recipes/page/1/", 200, index).await;
        mount(&server, "/recipes/page/2/", 404, String::new()).await;
        mount(
            &server,
            "/crispy-scallion-asparagus-pizza/",
            200,
            fixture("ne_recipe.html"),
        )
        .await;
        mount(
            &server,
            "/about/",
            200,
            "<html><body><h1 class=\"entry-title\">About</h1></body></html>".into(),
        )
        .await;
        mount(&server, "/kale-salad-with-strawberries/", 500, String::new()).await;

        let tmp_dir = std::env::temp_dir().join(format!("lv-scrape-test-{}", Uuid::now_v7()));
        let storage = Storage::open(&tmp_dir.join("test.db")).await.unwrap();

        let scraper = RecipeScraper::new(&mock_site(&server), policy(&tmp_dir)).unwrap();
        let result = scraper.scrape(&storage, &NoProgress).await.unwrap();

        assert_eq!(result.index_pages, 1);
        assert_eq!(result.recipes_found, 3);
        assert_eq!(result.recipes_stored, 1);
        assert_eq!(result.recipes_skipped, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].0.ends_with("/kale-salad-with-strawberries/"));

        let stored = storage.list_recipes("NE").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Crispy Scallion and Asparagus Pizza");

        let pizza_url = format!("{}/crispy-scallion-asparagus-pizza/", server.uri());
        let page = storage.get_page(&pizza_url).await.unwrap().unwrap();
        assert_eq!(page.status_code, 200);
        assert_eq!(page.content_hash, compute_hash(&fixture("ne_recipe.html")));
        assert!(Path::new(&page.path).ends_with("NE/crispy-scallion-asparagus-pizza.html"));
        assert!(Path::new(&page.path).exists());

        // Scraping again updates in place.
        let again = scraper.scrape(&storage, &NoProgress).await.unwrap();
        assert_eq!(again.recipes_stored, 1);
        assert_eq!(storage.count("NE").await.unwrap(), 1);

        let _ = std::fs::remove_dir_all(&tmp_dir);
    }

    #[tokio::test]
    async fn test_pagination_cap() {
        let server = MockServer::start().await;
        for page in 1..=3 {
            let body = format!(
                r#"<html><body><h2 class="entry-title"><a href="/recipe-{page}/">R{page}</a></h2></body></html>"#
            );
            mount(&server, &format!("/recipes/page/{page}/"), 200, body).await;
        }

        let tmp_dir = std::env::temp_dir();
        let scraper = RecipeScraper::new(&mock_site(&server), policy(&tmp_dir)).unwrap();
        let (links, pages) = scraper.collect_links().await.unwrap();

        // The Naturally Ella preset stops after two index pages.
        assert_eq!(pages, 2);
        assert_eq!(links.len(), 2);
        assert!(links[1].path().ends_with("/recipe-2/"));
    }

    #[tokio::test]
    async fn test_first_index_failure_is_fatal() {
        let server = MockServer::start().await;
        mount(&server, "/recipes/page/1/", 500, String::new()).await;

        let tmp_dir = std::env::temp_dir().join(format!("lv-scrape-test-{}", Uuid::now_v7()));
        let storage = Storage::open(&tmp_dir.join("test.db")).await.unwrap();
        let scraper = RecipeScraper::new(&mock_site(&server), policy(&tmp_dir)).unwrap();

        assert!(scraper.scrape(&storage, &NoProgress).await.is_err());

        let job = storage.latest_scrape_job("NE").await.unwrap().unwrap();
        let stats = storage.scrape_job_stats(&job).await.unwrap().unwrap();
        assert!(stats.contains(r#""status":"failed""#));
        let _ = std::fs::remove_dir_all(&tmp_dir);
    }

    #[tokio::test]
    async fn test_get_recipe_saves_and_records_page() {
        let server = MockServer::start().await;
        mount(
            &server,
            "/crispy-scallion-asparagus-pizza/",
            200,
            fixture("ne_recipe.html"),
        )
        .await;
        mount(&server, "/gone/", 410, String::new()).await;

        let tmp_dir = std::env::temp_dir().join(format!("lv-scrape-test-{}", Uuid::now_v7()));
        let storage = Storage::open(&tmp_dir.join("test.db")).await.unwrap();
        let scraper = RecipeScraper::new(&mock_site(&server), policy(&tmp_dir)).unwrap();

        let url = Url::parse(&format!("{}/crispy-scallion-asparagus-pizza/", server.uri())).unwrap();
        let fetched = scraper.get_recipe(&url, &storage).await.unwrap();

        let post = fetched.post.expect("post with ingredients");
        assert_eq!(post.title, "Crispy Scallion and Asparagus Pizza");
        assert_eq!(post.ingredients.len(), 5);

        let expected_path = tmp_dir
            .join("pages")
            .join("NE")
            .join("crispy-scallion-asparagus-pizza.html");
        assert_eq!(fetched.page.path, expected_path.display().to_string());
        assert_eq!(
            std::fs::read_to_string(&expected_path).unwrap(),
            fixture("ne_recipe.html")
        );

        let row = storage.get_page(url.as_str()).await.unwrap().unwrap();
        assert_eq!(row.path, fetched.page.path);
        assert_eq!(row.site, "NE");
        assert_eq!(row.content_hash, compute_hash(&fixture("ne_recipe.html")));

        // Nothing is saved or recorded for a failed fetch.
        let gone = Url::parse(&format!("{}/gone/", server.uri())).unwrap();
        let err = scraper.get_recipe(&gone, &storage).await.unwrap_err();
        assert!(matches!(err, LocalvoreError::Network(_)));
        assert!(storage.get_page(gone.as_str()).await.unwrap().is_none());
        assert!(!tmp_dir.join("pages").join("NE").join("gone.html").exists());

        let _ = std::fs::remove_dir_all(&tmp_dir);
    }
}
