//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use localvore_core::api::{ApiState, serve};
use localvore_core::etl::{EtlOptions, import_documents, run_etl};
use localvore_core::pipeline::{
    ClusterParams, MenuRequest, ProgressReporter, backend_query, cluster_menu, export_query,
    recommend, scrape_site,
};
use localvore_core::text::trim_ingredients;
use localvore_core::vectorize::{load_vectorizer, vectorize_collection};
use localvore_scraper::{SeasonalGuide, SiteRegistry};
use localvore_shared::{AppConfig, ScrapePolicy, expand_home, init_config, load_config};
use localvore_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Localvore: cook with what is in season.
#[derive(Parser)]
#[command(
    name = "localvore",
    version,
    about = "Recommend recipes built around the vegetables in season in your state.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Recipe database path (overrides `defaults.database`).
    #[arg(long, env = "LOCALVORE_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// List the vegetables in season in a state.
    Veggies {
        /// U.S. state (defaults to `defaults.state`).
        state: Option<String>,

        /// Look up this date instead of today (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Scrape a recipe site into its collection.
    Scrape {
        /// Site name or alias (BB, NE, budgetbytes, naturallyella, or a configured site).
        site: String,

        /// Stop after this many index pages.
        #[arg(long)]
        max_pages: Option<u32>,

        /// Maximum concurrent recipe requests.
        #[arg(long)]
        concurrency: Option<u32>,
    },

    /// List the known recipe sites.
    Sites,

    /// Load Recipe1M ingredient predictions into the store.
    Etl {
        /// Recipe1M `layer1.json` to import before the predictions.
        #[arg(long)]
        layer1: Option<PathBuf>,

        /// URL or path of `det_ingrs.json` (defaults to `etl.predictions_url`).
        #[arg(long)]
        predictions: Option<String>,

        /// Target collection (defaults to `etl.collection`).
        #[arg(short, long)]
        collection: Option<String>,

        /// Skip computing recipe vectors.
        #[arg(long)]
        no_vectorize: bool,
    },

    /// Import a JSON array of recipe documents into a collection.
    Import {
        collection: String,

        /// JSON file in the Epicurious `full_format_recipes.json` shape.
        file: PathBuf,

        /// Vectorize the collection after importing.
        #[arg(long)]
        vectorize: bool,
    },

    /// Strip quantities and preparation details from a collection's ingredients.
    Trim { collection: String },

    /// Compute ingredient vectors for every recipe in a collection.
    Vectorize { collection: String },

    /// Show recipes that use vegetables in season today.
    Query {
        state: Option<String>,

        #[arg(short, long)]
        collection: String,

        /// Print full documents as JSON instead of titles.
        #[arg(long)]
        json: bool,
    },

    /// Write today's seasonal recipes to a JSON file.
    Export {
        state: Option<String>,

        #[arg(short, long)]
        collection: String,

        /// Output file.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Build a menu of similar seasonal recipes.
    Recommend {
        state: Option<String>,

        /// Collections to draw from (comma-separated or repeated).
        #[arg(short, long = "collection", value_delimiter = ',')]
        collections: Vec<String>,

        /// Number of recipes.
        #[arg(short)]
        n: Option<usize>,

        /// Title to build the menu around (random when omitted).
        #[arg(long)]
        seed: Option<String>,
    },

    /// Build a varied menu with one recipe per DBSCAN cluster.
    Cluster {
        state: Option<String>,

        #[arg(short, long = "collection", value_delimiter = ',')]
        collections: Vec<String>,

        /// Neighbourhood radius.
        #[arg(long, default_value_t = 0.2)]
        eps: f32,

        /// Points within `eps` needed for a core point.
        #[arg(long, default_value_t = 5)]
        min_samples: usize,

        /// Maximum number of recipes.
        #[arg(short)]
        n: Option<usize>,
    },

    /// List collections and their document counts.
    Collections,

    /// Full-text search over recipe titles.
    Search {
        collection: String,
        query: String,

        #[arg(long, default_value_t = 10)]
        limit: u32,
    },

    /// Start the menu HTTP API.
    Serve {
        /// Socket address (defaults to `server.bind`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "localvore=info",
        1 => "localvore=debug",
        _ => "localvore=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Resolved config plus the global overrides.
struct Context {
    config: AppConfig,
    db: PathBuf,
}

impl Context {
    fn load(db: Option<PathBuf>) -> Result<Self> {
        let config = load_config()?;
        let db = db.unwrap_or_else(|| expand_home(&config.defaults.database));
        Ok(Self { config, db })
    }

    async fn storage(&self) -> Result<Storage> {
        info!(path = %self.db.display(), "opening recipe database");
        Ok(Storage::open(&self.db).await?)
    }

    async fn storage_readonly(&self) -> Result<Storage> {
        info!(path = %self.db.display(), "opening recipe database read-only");
        Ok(Storage::open_readonly(&self.db).await?)
    }

    fn guide(&self) -> Result<SeasonalGuide> {
        Ok(SeasonalGuide::new(&self.config.seasonal)?)
    }

    fn state(&self, state: Option<String>) -> String {
        state.unwrap_or_else(|| self.config.defaults.state.clone())
    }

    fn collections(&self, collections: Vec<String>) -> Vec<String> {
        if collections.is_empty() {
            self.config.defaults.collections.clone()
        } else {
            collections
        }
    }
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    // Config commands must work before a config file exists.
    let db = cli.db;
    let ctx = || Context::load(db.clone());
    match cli.command {
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
        Command::Veggies { state, date } => cmd_veggies(&ctx()?, state, date).await,
        Command::Scrape {
            site,
            max_pages,
            concurrency,
        } => cmd_scrape(&ctx()?, &site, max_pages, concurrency).await,
        Command::Sites => cmd_sites(&ctx()?),
        Command::Etl {
            layer1,
            predictions,
            collection,
            no_vectorize,
        } => cmd_etl(&ctx()?, layer1, predictions, collection, !no_vectorize).await,
        Command::Import {
            collection,
            file,
            vectorize,
        } => cmd_import(&ctx()?, &collection, &file, vectorize).await,
        Command::Trim { collection } => cmd_trim(&ctx()?, &collection).await,
        Command::Vectorize { collection } => cmd_vectorize(&ctx()?, &collection).await,
        Command::Query {
            state,
            collection,
            json,
        } => cmd_query(&ctx()?, state, &collection, json).await,
        Command::Export {
            state,
            collection,
            out,
        } => cmd_export(&ctx()?, state, &collection, &out).await,
        Command::Recommend {
            state,
            collections,
            n,
            seed,
        } => {
            let ctx = ctx()?;
            let request = MenuRequest {
                state: ctx.state(state),
                collections: ctx.collections(collections),
                n: n.unwrap_or(ctx.config.defaults.n_recipes),
                seed,
            };
            cmd_recommend(&ctx, &request).await
        }
        Command::Cluster {
            state,
            collections,
            eps,
            min_samples,
            n,
        } => {
            let ctx = ctx()?;
            let request = MenuRequest {
                state: ctx.state(state),
                collections: ctx.collections(collections),
                n: n.unwrap_or(ctx.config.defaults.n_recipes),
                seed: None,
            };
            cmd_cluster(&ctx, &request, ClusterParams { eps, min_samples }).await
        }
        Command::Collections => cmd_collections(&ctx()?).await,
        Command::Search {
            collection,
            query,
            limit,
        } => cmd_search(&ctx()?, &collection, &query, limit).await,
        Command::Serve { bind } => cmd_serve(&ctx()?, bind).await,
    }
}

// ---------------------------------------------------------------------------
// Seasonal guide and scraping
// ---------------------------------------------------------------------------

async fn cmd_veggies(ctx: &Context, state: Option<String>, date: Option<NaiveDate>) -> Result<()> {
    let state = ctx.state(state);
    let date = date.unwrap_or_else(|| Local::now().date_naive());
    let veggies = ctx.guide()?.fetch_veggies(&state, date).await?;

    println!("In season in {state} ({date}):");
    for veg in &veggies {
        println!("  {veg}");
    }
    Ok(())
}

async fn cmd_scrape(
    ctx: &Context,
    site: &str,
    max_pages: Option<u32>,
    concurrency: Option<u32>,
) -> Result<()> {
    let registry = SiteRegistry::new(&ctx.config.sites);
    let tags = registry.get(site)?.clone();

    let mut policy = ScrapePolicy::from(&ctx.config);
    if let Some(pages) = max_pages {
        policy.max_pages = Some(pages);
    }
    if let Some(c) = concurrency {
        policy.concurrency = c.max(1);
    }

    info!(site = %tags.name, root = %tags.root_url, "scraping recipe site");

    let storage = ctx.storage().await?;
    let reporter = CliProgress::new();
    let result = scrape_site(&storage, &tags, policy, &reporter).await?;
    reporter.finish();

    println!();
    println!("  Scrape of {} finished", tags.name);
    println!("  Index pages: {}", result.index_pages);
    println!("  Found:       {}", result.recipes_found);
    println!("  Stored:      {}", result.recipes_stored);
    println!("  Skipped:     {}", result.recipes_skipped);
    println!("  Errors:      {}", result.errors.len());
    println!("  Time:        {:.1}s", result.duration.as_secs_f64());
    for (url, err) in result.errors.iter().take(5) {
        println!("    {url}: {err}");
    }
    println!();

    Ok(())
}

fn cmd_sites(ctx: &Context) -> Result<()> {
    let registry = SiteRegistry::new(&ctx.config.sites);
    for site in registry.sites() {
        let pages = site
            .pagination
            .map_or_else(|| "?".to_string(), |p| p.to_string());
        println!("{:<6} {:<40} pages: {pages}", site.name, site.root_url);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ETL and collection maintenance
// ---------------------------------------------------------------------------

async fn cmd_etl(
    ctx: &Context,
    layer1: Option<PathBuf>,
    predictions: Option<String>,
    collection: Option<String>,
    vectorize: bool,
) -> Result<()> {
    let options = EtlOptions {
        collection: collection.unwrap_or_else(|| ctx.config.etl.collection.clone()),
        layer1,
        predictions: predictions.unwrap_or_else(|| ctx.config.etl.predictions_url.clone()),
        vectorize,
    };
    info!(
        collection = %options.collection,
        predictions = %options.predictions,
        "running Recipe1M ETL"
    );

    let vectorizer = load_vectorizer(&ctx.config.vectorizer)?;
    let storage = ctx.storage().await?;
    let reporter = CliProgress::new();
    let report = run_etl(&storage, &options, vectorizer.as_ref(), &reporter).await?;
    reporter.finish();

    println!();
    println!("  ETL into {} finished", options.collection);
    println!("  layer1 rows:  {}", report.layer1_inserted);
    println!("  Predictions:  {}", report.predictions);
    println!("  Dropped:      {}", report.dropped);
    println!("  Updated:      {}", report.updated);
    println!("  Missing:      {}", report.missing);
    println!("  Vectorized:   {}", report.vectorized);
    println!();

    Ok(())
}

async fn cmd_import(
    ctx: &Context,
    collection: &str,
    file: &std::path::Path,
    vectorize: bool,
) -> Result<()> {
    if !file.is_file() {
        return Err(eyre!("'{}' is not a file", file.display()));
    }

    let storage = ctx.storage().await?;
    let reporter = CliProgress::new();
    let imported = import_documents(file, &storage, collection, &reporter).await?;
    let vectorized = if vectorize {
        let vectorizer = load_vectorizer(&ctx.config.vectorizer)?;
        Some(vectorize_collection(&storage, collection, vectorizer.as_ref(), &reporter).await?)
    } else {
        None
    };
    reporter.finish();

    println!("Imported {imported} recipes into {collection}");
    if let Some(count) = vectorized {
        println!("Vectorized {count} recipes");
    }
    Ok(())
}

async fn cmd_trim(ctx: &Context, collection: &str) -> Result<()> {
    let storage = ctx.storage().await?;
    let reporter = CliProgress::new();
    let result = trim_ingredients(&storage, collection, &reporter).await?;
    reporter.finish();

    println!(
        "Trimmed {} recipes in {collection} ({} failures)",
        result.updated, result.failures
    );
    Ok(())
}

async fn cmd_vectorize(ctx: &Context, collection: &str) -> Result<()> {
    let vectorizer = load_vectorizer(&ctx.config.vectorizer)?;
    let storage = ctx.storage().await?;
    let reporter = CliProgress::new();
    let written = vectorize_collection(&storage, collection, vectorizer.as_ref(), &reporter).await?;
    reporter.finish();

    println!(
        "Vectorized {written} recipes in {collection} with {} ({} dimensions)",
        vectorizer.name(),
        vectorizer.dimension()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Menus
// ---------------------------------------------------------------------------

async fn cmd_query(ctx: &Context, state: Option<String>, collection: &str, json: bool) -> Result<()> {
    let state = ctx.state(state);
    let storage = ctx.storage_readonly().await?;
    let recipes = backend_query(&storage, &ctx.guide()?, collection, &state).await?;

    if json {
        for mut recipe in recipes {
            recipe.vector = None;
            println!("{}", serde_json::to_string(&recipe)?);
        }
    } else {
        println!("{} seasonal recipes in {collection}:", recipes.len());
        for recipe in &recipes {
            println!("  {}", recipe.title);
        }
    }
    Ok(())
}

async fn cmd_export(
    ctx: &Context,
    state: Option<String>,
    collection: &str,
    out: &std::path::Path,
) -> Result<()> {
    let state = ctx.state(state);
    let storage = ctx.storage_readonly().await?;
    let count = export_query(&storage, &ctx.guide()?, collection, &state, out).await?;
    println!("Wrote {count} recipes to {}", out.display());
    Ok(())
}

async fn cmd_recommend(ctx: &Context, request: &MenuRequest) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let menu = recommend(&storage, &ctx.guide()?, request).await?;
    print_menu(&request.state, &menu);
    Ok(())
}

async fn cmd_cluster(ctx: &Context, request: &MenuRequest, params: ClusterParams) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let menu = cluster_menu(&storage, &ctx.guide()?, request, params).await?;
    print_menu(&request.state, &menu);
    Ok(())
}

fn print_menu(state: &str, menu: &[String]) {
    println!("Menu for {state}:");
    for (i, title) in menu.iter().enumerate() {
        println!("  {}. {title}", i + 1);
    }
}

// ---------------------------------------------------------------------------
// Store inspection and server
// ---------------------------------------------------------------------------

async fn cmd_collections(ctx: &Context) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let collections = storage.list_collections().await?;
    if collections.is_empty() {
        println!("No collections yet. Run `localvore scrape` or `localvore etl` first.");
        return Ok(());
    }
    for (name, count) in collections {
        println!("{name:<16} {count:>8} recipes");
    }
    Ok(())
}

async fn cmd_search(ctx: &Context, collection: &str, query: &str, limit: u32) -> Result<()> {
    let storage = ctx.storage_readonly().await?;
    let hits = storage.search_titles(collection, query, limit).await?;
    if hits.is_empty() {
        println!("No titles in {collection} match '{query}'");
        return Ok(());
    }
    for hit in hits {
        println!("{:>8.3}  {}", hit.score, hit.title);
    }
    Ok(())
}

async fn cmd_serve(ctx: &Context, bind: Option<String>) -> Result<()> {
    let bind = bind.unwrap_or_else(|| ctx.config.server.bind.clone());
    let state = ApiState {
        storage: Arc::new(ctx.storage_readonly().await?),
        guide: ctx.guide()?,
        default_collections: ctx.config.defaults.collections.clone(),
        default_n: ctx.config.defaults.n_recipes,
    };

    println!("Serving menus on http://{bind}/api/menu/<state>");
    serve(&bind, state).await?;
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg}")
                .expect("static progress template")
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item(&self, current: usize, total: usize, detail: &str) {
        if total > 0 {
            self.spinner
                .set_message(format!("[{current}/{total}] {detail}"));
        } else {
            self.spinner.set_message(format!("[{current}] {detail}"));
        }
    }

    fn done(&self, summary: &str) {
        self.finish();
        info!(summary, "done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_recommend() {
        let cli = Cli::try_parse_from([
            "localvore", "-vv", "recommend", "tennessee", "-c", "BB,NE", "-n", "3", "--seed",
            "Kale Soup",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Recommend {
                state,
                collections,
                n,
                seed,
            } => {
                assert_eq!(state.as_deref(), Some("tennessee"));
                assert_eq!(collections, vec!["BB", "NE"]);
                assert_eq!(n, Some(3));
                assert_eq!(seed.as_deref(), Some("Kale Soup"));
            }
            _ => panic!("expected recommend"),
        }
    }

    #[test]
    fn cli_parses_cluster_defaults() {
        let cli =
            Cli::try_parse_from(["localvore", "cluster", "ohio", "-c", "recipe1M"]).unwrap();
        match cli.command {
            Command::Cluster {
                eps, min_samples, n, ..
            } => {
                assert_eq!(eps, 0.2);
                assert_eq!(min_samples, 5);
                assert_eq!(n, None);
            }
            _ => panic!("expected cluster"),
        }
    }

    #[test]
    fn cli_parses_veggies_date_and_global_db() {
        let cli = Cli::try_parse_from([
            "localvore", "veggies", "tennessee", "--date", "2024-04-20", "--db", "/tmp/x.db",
            "--log-format", "json",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.log_format, LogFormat::Json));
        match cli.command {
            Command::Veggies { date, .. } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2024, 4, 20));
            }
            _ => panic!("expected veggies"),
        }
    }

    #[test]
    fn cli_rejects_bad_date() {
        assert!(Cli::try_parse_from(["localvore", "veggies", "--date", "April"]).is_err());
    }

    #[test]
    fn etl_no_vectorize_flag() {
        let cli = Cli::try_parse_from(["localvore", "etl", "--no-vectorize"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Etl {
                no_vectorize: true,
                ..
            }
        ));
    }

    #[test]
    fn config_show_parses_with_global_db() {
        let cli =
            Cli::try_parse_from(["localvore", "config", "show", "--db", "/tmp/x.db"]).unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
    }
}
