//! Shopbook - paged browsing of a shop's customers and inventory.
//!
//! # Usage
//!
//! ```bash
//! # Browse wholesalers from a seed file, two per page
//! shopbook --seed demo.json --filter type=Wholesaler --sort name --page-size 2
//!
//! # Against the authoritative PostgreSQL store
//! DATABASE_URL=postgres://localhost/shopbook shopbook --shop shop-42 --search 98765432
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::Value;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use shopbook_core::metrics::init_metrics;
use shopbook_core::models::{Customer, Entity, InventoryItem, ShopScope};
use shopbook_core::ports::{DocumentSource, SourcePreference};
use shopbook_core::query::{ClientFilter, PredicateSet, SortKey};
use shopbook_core::services::{PagedSequenceProducer, PagingConfig, SourceFallbackFetcher};
use shopbook_storage::{Database, DatabaseConfig, MemoryDocumentStore, PgDocumentSource};

/// Shopbook CLI - browse shop collections page by page.
#[derive(Parser, Debug)]
#[command(name = "shopbook")]
#[command(about = "Shopbook - paged customer and inventory lists")]
#[command(version)]
struct Cli {
    /// Shop to read from.
    #[arg(long, env = "SHOPBOOK_SHOP", default_value = "default")]
    shop: String,

    /// Collection to browse.
    #[arg(long, value_enum, default_value_t = Collection::Customers)]
    collection: Collection,

    /// Name prefix or phone number.
    #[arg(long)]
    search: Option<String>,

    /// Equality filter, `field=value`. Repeatable.
    #[arg(long = "filter", value_parser = parse_assignment)]
    filters: Vec<(String, Value)>,

    /// Keep records whose field is one of the values, `field=a,b,c`.
    #[arg(long, value_parser = parse_any_of)]
    any_of: Option<(String, Vec<Value>)>,

    /// Case-insensitive substring over the collection's text fields.
    #[arg(long)]
    contains: Option<String>,

    /// Only inventory items at or below their reorder level.
    #[arg(long)]
    low_stock: bool,

    /// Sort key, `field` or `field:desc`. Repeatable.
    #[arg(long = "sort", value_parser = parse_sort)]
    sort: Vec<SortKey>,

    /// Records per page.
    #[arg(long, env = "PAGE_SIZE")]
    page_size: Option<usize>,

    /// Stop after this many pages.
    #[arg(long)]
    max_pages: Option<usize>,

    /// Source tried first.
    #[arg(long, value_enum, default_value_t = Source::Cache)]
    source: Source,

    /// JSON seed file loaded into the local cache:
    /// `{"customers": [...], "inventory": [...]}`.
    #[arg(long, env = "SHOPBOOK_SEED")]
    seed: Option<PathBuf>,

    /// Also write the seed into the PostgreSQL store.
    #[arg(long, requires = "seed")]
    publish_seed: bool,

    /// PostgreSQL database URL. Without it the seed doubles as remote store.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Prometheus metrics port. Metrics are off when unset.
    #[arg(long, env = "METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Delete every document of the shop and exit.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Collection {
    Customers,
    Inventory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Source {
    Cache,
    Remote,
}

impl From<Source> for SourcePreference {
    fn from(source: Source) -> Self {
        match source {
            Source::Cache => SourcePreference::Cache,
            Source::Remote => SourcePreference::Remote,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    if let Some(port) = cli.metrics_port {
        match PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
        {
            Ok(()) => {
                init_metrics();
                info!("📊 Metrics:  http://localhost:{}/metrics", port);
            }
            Err(e) => {
                warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
            }
        }
    }

    let scope = ShopScope::new(cli.shop.clone());
    info!(shop = %scope.shop_id, collection = ?cli.collection, "🚀 Starting Shopbook");

    // ─────────────────────────────────────────────────────────────────────────
    // 🌱 CACHE
    // ─────────────────────────────────────────────────────────────────────────
    let seed = match &cli.seed {
        Some(path) => Some(read_seed(path)?),
        None => None,
    };

    let cache = Arc::new(MemoryDocumentStore::new("cache"));
    match &seed {
        Some(seed) => load_seed(&cache, &scope, seed).await?,
        None => {
            debug!("No seed given, cache starts cold");
            cache.set_available(false);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ REMOTE
    // ─────────────────────────────────────────────────────────────────────────
    let mut db = None;
    let remote: Arc<dyn DocumentSource> = match &cli.database_url {
        Some(url) => {
            debug!(database_url = %mask_password(url), "Database endpoint");
            info!("🗄️  Connecting to database...");
            let database = Database::connect(&DatabaseConfig::for_browsing(url))
                .await
                .context("Failed to connect to database")?;
            database.migrate().await.context("Failed to run migrations")?;
            info!("🗄️  Database ready (migrations applied)");

            if cli.migrate_only {
                info!("🛑 --migrate-only flag set, exiting");
                return Ok(());
            }
            if cli.purge {
                return handle_purge(&database, &scope, cli.yes).await;
            }

            let source = PgDocumentSource::new(&database);
            if cli.publish_seed
                && let Some(seed) = &seed
            {
                publish_seed(&source, &scope, seed).await?;
            }
            db = Some(database);
            Arc::new(source)
        }
        None => {
            if cli.migrate_only || cli.purge {
                bail!("--migrate-only and --purge need --database-url");
            }
            let store = MemoryDocumentStore::new("remote");
            if let Some(seed) = &seed {
                load_seed(&store, &scope, seed).await?;
            }
            Arc::new(store)
        }
    };

    let fetcher = Arc::new(SourceFallbackFetcher::new(cache, remote));
    let config = PagingConfig {
        preferred_source: cli.source.into(),
        ..PagingConfig::default()
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 📄 BROWSE
    // ─────────────────────────────────────────────────────────────────────────
    let browse = async {
        match cli.collection {
            Collection::Customers => browse::<Customer>(&cli, fetcher, config, scope).await,
            Collection::Inventory => browse::<InventoryItem>(&cli, fetcher, config, scope).await,
        }
    };

    let result = tokio::select! {
        result = browse => result,
        _ = shutdown_signal() => {
            info!("🛑 Interrupted");
            Ok(BrowseStats::default())
        }
    };

    if let Some(db) = db {
        db.close().await;
    }

    let stats = result?;
    info!(pages = stats.pages, items = stats.items, "✅ Done");
    Ok(())
}

#[derive(Debug, Default)]
struct BrowseStats {
    pages: usize,
    items: usize,
}

/// Page through one collection, printing each item as a JSON line.
async fn browse<E: Entity>(
    cli: &Cli,
    fetcher: Arc<SourceFallbackFetcher>,
    config: PagingConfig,
    scope: ShopScope,
) -> Result<BrowseStats> {
    let predicates = build_predicates::<E>(cli)?;
    let page_size = config.page_size(cli.page_size);
    let producer = PagedSequenceProducer::<E>::new(fetcher).with_config(config);
    let mut session = producer
        .session(scope, predicates, page_size)
        .context("Invalid query")?;

    let mut stats = BrowseStats::default();
    loop {
        if cli.max_pages.is_some_and(|max| stats.pages >= max) {
            info!("🛑 Page limit reached");
            break;
        }

        let page = session.next_page().await.context("Failed to load page")?;
        stats.pages += 1;
        stats.items += page.items.len();

        let mut out = io::stdout().lock();
        for item in &page.items {
            writeln!(out, "{}", serde_json::to_string(item)?)?;
        }
        info!(
            page = stats.pages,
            items = page.items.len(),
            is_last = page.is_last,
            "📄 Page loaded"
        );

        if page.is_last {
            break;
        }
    }

    Ok(stats)
}

fn build_predicates<E: Entity>(cli: &Cli) -> Result<PredicateSet> {
    let mut predicates = PredicateSet::new();

    if let Some(term) = &cli.search {
        predicates = predicates.with_search(term.clone());
    }
    for (field, value) in &cli.filters {
        predicates = predicates.with_equality(field.clone(), value.clone());
    }
    for key in &cli.sort {
        predicates = predicates.sort_by(key.clone());
    }
    if let Some(needle) = &cli.contains {
        predicates = predicates
            .with_client_filter(ClientFilter::contains(E::text_fields().iter().copied(), needle.clone()));
    }
    if let Some((field, values)) = &cli.any_of {
        predicates = predicates.with_client_filter(ClientFilter::any_of(field.clone(), values.clone()));
    }
    if cli.low_stock {
        if E::COLLECTION != InventoryItem::COLLECTION {
            bail!("--low-stock only applies to inventory");
        }
        predicates = predicates.with_client_filter(ClientFilter::at_or_below(
            InventoryItem::QUANTITY,
            InventoryItem::REORDER_LEVEL,
        ));
    }

    Ok(predicates)
}

// =============================================================================
// Seed
// =============================================================================

fn read_seed(path: &Path) -> Result<serde_json::Map<String, Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read seed file {}", path.display()))?;
    match serde_json::from_str(&raw).context("Seed file is not valid JSON")? {
        Value::Object(collections) => Ok(collections),
        _ => bail!("Seed file must be an object keyed by collection"),
    }
}

async fn load_seed(
    store: &MemoryDocumentStore,
    scope: &ShopScope,
    seed: &serde_json::Map<String, Value>,
) -> Result<()> {
    for (collection, records) in seed {
        let count = store
            .load_json(scope, collection, records.clone())
            .await
            .with_context(|| format!("Invalid seed for {collection}"))?;
        info!(store = %DocumentSource::name(store), collection = %collection, count, "🌱 Seeded");
    }
    Ok(())
}

async fn publish_seed(
    source: &PgDocumentSource,
    scope: &ShopScope,
    seed: &serde_json::Map<String, Value>,
) -> Result<()> {
    let staging = MemoryDocumentStore::new("staging");
    load_seed(&staging, scope, seed).await?;
    for collection in seed.keys() {
        let documents = staging.documents(scope, collection).await;
        let written = source
            .upsert(scope, collection, &documents)
            .await
            .with_context(|| format!("Failed to publish {collection}"))?;
        info!(collection = %collection, written, "📤 Published seed");
    }
    Ok(())
}

// =============================================================================
// Argument parsing
// =============================================================================

/// Scalars parse as JSON (`42`, `true`); anything else is a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("Invalid filter '{}'. Use field=value.", raw))?;
    if field.is_empty() {
        return Err(format!("Invalid filter '{}': empty field name.", raw));
    }
    Ok((field.to_string(), parse_value(value)))
}

fn parse_any_of(raw: &str) -> Result<(String, Vec<Value>), String> {
    let (field, values) = raw
        .split_once('=')
        .ok_or_else(|| format!("Invalid value list '{}'. Use field=a,b,c.", raw))?;
    let values = values
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(parse_value)
        .collect();
    Ok((field.to_string(), values))
}

fn parse_sort(raw: &str) -> Result<SortKey, String> {
    match raw.split_once(':') {
        None => Ok(SortKey::asc(raw)),
        Some((field, dir)) => match dir.to_lowercase().as_str() {
            "asc" => Ok(SortKey::asc(field)),
            "desc" => Ok(SortKey::desc(field)),
            _ => Err(format!(
                "Invalid sort direction '{}'. Use 'asc' or 'desc'.",
                dir
            )),
        },
    }
}

// =============================================================================
// Runtime helpers
// =============================================================================

/// Initialize tracing subscriber. Logs go to stderr so stdout stays JSON lines.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, scope: &ShopScope, skip_confirmation: bool) -> Result<()> {
    warn!("⚠️  PURGE MODE: This will delete every document of shop {}", scope.shop_id);
    warn!("   - Customers, inventory and any other collection");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge shop {}? [y/N] ", scope.shop_id);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging shop...");
    let stats = db
        .purge_shop(&scope.shop_id)
        .await
        .context("Failed to purge shop")?;
    db.close().await;

    info!("✅ Shop purged successfully");
    info!("   📦 Documents removed: {}", stats.documents_removed);

    Ok(())
}
