use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chainfetcher::{GatewayOptions, RegistryGatewayClient};
use clap::{Args, Parser, Subcommand};
use holostore::{
    config::{
        CacheConfig, ChainEndpoint, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_FAILED_CYCLES,
        DEFAULT_RECONCILE_INTERVAL_SECS,
    },
    errors::CacheError,
    models::{Address, CacheRecord, ChainId, UserHolo},
    scheduler::{CycleReport, SchedulerState, TickOutcome},
    signal::{Shutdown, ShutdownSignal},
    HoloCache,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Runs the command line interface for the holo cache service.
pub async fn run_cli() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => run_serve(cli.cache, args).await?,
        Command::Reconcile => run_reconcile(cli.cache).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(flatten)]
    cache: CacheArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Runs the scheduler, the event listeners and the query API until interrupted
    Serve(ServeArgs),
    /// Runs a single reconciliation cycle and prints its report as JSON
    Reconcile,
}

#[derive(Args)]
struct CacheArgs {
    /// SQLite database file backing the cache
    #[arg(long, env = "HOLOCACHE_DB_PATH", global = true, default_value = "holocache.sqlite")]
    db_path: PathBuf,
    /// Chain endpoints as <chain>=<rpc url>, comma separated
    #[arg(long = "chain", env = "HOLOCACHE_CHAINS", value_delimiter = ',', global = true)]
    chains: Vec<String>,
    /// Seconds between reconciliation cycles
    #[arg(long, env = "HOLOCACHE_INTERVAL_SECS", global = true, default_value_t = DEFAULT_RECONCILE_INTERVAL_SECS)]
    interval_secs: u64,
    /// Per-call timeout for chain reads, in seconds
    #[arg(long, env = "HOLOCACHE_FETCH_TIMEOUT_SECS", global = true, default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    fetch_timeout_secs: u64,
    /// Ignore --chain and use the local test registry
    #[arg(long, env = "HOLOCACHE_USE_TEST_REGISTRY", global = true, default_value_t = false)]
    use_test_registry: bool,
    /// Consecutive storage-failed cycles before the scheduler halts
    #[arg(long, env = "HOLOCACHE_MAX_FAILED_CYCLES", global = true, default_value_t = DEFAULT_MAX_FAILED_CYCLES)]
    max_failed_cycles: u32,
}

impl CacheArgs {
    fn into_config(self) -> anyhow::Result<CacheConfig> {
        let mut config = CacheConfig::new(self.db_path);
        for raw in &self.chains {
            config = config.with_chain(ChainEndpoint::parse_pair(raw)?);
        }
        if self.use_test_registry {
            config = config.with_test_registry();
        }
        config.reconcile_interval_secs = self.interval_secs;
        config.fetch_timeout_secs = self.fetch_timeout_secs;
        config.max_failed_cycles = self.max_failed_cycles;
        Ok(config)
    }
}

#[derive(Args)]
struct ServeArgs {
    /// Socket address to bind the query API
    #[arg(long, env = "HOLOCACHE_BIND", default_value = "127.0.0.1:3000")]
    bind: String,
}

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<HoloCache>,
}

impl AppState {
    pub fn new(cache: Arc<HoloCache>) -> Self {
        Self { cache }
    }
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(value: CacheError) -> Self {
        match value {
            CacheError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => {
                error!("request failed: {}", other);
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: Option<String>,
}

#[derive(Deserialize)]
struct CredentialsQuery {
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    credentials: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    scheduler: SchedulerState,
    chains: Vec<ChainId>,
    cached_addresses: usize,
    last_cycle: Option<CycleReport>,
}

#[derive(Serialize)]
struct CredentialsResponse {
    address: Address,
}

fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

fn open_cache(args: CacheArgs) -> anyhow::Result<Arc<HoloCache>> {
    let config = args.into_config()?;
    let options = GatewayOptions {
        request_timeout: config.fetch_timeout(),
        ..GatewayOptions::default()
    };
    let client = RegistryGatewayClient::new(config.endpoints()?, options)
        .context("failed to build registry gateway client")?;
    let cache = HoloCache::new(config, Arc::new(client)).context("failed to open holo cache")?;
    Ok(Arc::new(cache))
}

async fn run_serve(cache_args: CacheArgs, args: ServeArgs) -> anyhow::Result<()> {
    let addr: SocketAddr = args.bind.parse().context("failed to parse bind address")?;
    let cache = open_cache(cache_args)?;
    let shutdown = Arc::new(Shutdown::new());

    let scheduler_task = tokio::spawn({
        let scheduler = Arc::clone(&cache.scheduler);
        let shutdown = Arc::clone(&shutdown);
        async move {
            let result = scheduler.run(shutdown.signal()).await;
            if let Err(err) = &result {
                error!("Scheduler stopped: {}", err);
            }
            // A halted scheduler takes the whole service down with it.
            shutdown.trigger();
            result
        }
    });
    let mut listeners = Arc::clone(&cache.ingestor).start(shutdown.signal()).await;
    info!("{} event listener(s) running", listeners.len());

    let router = build_router(AppState::new(Arc::clone(&cache)));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind query API listener")?;

    info!("Query API listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&shutdown)))
        .await
        .context("query API server error")?;

    shutdown.trigger();
    while let Some(joined) = listeners.join_next().await {
        if let Err(err) = joined {
            error!("Event listener panicked: {}", err);
        }
    }
    scheduler_task
        .await
        .context("scheduler task panicked")?
        .context("scheduler halted")?;

    info!("Holo cache stopped");
    Ok(())
}

async fn run_reconcile(cache_args: CacheArgs) -> anyhow::Result<()> {
    let cache = open_cache(cache_args)?;
    match cache.scheduler.tick(&ShutdownSignal::never()).await {
        TickOutcome::Completed(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        TickOutcome::Skipped => anyhow::bail!("a reconciliation cycle is already running"),
    }
}

/// Builds the HTTP router for the read-only query API.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/holos/:chain/:address", get(get_holo))
        .route("/api/addresses", get(list_addresses))
        .route("/api/search", get(search))
        .route("/api/address-for-credentials", get(address_for_credentials))
        .with_state(state)
}

async fn get_status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let cache = &state.cache;
    let cached_addresses = cache.query.all_addresses_with_any_record()?.len();
    Ok(Json(StatusResponse {
        scheduler: cache.scheduler.state(),
        chains: cache.store.chains().to_vec(),
        cached_addresses,
        last_cycle: cache.scheduler.last_cycle(),
    }))
}

async fn get_holo(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> ApiResult<Json<CacheRecord>> {
    let record = state.cache.query.get_record(&chain, &address)?;
    record
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no cached holo for {address} on {chain}")))
}

async fn list_addresses(State(state): State<AppState>) -> ApiResult<Json<Vec<Address>>> {
    let addresses = state.cache.query.all_addresses_with_any_record()?;
    Ok(Json(addresses.into_iter().collect()))
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<UserHolo>>> {
    let needle = query
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing search text 'q'".to_string()))?;
    Ok(Json(state.cache.query.find_records_matching_text(&needle)?))
}

async fn address_for_credentials(
    State(state): State<AppState>,
    Query(query): Query<CredentialsQuery>,
) -> ApiResult<Json<CredentialsResponse>> {
    let (Some(service), Some(credentials)) = (query.service, query.credentials) else {
        return Err(ApiError::BadRequest(
            "both 'service' and 'credentials' are required".to_string(),
        ));
    };
    let address = state
        .cache
        .query
        .address_for_credentials(&service, &credentials)
        .await?;
    address
        .map(|address| Json(CredentialsResponse { address }))
        .ok_or_else(|| ApiError::NotFound(format!("no address holds {service} '{credentials}'")))
}

async fn shutdown_signal(shutdown: Arc<Shutdown>) {
    let mut stopped = shutdown.signal();
    tokio::select! {
        _ = signal::ctrl_c() => info!("Shutdown signal received"),
        _ = stopped.stopped() => info!("Shutting down after scheduler stop"),
    }
    shutdown.trigger();
}
