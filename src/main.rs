use lotledger::cache::SystemClock;
use lotledger::oracle::{CachingOracle, HttpPriceOracle, PriceOracle};
use lotledger::orchestration::{Reconciler, TradeService};
use lotledger::wallets::{InMemoryWalletDirectory, WalletDirectory};
use lotledger::{api, config::Config, db::init_db, IdempotencyLayer, Repository};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Base retention for oracle quotes.
const QUOTE_TTL: Duration = Duration::from_secs(30);
/// Extended retention for quotes of mints the ledger still holds.
const QUOTE_PINNED_TTL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let clock = Arc::new(SystemClock);

    let oracle = Arc::new(CachingOracle::new(
        Arc::new(HttpPriceOracle::new(config.oracle_api_url.clone())),
        QUOTE_TTL,
        QUOTE_PINNED_TTL,
        clock.clone(),
    ));
    let wallets: Arc<dyn WalletDirectory> = Arc::new(InMemoryWalletDirectory::new());
    let idempotency = Arc::new(IdempotencyLayer::new(
        Duration::from_secs(config.idempotency_ttl_secs),
        clock.clone(),
    ));

    let trader = Arc::new(TradeService::new(
        repo.clone(),
        oracle.clone() as Arc<dyn PriceOracle>,
        wallets.clone(),
        config.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        repo.clone(),
        oracle.clone() as Arc<dyn PriceOracle>,
        wallets,
        config.clone(),
    ));

    // Periodic retention sweep and held-mint pin refresh.
    {
        let idempotency = idempotency.clone();
        let oracle = oracle.clone();
        let repo = repo.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                let swept = idempotency.sweep() + oracle.sweep();
                if swept > 0 {
                    tracing::debug!(swept, "Swept expired cache entries");
                }
                match repo.held_mints().await {
                    Ok(held) => oracle.set_held(held),
                    Err(e) => tracing::warn!(error = %e, "Failed to refresh held mints"),
                }
            }
        });
    }

    let app = api::create_router(api::AppState::new(
        repo,
        config,
        trader,
        reconciler,
        idempotency,
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
