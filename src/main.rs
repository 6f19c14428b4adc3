// region:    --- Imports
use axum::{
    routing::{get, post},
    Router,
};
use setbid::cache::{CacheInvalidator, HttpCacheInvalidator, NoopCacheInvalidator};
use setbid::config::Config;
use setbid::handlers::{self, AppState};
use setbid::scheduler::SweepScheduler;
use setbid::store::{EntityStore, PgEntityStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
// endregion: --- Imports

// region:    --- Main
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .without_time()
        .with_target(false)
        .init();

    let config = Config::from_env();

    let store = PgEntityStore::connect(&config.database_url).await?;
    if let Err(e) = store.initialize_schema().await {
        error!("{:<12} --> schema initialization failed: {:?}", "Main", e);
        return Err(e.into());
    }
    info!("{:<12} --> store ready", "Main");
    let store: Arc<dyn EntityStore> = Arc::new(store);

    let cache: Arc<dyn CacheInvalidator> = match &config.cache_purge_url {
        Some(url) => Arc::new(HttpCacheInvalidator::new(url.clone())),
        None => Arc::new(NoopCacheInvalidator),
    };

    // recurring auction sweep
    let scheduler = SweepScheduler::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        config.sweep_interval,
    );
    scheduler.start();

    // cors for the browser test page
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes_all = Router::new()
        .route(
            "/auctions",
            post(handlers::handle_create_auction).get(handlers::handle_list_auctions),
        )
        .route("/auctions/:id", get(handlers::handle_get_auction))
        .route(
            "/auctions/:id/bids",
            post(handlers::handle_place_bid).get(handlers::handle_get_auction_bids),
        )
        .layer(cors)
        .with_state(AppState { store, cache });

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(
        "{:<12} --> Web Server: Listening on {}",
        "Main",
        listener.local_addr()?
    );

    if let Err(err) = axum::serve(listener, routes_all.into_make_service()).await {
        error!("{:<12} --> Server error: {}", "Main", err);
    }
    Ok(())
}
// endregion: --- Main
