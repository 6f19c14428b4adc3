/// HTTP layer: request extraction, status-code mapping and JSON shaping.
/// All domain rules live in `bidding`, `closer` and `transfer`; nothing in
/// here mutates state directly.
// region:    --- Imports
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::bidding::{self, PlaceBidCommand};
use crate::cache::CacheInvalidator;
use crate::error::BidError;
use crate::models::NewAuction;
use crate::store::EntityStore;
// endregion: --- Imports

// region:    --- State

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub cache: Arc<dyn CacheInvalidator>,
}

// endregion: --- State

// region:    --- Command Handlers

#[derive(Debug, Deserialize)]
pub struct CreateAuctionRequest {
    pub set_id: i64,
    pub seller_id: i64,
    pub base_price: i64,
    pub close_time: DateTime<Utc>,
}

/// Open a new auction for a collectible set.
pub async fn handle_create_auction(
    State(state): State<AppState>,
    Json(req): Json<CreateAuctionRequest>,
) -> impl IntoResponse {
    info!("{:<12} --> create auction request: {:?}", "Handler", req);
    let now = Utc::now();

    if req.base_price <= 0 {
        return reject(
            StatusCode::BAD_REQUEST,
            "base price must be positive",
            "INVALID_BASE_PRICE",
        );
    }
    if req.close_time <= now {
        return reject(
            StatusCode::BAD_REQUEST,
            "close time must be in the future",
            "CLOSE_TIME_PAST",
        );
    }

    let seller = match state.store.get_account(req.seller_id).await {
        Ok(Some(seller)) => seller,
        Ok(None) => {
            return reject(StatusCode::NOT_FOUND, "seller not found", "SELLER_NOT_FOUND")
        }
        Err(e) => return store_failure(e.to_string()),
    };
    let set = match state.store.get_set(req.set_id).await {
        Ok(Some(set)) => set,
        Ok(None) => return reject(StatusCode::NOT_FOUND, "set not found", "SET_NOT_FOUND"),
        Err(e) => return store_failure(e.to_string()),
    };
    if set.entity.owner_id != Some(seller.entity.id) {
        return reject(
            StatusCode::BAD_REQUEST,
            "seller does not own this set",
            "NOT_OWNER",
        );
    }

    match state
        .store
        .create_auction(NewAuction {
            set_id: req.set_id,
            seller_id: req.seller_id,
            base_price: req.base_price,
            close_time: req.close_time,
            created_at: now,
        })
        .await
    {
        Ok(auction) => {
            state.cache.invalidate_listings().await;
            (StatusCode::CREATED, Json(auction.entity)).into_response()
        }
        Err(e) => store_failure(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceBidRequest {
    pub bidder_id: i64,
    pub amount: i64,
}

/// Bid admission.
pub async fn handle_place_bid(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
    Json(req): Json<PlaceBidRequest>,
) -> impl IntoResponse {
    let cmd = PlaceBidCommand {
        auction_id,
        bidder_id: req.bidder_id,
        amount: req.amount,
    };

    match bidding::place_bid(state.store.as_ref(), &cmd, Utc::now()).await {
        Ok(bid) => {
            state.cache.invalidate_listings().await;
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "message": "bid accepted",
                    "bid": bid
                })),
            )
                .into_response()
        }
        Err(e) => {
            let status = match &e {
                BidError::AuctionNotFound(_) | BidError::BidderNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                BidError::Contention(_) => StatusCode::CONFLICT,
                BidError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
                _ => StatusCode::BAD_REQUEST,
            };
            reject(status, &e.to_string(), e.code())
        }
    }
}

// endregion: --- Command Handlers

// region:    --- Query Handlers

/// Auction detail. Read-only, no state transition.
pub async fn handle_get_auction(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> get auction id: {}", "Handler", auction_id);
    match state.store.get_auction(auction_id).await {
        Ok(Some(auction)) => Json(auction.entity).into_response(),
        Ok(None) => reject(
            StatusCode::NOT_FOUND,
            "auction not found",
            "AUCTION_NOT_FOUND",
        ),
        Err(e) => store_failure(e.to_string()),
    }
}

/// All auctions, newest first.
pub async fn handle_list_auctions(State(state): State<AppState>) -> impl IntoResponse {
    info!("{:<12} --> list auctions", "Handler");
    match state.store.list_auctions().await {
        Ok(auctions) => Json(auctions).into_response(),
        Err(e) => store_failure(e.to_string()),
    }
}

/// Bid history for one auction, highest first.
pub async fn handle_get_auction_bids(
    State(state): State<AppState>,
    Path(auction_id): Path<i64>,
) -> impl IntoResponse {
    info!("{:<12} --> get bids for auction: {}", "Handler", auction_id);
    match state.store.bids_for_auction(auction_id).await {
        Ok(bids) => Json(bids).into_response(),
        Err(e) => store_failure(e.to_string()),
    }
}

// endregion: --- Query Handlers

// region:    --- Response Helpers

fn reject(status: StatusCode, error: &str, code: &str) -> axum::response::Response {
    (
        status,
        Json(serde_json::json!({ "error": error, "code": code })),
    )
        .into_response()
}

fn store_failure(detail: String) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": detail, "code": "STORE_UNAVAILABLE" })),
    )
        .into_response()
}

// endregion: --- Response Helpers
