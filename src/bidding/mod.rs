/// Bid admission engine.
///
/// Admission is a read-check-conditionally-write cycle: the auction and its
/// bids are read, the price rules are checked, and the bid is appended
/// conditioned on the auction still being open at the version observed by
/// the read. A version conflict restarts the cycle, so a bid can never land
/// after a closure has been durably committed, and no two bids can be
/// admitted against the same observation.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::error::BidError;
use crate::models::{AuctionStatus, Bid, NewBid};
use crate::store::{EntityStore, StoreError};
// endregion: --- Imports

// region:    --- Command

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBidCommand {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
}

// endregion: --- Command

/// Attempts before surfacing a contention error to the caller.
pub const MAX_BID_RETRIES: u32 = 100;

/// Linear backoff per lost race, capped.
const RETRY_DELAY_MS: u64 = 5;
const RETRY_DELAY_CAP: u32 = 10;

// region:    --- Place Bid

/// Validate and commit a single bid.
///
/// Precondition order: auction exists, auction open (state-based: a bid
/// past `close_time` is still honored while the status is open), bidder
/// account exists, bidder is not the seller, amount strictly beats the
/// current maximum bid (recomputed from all bids each attempt), and the
/// first bid must meet the base price. Ties lose.
pub async fn place_bid(
    store: &dyn EntityStore,
    cmd: &PlaceBidCommand,
    now: DateTime<Utc>,
) -> Result<Bid, BidError> {
    info!("{:<12} --> bid request: {:?}", "Bidding", cmd);

    for attempt in 0..MAX_BID_RETRIES {
        if attempt > 0 {
            sleep(Duration::from_millis(
                RETRY_DELAY_MS * u64::from(attempt.min(RETRY_DELAY_CAP)),
            ))
            .await;
        }

        let versioned = store
            .get_auction(cmd.auction_id)
            .await?
            .ok_or(BidError::AuctionNotFound(cmd.auction_id))?;
        let auction = versioned.entity;

        if auction.status == AuctionStatus::Closed {
            return Err(BidError::AuctionClosed(auction.id));
        }

        store
            .get_account(cmd.bidder_id)
            .await?
            .ok_or(BidError::BidderNotFound(cmd.bidder_id))?;

        if cmd.bidder_id == auction.seller_id {
            return Err(BidError::SellerBid);
        }

        // current maximum recomputed from the full bid list, never cached
        let bids = store.bids_for_auction(cmd.auction_id).await?;
        let highest = bids.iter().map(|b| b.amount).max();
        match highest {
            Some(high) if cmd.amount <= high => {
                return Err(BidError::BidTooLow {
                    amount: cmd.amount,
                    minimum: high + 1,
                });
            }
            None if cmd.amount < auction.base_price => {
                return Err(BidError::BidTooLow {
                    amount: cmd.amount,
                    minimum: auction.base_price,
                });
            }
            _ => {}
        }

        // the append is conditioned on the auction being open and unchanged
        // since the checks above
        let new_bid = NewBid {
            auction_id: cmd.auction_id,
            bidder_id: cmd.bidder_id,
            amount: cmd.amount,
            created_at: now,
        };
        match store.append_bid(new_bid, versioned.version).await {
            Ok(bid) => {
                info!(
                    "{:<12} --> bid {} accepted: auction {} now at {}",
                    "Bidding", bid.id, bid.auction_id, bid.amount
                );
                return Ok(bid);
            }
            Err(StoreError::VersionConflict) => {
                warn!(
                    "{:<12} --> lost version race on auction {} (attempt {}), retrying",
                    "Bidding", cmd.auction_id, attempt
                );
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(BidError::Contention(MAX_BID_RETRIES))
}

// endregion: --- Place Bid
