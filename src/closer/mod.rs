/// Auction closer.
///
/// `sweep` runs in two phases. The close phase claims each due auction
/// exactly once with a conditional replace: losing the version race to
/// another sweep is a no-op, losing it to a late bid triggers a re-read and
/// winner recomputation. The settle phase drives the ownership transfer for
/// every closed-but-unsettled auction, including ones left behind by an
/// earlier failed or crashed sweep. Both phases are idempotent, so
/// overlapping or repeated invocations are safe.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::error::SweepError;
use crate::models::{Auction, AuctionStatus};
use crate::store::{EntityStore, StoreError, Versioned};
use crate::transfer;
// endregion: --- Imports

/// Per-auction attempts at the closure replace before giving up until the
/// next sweep.
const MAX_CLOSE_RETRIES: u32 = 10;

// region:    --- Outcome

/// One auction closed by this sweep invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ClosureOutcome {
    pub auction_id: i64,
    pub winner_id: Option<i64>,
    pub winning_amount: Option<i64>,
}

// endregion: --- Outcome

// region:    --- Sweep

/// Close every open auction past its close time and settle outstanding
/// transfers. Per-auction failures are logged and retried on the next
/// invocation; they never abort the sweep for other auctions.
pub async fn sweep(
    store: &dyn EntityStore,
    now: DateTime<Utc>,
) -> Result<Vec<ClosureOutcome>, StoreError> {
    let due = store.open_auctions_due(now).await?;
    if !due.is_empty() {
        info!("{:<12} --> {} auction(s) due for closing", "Sweep", due.len());
    }

    let mut outcomes = Vec::new();
    for versioned in due {
        let auction_id = versioned.entity.id;
        match close_one(store, versioned, now).await {
            Ok(Some(outcome)) => outcomes.push(outcome),
            // already closed by a concurrent sweep
            Ok(None) => {}
            Err(e) => {
                error!(
                    "{:<12} --> failed to close auction {}: {}, will retry next sweep",
                    "Sweep", auction_id, e
                );
            }
        }
    }

    for versioned in store.unsettled_auctions().await? {
        let auction_id = versioned.entity.id;
        if let Err(e) = settle_one(store, &versioned).await {
            error!(
                "{:<12} --> failed to settle auction {}: {}, will retry next sweep",
                "Sweep", auction_id, e
            );
        }
    }

    Ok(outcomes)
}

/// Transition one auction to closed, determining the winner by amount
/// comparison only (admission forbids ties, arrival order is irrelevant).
async fn close_one(
    store: &dyn EntityStore,
    mut current: Versioned<Auction>,
    now: DateTime<Utc>,
) -> Result<Option<ClosureOutcome>, SweepError> {
    for _ in 0..MAX_CLOSE_RETRIES {
        if current.entity.status == AuctionStatus::Closed {
            return Ok(None);
        }

        let bids = store.bids_for_auction(current.entity.id).await?;
        let winning = bids.iter().max_by_key(|b| b.amount);

        let mut closed = current.entity.clone();
        closed.status = AuctionStatus::Closed;
        closed.closed_at = Some(now);
        match winning {
            Some(bid) => {
                closed.winner_id = Some(bid.bidder_id);
                closed.winning_amount = Some(bid.amount);
                closed.settled = false;
            }
            // nothing to transfer, the closure is final as-is
            None => closed.settled = true,
        }

        match store.replace_auction(&closed, current.version).await {
            Ok(_) => {
                info!(
                    "{:<12} --> auction {} closed, winner: {:?}, amount: {:?}",
                    "Sweep", closed.id, closed.winner_id, closed.winning_amount
                );
                return Ok(Some(ClosureOutcome {
                    auction_id: closed.id,
                    winner_id: closed.winner_id,
                    winning_amount: closed.winning_amount,
                }));
            }
            Err(StoreError::VersionConflict) => {
                // either another sweep closed it or a late bid landed;
                // re-read and decide again
                match store.get_auction(current.entity.id).await? {
                    Some(fresh) => current = fresh,
                    None => return Ok(None),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(SweepError::Contention(MAX_CLOSE_RETRIES))
}

/// Drive the ownership transfer for a closed auction and mark it settled.
async fn settle_one(
    store: &dyn EntityStore,
    versioned: &Versioned<Auction>,
) -> Result<(), SweepError> {
    let auction = &versioned.entity;
    let Some(winner_id) = auction.winner_id else {
        return Ok(());
    };

    transfer::transfer(store, auction.set_id, auction.seller_id, winner_id).await?;

    let mut settled = auction.clone();
    settled.settled = true;
    match store.replace_auction(&settled, versioned.version).await {
        Ok(_) => {
            info!("{:<12} --> auction {} settled", "Sweep", auction.id);
            Ok(())
        }
        // a concurrent sweep settled it first; the transfer is idempotent
        Err(StoreError::VersionConflict) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// endregion: --- Sweep
