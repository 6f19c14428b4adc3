/// In-memory entity store with the same conditional-write semantics as the
/// Postgres store. Used as the injected test double and for local
/// development without a database.
// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::{
    Account, Auction, AuctionStatus, Bid, CollectibleSet, NewAccount, NewAuction, NewBid,
    NewCollectibleSet,
};
use crate::store::{EntityStore, StoreError, StoreResult, Version, Versioned};
// endregion: --- Imports

// region:    --- Failure Injection

/// Write operations that can be made to fail, for exercising partial-failure
/// and retry paths in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    ReplaceSet,
    ReplaceAccount,
}

// endregion: --- Failure Injection

#[derive(Default)]
struct Collections {
    auctions: HashMap<i64, Versioned<Auction>>,
    bids: HashMap<i64, Bid>,
    sets: HashMap<i64, Versioned<CollectibleSet>>,
    accounts: HashMap<i64, Versioned<Account>>,
    next_id: i64,
    failures: HashMap<FailPoint, u32>,
}

impl Collections {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Consume one injected failure for the given point, if any.
    fn take_failure(&mut self, point: FailPoint) -> bool {
        match self.failures.get_mut(&point) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Shared in-memory store; clones see the same state, mirroring multiple
/// callers hitting one backend.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes at `point` fail with a transient error.
    pub async fn inject_failures(&self, point: FailPoint, count: u32) {
        let mut inner = self.inner.lock().await;
        *inner.failures.entry(point).or_insert(0) += count;
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_auction(&self, new: NewAuction) -> StoreResult<Versioned<Auction>> {
        let mut inner = self.inner.lock().await;
        let id = inner.alloc_id();
        let versioned = Versioned {
            entity: Auction {
                id,
                set_id: new.set_id,
                seller_id: new.seller_id,
                base_price: new.base_price,
                close_time: new.close_time,
                status: AuctionStatus::Open,
                winner_id: None,
                winning_amount: None,
                closed_at: None,
                settled: false,
                created_at: new.created_at,
            },
            version: 1,
        };
        inner.auctions.insert(id, versioned.clone());
        Ok(versioned)
    }

    async fn get_auction(&self, id: i64) -> StoreResult<Option<Versioned<Auction>>> {
        let inner = self.inner.lock().await;
        Ok(inner.auctions.get(&id).cloned())
    }

    async fn replace_auction(
        &self,
        auction: &Auction,
        expected: Version,
    ) -> StoreResult<Versioned<Auction>> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .auctions
            .get_mut(&auction.id)
            .ok_or_else(|| StoreError::Unavailable(format!("auction {} missing", auction.id)))?;
        if current.version != expected {
            return Err(StoreError::VersionConflict);
        }
        current.entity = auction.clone();
        current.version += 1;
        Ok(current.clone())
    }

    async fn list_auctions(&self) -> StoreResult<Vec<Auction>> {
        let inner = self.inner.lock().await;
        let mut auctions: Vec<Auction> =
            inner.auctions.values().map(|v| v.entity.clone()).collect();
        auctions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(auctions)
    }

    async fn open_auctions_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Versioned<Auction>>> {
        let inner = self.inner.lock().await;
        let mut due: Vec<Versioned<Auction>> = inner
            .auctions
            .values()
            .filter(|v| v.entity.status == AuctionStatus::Open && v.entity.close_time <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.entity.close_time.cmp(&b.entity.close_time));
        Ok(due)
    }

    async fn unsettled_auctions(&self) -> StoreResult<Vec<Versioned<Auction>>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .auctions
            .values()
            .filter(|v| {
                v.entity.status == AuctionStatus::Closed
                    && !v.entity.settled
                    && v.entity.winner_id.is_some()
            })
            .cloned()
            .collect())
    }

    async fn append_bid(
        &self,
        new: NewBid,
        expected_auction_version: Version,
    ) -> StoreResult<Bid> {
        let mut inner = self.inner.lock().await;
        // version check, bump and insert under one lock, like the single
        // SQL statement in the Postgres store
        {
            let auction = inner.auctions.get_mut(&new.auction_id).ok_or_else(|| {
                StoreError::Unavailable(format!("auction {} missing", new.auction_id))
            })?;
            if auction.version != expected_auction_version
                || auction.entity.status != AuctionStatus::Open
            {
                return Err(StoreError::VersionConflict);
            }
            auction.version += 1;
        }

        let id = inner.alloc_id();
        let bid = Bid {
            id,
            auction_id: new.auction_id,
            bidder_id: new.bidder_id,
            amount: new.amount,
            created_at: new.created_at,
        };
        inner.bids.insert(id, bid.clone());
        Ok(bid)
    }

    async fn bids_for_auction(&self, auction_id: i64) -> StoreResult<Vec<Bid>> {
        let inner = self.inner.lock().await;
        let mut bids: Vec<Bid> = inner
            .bids
            .values()
            .filter(|b| b.auction_id == auction_id)
            .cloned()
            .collect();
        bids.sort_by(|a, b| b.amount.cmp(&a.amount));
        Ok(bids)
    }

    async fn create_set(&self, new: NewCollectibleSet) -> StoreResult<Versioned<CollectibleSet>> {
        let mut inner = self.inner.lock().await;
        let id = inner.alloc_id();
        let versioned = Versioned {
            entity: CollectibleSet {
                id,
                name: new.name,
                owner_id: new.owner_id,
            },
            version: 1,
        };
        inner.sets.insert(id, versioned.clone());
        Ok(versioned)
    }

    async fn get_set(&self, id: i64) -> StoreResult<Option<Versioned<CollectibleSet>>> {
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(&id).cloned())
    }

    async fn replace_set(
        &self,
        set: &CollectibleSet,
        expected: Version,
    ) -> StoreResult<Versioned<CollectibleSet>> {
        let mut inner = self.inner.lock().await;
        if inner.take_failure(FailPoint::ReplaceSet) {
            return Err(StoreError::Unavailable("injected set write failure".into()));
        }
        let current = inner
            .sets
            .get_mut(&set.id)
            .ok_or_else(|| StoreError::Unavailable(format!("set {} missing", set.id)))?;
        if current.version != expected {
            return Err(StoreError::VersionConflict);
        }
        current.entity = set.clone();
        current.version += 1;
        Ok(current.clone())
    }

    async fn create_account(&self, new: NewAccount) -> StoreResult<Versioned<Account>> {
        let mut inner = self.inner.lock().await;
        let id = inner.alloc_id();
        let versioned = Versioned {
            entity: Account {
                id,
                nickname: new.nickname,
                owned_set_ids: Vec::new(),
            },
            version: 1,
        };
        inner.accounts.insert(id, versioned.clone());
        Ok(versioned)
    }

    async fn get_account(&self, id: i64) -> StoreResult<Option<Versioned<Account>>> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(&id).cloned())
    }

    async fn replace_account(
        &self,
        account: &Account,
        expected: Version,
    ) -> StoreResult<Versioned<Account>> {
        let mut inner = self.inner.lock().await;
        if inner.take_failure(FailPoint::ReplaceAccount) {
            return Err(StoreError::Unavailable(
                "injected account write failure".into(),
            ));
        }
        let current = inner
            .accounts
            .get_mut(&account.id)
            .ok_or_else(|| StoreError::Unavailable(format!("account {} missing", account.id)))?;
        if current.version != expected {
            return Err(StoreError::VersionConflict);
        }
        current.entity = account.clone();
        current.version += 1;
        Ok(current.clone())
    }
}

// region:    --- Tests


// endregion: --- Tests
