/// Entity store adapter: typed operations against the four logical
/// collections (auctions, bids, sets, accounts), each carrying an
/// optimistic-concurrency version token.
///
/// The store is the only shared mutable resource in the system. All writes
/// that follow a read are conditional on the version observed by that read;
/// no in-process locks are assumed since multiple service instances may run
/// concurrently against the same backend.
// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    Account, Auction, Bid, CollectibleSet, NewAccount, NewAuction, NewBid, NewCollectibleSet,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgEntityStore;
// endregion: --- Imports

// region:    --- Versioning

/// Opaque optimistic-concurrency token. Bumped by every successful replace.
pub type Version = i64;

/// An entity together with the version token it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub entity: T,
    pub version: Version,
}

// endregion: --- Versioning

// region:    --- Errors

/// Store-level failures.
///
/// `VersionConflict` means a concurrent write won the race; callers retry
/// their read-check-write cycle a bounded number of times. `Unavailable` is
/// transient (timeout, connectivity) and also retryable.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: a concurrent write won the race")]
    VersionConflict,

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// endregion: --- Errors

// region:    --- EntityStore Trait

/// Typed read/create/conditional-replace operations per collection.
///
/// Reads return `None` for absent ids; conditional replaces return the
/// freshly versioned entity or `StoreError::VersionConflict` when the
/// expected version no longer matches.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // -- Auctions
    async fn create_auction(&self, new: NewAuction) -> StoreResult<Versioned<Auction>>;
    async fn get_auction(&self, id: i64) -> StoreResult<Option<Versioned<Auction>>>;
    async fn replace_auction(
        &self,
        auction: &Auction,
        expected: Version,
    ) -> StoreResult<Versioned<Auction>>;
    async fn list_auctions(&self) -> StoreResult<Vec<Auction>>;
    /// Open auctions whose close time has passed.
    async fn open_auctions_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Versioned<Auction>>>;
    /// Closed auctions with a winner whose ownership transfer has not
    /// completed yet.
    async fn unsettled_auctions(&self) -> StoreResult<Vec<Versioned<Auction>>>;

    // -- Bids
    /// Create a bid, conditioned on the auction still being open at the
    /// expected version. The version check and the insert are atomic, so a
    /// reader can never observe the admission half-done.
    async fn append_bid(&self, new: NewBid, expected_auction_version: Version)
        -> StoreResult<Bid>;
    async fn bids_for_auction(&self, auction_id: i64) -> StoreResult<Vec<Bid>>;

    // -- Collectible sets
    async fn create_set(&self, new: NewCollectibleSet) -> StoreResult<Versioned<CollectibleSet>>;
    async fn get_set(&self, id: i64) -> StoreResult<Option<Versioned<CollectibleSet>>>;
    async fn replace_set(
        &self,
        set: &CollectibleSet,
        expected: Version,
    ) -> StoreResult<Versioned<CollectibleSet>>;

    // -- Accounts
    async fn create_account(&self, new: NewAccount) -> StoreResult<Versioned<Account>>;
    async fn get_account(&self, id: i64) -> StoreResult<Option<Versioned<Account>>>;
    async fn replace_account(
        &self,
        account: &Account,
        expected: Version,
    ) -> StoreResult<Versioned<Account>>;
}

// endregion: --- EntityStore Trait
