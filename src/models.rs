/// Domain entities for the auction marketplace.
/// All monetary amounts are i64 minor units (cents), all ids are i64.
// region:    --- Imports
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
// endregion: --- Imports

// region:    --- Auction

/// Auction lifecycle state. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Open,
    Closed,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuctionStatus::Open => "open",
            AuctionStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(AuctionStatus::Open),
            "closed" => Some(AuctionStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A timed auction for a single collectible set.
///
/// Invariant: `status == Open` exactly when `winner_id` and `closed_at` are
/// unset. `settled` becomes true once the ownership transfer for this
/// closure has completed (at close time for no-bid closures).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub set_id: i64,
    pub seller_id: i64,
    pub base_price: i64,
    pub close_time: DateTime<Utc>,
    pub status: AuctionStatus,
    pub winner_id: Option<i64>,
    pub winning_amount: Option<i64>,
    pub closed_at: Option<DateTime<Utc>>,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
}

/// Payload for creating an auction; the store assigns id and version and
/// opens the auction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuction {
    pub set_id: i64,
    pub seller_id: i64,
    pub base_price: i64,
    pub close_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Auction

// region:    --- Bid

/// An accepted bid. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBid {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

// endregion: --- Bid

// region:    --- CollectibleSet

/// A collectible set. `owner_id` is the only field this service mutates;
/// unset means the set is unowned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectibleSet {
    pub id: i64,
    pub name: String,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCollectibleSet {
    pub name: String,
    pub owner_id: Option<i64>,
}

// endregion: --- CollectibleSet

// region:    --- Account

/// A marketplace account. A set id appears in at most one account's
/// `owned_set_ids`, except during the transient window of a transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub nickname: String,
    pub owned_set_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub nickname: String,
}

// endregion: --- Account
