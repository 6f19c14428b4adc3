/// Error types for the auction core, one enum per seam.
use std::fmt;

use crate::store::StoreError;

// region:    --- Bid Admission

/// Rejections and failures surfaced by the bid admission engine.
///
/// `AuctionNotFound`, `BidderNotFound`, `AuctionClosed`, `SellerBid` and
/// `BidTooLow` are terminal for the request; `Contention` and `Store` are
/// retryable by the caller.
#[derive(Debug, thiserror::Error)]
pub enum BidError {
    #[error("auction {0} not found")]
    AuctionNotFound(i64),

    #[error("bidder account {0} not found")]
    BidderNotFound(i64),

    #[error("auction {0} is closed")]
    AuctionClosed(i64),

    #[error("seller cannot bid on their own auction")]
    SellerBid,

    #[error("bid of {amount} is below the required minimum of {minimum}")]
    BidTooLow { amount: i64, minimum: i64 },

    #[error("bid lost {0} consecutive version races, try again")]
    Contention(u32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BidError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            BidError::AuctionNotFound(_) => "AUCTION_NOT_FOUND",
            BidError::BidderNotFound(_) => "BIDDER_NOT_FOUND",
            BidError::AuctionClosed(_) => "AUCTION_CLOSED",
            BidError::SellerBid => "SELLER_BID",
            BidError::BidTooLow { .. } => "BID_TOO_LOW",
            BidError::Contention(_) => "CONTENTION",
            BidError::Store(_) => "STORE_UNAVAILABLE",
        }
    }
}

// endregion: --- Bid Admission

// region:    --- Ownership Transfer

/// The three fixed steps of an ownership transfer, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    AssignOwner,
    ReleaseFromSeller,
    GrantToWinner,
}

impl fmt::Display for TransferStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransferStep::AssignOwner => "assign-owner",
            TransferStep::ReleaseFromSeller => "release-from-seller",
            TransferStep::GrantToWinner => "grant-to-winner",
        };
        f.write_str(s)
    }
}

/// Failures of the ownership transfer coordinator. A `Partial` failure is
/// never rolled back; the whole idempotent sequence is re-driven by a later
/// sweep until it converges.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("collectible set {0} not found")]
    SetNotFound(i64),

    #[error("account {0} not found")]
    AccountNotFound(i64),

    #[error("transfer stalled at step {step}: {source}")]
    Partial {
        step: TransferStep,
        source: StoreError,
    },
}

// endregion: --- Ownership Transfer

// region:    --- Sweep

/// Per-auction failures inside a sweep. These never abort the sweep for
/// other auctions; the failed auction is retried on the next invocation.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("closure lost {0} consecutive version races")]
    Contention(u32),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

// endregion: --- Sweep
