use chrono::{DateTime, Duration, Utc};

use setbid::bidding::{self, PlaceBidCommand};
use setbid::closer;
use setbid::error::BidError;
use setbid::models::{AuctionStatus, Bid, NewAccount, NewAuction, NewCollectibleSet};
use setbid::store::memory::FailPoint;
use setbid::store::{EntityStore, MemoryStore};

fn init_tracing() {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .without_time()
        .with_target(false)
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn create_account(store: &MemoryStore, nickname: &str) -> i64 {
    store
        .create_account(NewAccount {
            nickname: nickname.to_string(),
        })
        .await
        .unwrap()
        .entity
        .id
}

/// Create a set owned by `owner_id` and record it in their holdings.
async fn create_owned_set(store: &MemoryStore, owner_id: i64) -> i64 {
    let set = store
        .create_set(NewCollectibleSet {
            name: "modular townhouse".to_string(),
            owner_id: Some(owner_id),
        })
        .await
        .unwrap();

    let owner = store.get_account(owner_id).await.unwrap().unwrap();
    let mut account = owner.entity;
    account.owned_set_ids.push(set.entity.id);
    store
        .replace_account(&account, owner.version)
        .await
        .unwrap();

    set.entity.id
}

async fn open_auction(
    store: &MemoryStore,
    set_id: i64,
    seller_id: i64,
    base_price: i64,
    close_time: DateTime<Utc>,
) -> i64 {
    store
        .create_auction(NewAuction {
            set_id,
            seller_id,
            base_price,
            close_time,
            created_at: Utc::now(),
        })
        .await
        .unwrap()
        .entity
        .id
}

async fn bid(
    store: &MemoryStore,
    auction_id: i64,
    bidder_id: i64,
    amount: i64,
) -> Result<Bid, BidError> {
    let cmd = PlaceBidCommand {
        auction_id,
        bidder_id,
        amount,
    };
    bidding::place_bid(store, &cmd, Utc::now()).await
}

#[tokio::test]
async fn first_bid_below_base_price_is_rejected() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let bidder = create_account(&store, "bidder").await;
    let set_id = create_owned_set(&store, seller).await;
    // base price 100.00
    let auction_id = open_auction(&store, set_id, seller, 10_000, Utc::now() + Duration::hours(1)).await;

    // 99.99 does not meet the base
    let err = bid(&store, auction_id, bidder, 9_999).await.unwrap_err();
    assert!(matches!(
        err,
        BidError::BidTooLow {
            amount: 9_999,
            minimum: 10_000
        }
    ));

    // meeting the base exactly is enough for the first bid
    let accepted = bid(&store, auction_id, bidder, 10_000).await.unwrap();
    assert_eq!(accepted.amount, 10_000);
}

#[tokio::test]
async fn accepted_amounts_strictly_increase_and_ties_lose() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let alice = create_account(&store, "alice").await;
    let bob = create_account(&store, "bob").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 5_000, Utc::now() + Duration::hours(1)).await;

    bid(&store, auction_id, alice, 6_000).await.unwrap();

    // lower than the current maximum
    let err = bid(&store, auction_id, bob, 5_500).await.unwrap_err();
    assert!(matches!(err, BidError::BidTooLow { minimum: 6_001, .. }));

    // equal bids lose
    let err = bid(&store, auction_id, bob, 6_000).await.unwrap_err();
    assert!(matches!(err, BidError::BidTooLow { .. }));

    bid(&store, auction_id, bob, 8_000).await.unwrap();

    let bids = store.bids_for_auction(auction_id).await.unwrap();
    let mut amounts: Vec<i64> = bids.iter().map(|b| b.amount).collect();
    amounts.sort_unstable();
    assert_eq!(amounts, vec![6_000, 8_000]);
}

#[tokio::test]
async fn unknown_auction_and_bidder_are_rejected() {
    let store = MemoryStore::new();
    let bidder = create_account(&store, "bidder").await;

    let err = bid(&store, 404, bidder, 10_000).await.unwrap_err();
    assert!(matches!(err, BidError::AuctionNotFound(404)));

    let seller = create_account(&store, "seller").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 5_000, Utc::now() + Duration::hours(1)).await;

    let err = bid(&store, auction_id, 404, 10_000).await.unwrap_err();
    assert!(matches!(err, BidError::BidderNotFound(404)));
}

#[tokio::test]
async fn seller_cannot_bid_on_their_own_auction() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 5_000, Utc::now() + Duration::hours(1)).await;

    let err = bid(&store, auction_id, seller, 9_000).await.unwrap_err();
    assert!(matches!(err, BidError::SellerBid));
}

#[tokio::test]
async fn late_bid_is_honored_until_closure_commits() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let bidder = create_account(&store, "bidder").await;
    let set_id = create_owned_set(&store, seller).await;
    // close time already in the past, but no sweep has run yet
    let auction_id = open_auction(&store, set_id, seller, 5_000, Utc::now() - Duration::minutes(5)).await;

    // enforcement is state-based, so the late bid is accepted
    let accepted = bid(&store, auction_id, bidder, 7_500).await.unwrap();
    assert_eq!(accepted.amount, 7_500);

    let outcomes = closer::sweep(&store, Utc::now()).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].winner_id, Some(bidder));

    // once the closure is durably committed, any bid loses
    let err = bid(&store, auction_id, bidder, 1_000_000).await.unwrap_err();
    assert!(matches!(err, BidError::AuctionClosed(_)));
}

#[tokio::test]
async fn end_to_end_lifecycle_transfers_ownership_exactly_once() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let alice = create_account(&store, "alice").await;
    let bob = create_account(&store, "bob").await;
    let set_id = create_owned_set(&store, seller).await;
    let close_time = Utc::now() + Duration::seconds(1);
    let auction_id = open_auction(&store, set_id, seller, 5_000, close_time).await;

    assert!(matches!(
        bid(&store, auction_id, alice, 3_000).await.unwrap_err(),
        BidError::BidTooLow { .. }
    ));
    bid(&store, auction_id, alice, 6_000).await.unwrap();
    assert!(matches!(
        bid(&store, auction_id, bob, 5_500).await.unwrap_err(),
        BidError::BidTooLow { .. }
    ));
    bid(&store, auction_id, bob, 8_000).await.unwrap();

    let outcomes = closer::sweep(&store, close_time + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].auction_id, auction_id);
    assert_eq!(outcomes[0].winner_id, Some(bob));
    assert_eq!(outcomes[0].winning_amount, Some(8_000));

    let auction = store.get_auction(auction_id).await.unwrap().unwrap().entity;
    assert_eq!(auction.status, AuctionStatus::Closed);
    assert_eq!(auction.winner_id, Some(bob));
    assert_eq!(auction.winning_amount, Some(8_000));
    assert!(auction.closed_at.is_some());
    assert!(auction.settled);

    let set = store.get_set(set_id).await.unwrap().unwrap().entity;
    assert_eq!(set.owner_id, Some(bob));

    let seller_acc = store.get_account(seller).await.unwrap().unwrap().entity;
    assert!(!seller_acc.owned_set_ids.contains(&set_id));

    let bob_acc = store.get_account(bob).await.unwrap().unwrap().entity;
    assert_eq!(
        bob_acc.owned_set_ids.iter().filter(|id| **id == set_id).count(),
        1
    );
}

#[tokio::test]
async fn repeated_sweep_performs_zero_additional_mutations() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let bidder = create_account(&store, "bidder").await;
    let set_id = create_owned_set(&store, seller).await;
    let close_time = Utc::now() - Duration::minutes(1);
    let auction_id = open_auction(&store, set_id, seller, 5_000, close_time).await;
    bid(&store, auction_id, bidder, 6_000).await.unwrap();

    let first = closer::sweep(&store, Utc::now()).await.unwrap();
    assert_eq!(first.len(), 1);

    // versions are bumped on every write, so unchanged versions mean the
    // second sweep wrote nothing
    let auction_v = store.get_auction(auction_id).await.unwrap().unwrap().version;
    let set_v = store.get_set(set_id).await.unwrap().unwrap().version;
    let seller_v = store.get_account(seller).await.unwrap().unwrap().version;
    let bidder_v = store.get_account(bidder).await.unwrap().unwrap().version;

    let second = closer::sweep(&store, Utc::now()).await.unwrap();
    assert!(second.is_empty());

    assert_eq!(
        store.get_auction(auction_id).await.unwrap().unwrap().version,
        auction_v
    );
    assert_eq!(store.get_set(set_id).await.unwrap().unwrap().version, set_v);
    assert_eq!(
        store.get_account(seller).await.unwrap().unwrap().version,
        seller_v
    );
    assert_eq!(
        store.get_account(bidder).await.unwrap().unwrap().version,
        bidder_v
    );
}

#[tokio::test]
async fn zero_bid_auction_closes_without_winner_or_transfer() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 5_000, Utc::now() - Duration::minutes(1)).await;

    let outcomes = closer::sweep(&store, Utc::now()).await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].winner_id, None);
    assert_eq!(outcomes[0].winning_amount, None);

    let auction = store.get_auction(auction_id).await.unwrap().unwrap().entity;
    assert_eq!(auction.status, AuctionStatus::Closed);
    assert_eq!(auction.winner_id, None);
    assert_eq!(auction.winning_amount, None);
    assert!(auction.settled);

    // the set never moved
    let set = store.get_set(set_id).await.unwrap().unwrap().entity;
    assert_eq!(set.owner_id, Some(seller));
    let seller_acc = store.get_account(seller).await.unwrap().unwrap().entity;
    assert!(seller_acc.owned_set_ids.contains(&set_id));
}

#[tokio::test]
async fn partial_transfer_failure_converges_on_the_next_sweep() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let bidder = create_account(&store, "bidder").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 5_000, Utc::now() - Duration::minutes(1)).await;
    bid(&store, auction_id, bidder, 6_000).await.unwrap();

    // the first account write of the transfer (release from seller) fails
    store.inject_failures(FailPoint::ReplaceAccount, 1).await;

    let outcomes = closer::sweep(&store, Utc::now()).await.unwrap();
    assert_eq!(outcomes.len(), 1);

    // closure committed, transfer stalled mid-way
    let auction = store.get_auction(auction_id).await.unwrap().unwrap().entity;
    assert_eq!(auction.status, AuctionStatus::Closed);
    assert!(!auction.settled);
    let set = store.get_set(set_id).await.unwrap().unwrap().entity;
    assert_eq!(set.owner_id, Some(bidder));
    let seller_acc = store.get_account(seller).await.unwrap().unwrap().entity;
    assert!(seller_acc.owned_set_ids.contains(&set_id));

    // next sweep re-drives the idempotent transfer to completion
    let outcomes = closer::sweep(&store, Utc::now()).await.unwrap();
    assert!(outcomes.is_empty());

    let auction = store.get_auction(auction_id).await.unwrap().unwrap().entity;
    assert!(auction.settled);
    let seller_acc = store.get_account(seller).await.unwrap().unwrap().entity;
    assert!(!seller_acc.owned_set_ids.contains(&set_id));
    let bidder_acc = store.get_account(bidder).await.unwrap().unwrap().entity;
    assert_eq!(
        bidder_acc.owned_set_ids.iter().filter(|id| **id == set_id).count(),
        1
    );
}

#[tokio::test]
async fn concurrent_distinct_bids_preserve_strict_ordering() {
    init_tracing();

    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 10_000, Utc::now() + Duration::hours(1)).await;

    let mut bidders = Vec::new();
    for i in 1..=50 {
        bidders.push(create_account(&store, &format!("bidder-{i}")).await);
    }

    let mut handles = Vec::new();
    for (i, bidder_id) in bidders.iter().enumerate() {
        let store = store.clone();
        let bidder_id = *bidder_id;
        let amount = 10_000 + (i as i64 + 1) * 1_000;
        handles.push(tokio::spawn(async move {
            bid(&store, auction_id, bidder_id, amount).await
        }));
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(BidError::BidTooLow { .. }) => rejected += 1,
            Err(e) => panic!("unexpected rejection: {e}"),
        }
    }
    assert!(accepted >= 1);
    assert_eq!(accepted + rejected, 50);

    // in creation order, accepted amounts must be strictly increasing
    let mut bids = store.bids_for_auction(auction_id).await.unwrap();
    bids.sort_by_key(|b| b.id);
    for pair in bids.windows(2) {
        assert!(
            pair[1].amount > pair[0].amount,
            "bid {} ({}) did not strictly beat bid {} ({})",
            pair[1].id,
            pair[1].amount,
            pair[0].id,
            pair[0].amount
        );
    }

    // the winner is the maximum-amount bid, by value comparison
    let top = bids.iter().max_by_key(|b| b.amount).unwrap().clone();
    let outcomes = closer::sweep(&store, Utc::now() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].winner_id, Some(top.bidder_id));
    assert_eq!(outcomes[0].winning_amount, Some(top.amount));
}

#[tokio::test]
async fn equal_concurrent_bids_admit_exactly_one() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let set_id = create_owned_set(&store, seller).await;
    let auction_id = open_auction(&store, set_id, seller, 10_000, Utc::now() + Duration::hours(1)).await;

    let mut bidders = Vec::new();
    for i in 1..=20 {
        bidders.push(create_account(&store, &format!("bidder-{i}")).await);
    }

    let mut handles = Vec::new();
    for bidder_id in bidders {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            bid(&store, auction_id, bidder_id, 15_000).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(BidError::BidTooLow { .. }) => {}
            Err(e) => panic!("unexpected rejection: {e}"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(store.bids_for_auction(auction_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn overlapping_sweeps_close_each_auction_once() {
    let store = MemoryStore::new();
    let seller = create_account(&store, "seller").await;
    let bidder = create_account(&store, "bidder").await;

    let mut auction_ids = Vec::new();
    for _ in 0..5 {
        let set_id = create_owned_set(&store, seller).await;
        let auction_id =
            open_auction(&store, set_id, seller, 5_000, Utc::now() - Duration::minutes(1)).await;
        bid(&store, auction_id, bidder, 6_000).await.unwrap();
        auction_ids.push(auction_id);
    }

    let now = Utc::now();
    let (a, b) = tokio::join!(closer::sweep(&store, now), closer::sweep(&store, now));
    let (a, b) = (a.unwrap(), b.unwrap());

    // every auction closed by exactly one of the overlapping sweeps
    assert_eq!(a.len() + b.len(), auction_ids.len());
    for auction_id in auction_ids {
        let auction = store.get_auction(auction_id).await.unwrap().unwrap().entity;
        assert_eq!(auction.status, AuctionStatus::Closed);
        assert_eq!(auction.winner_id, Some(bidder));
    }
}
