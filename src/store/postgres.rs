/// Postgres-backed entity store. Every table carries a `version BIGINT`
/// column; a conditional replace is an `UPDATE ... WHERE id = $n AND
/// version = $m` that bumps the version, with zero affected rows surfaced
/// as `StoreError::VersionConflict`.
// region:    --- Imports
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::models::{
    Account, Auction, AuctionStatus, Bid, CollectibleSet, NewAccount, NewAuction, NewBid,
    NewCollectibleSet,
};
use crate::store::{EntityStore, StoreError, StoreResult, Version, Versioned};
// endregion: --- Imports

// region:    --- Queries

const CREATE_AUCTION: &str = r#"
    INSERT INTO auctions (set_id, seller_id, base_price, close_time, status, settled, created_at, version)
    VALUES ($1, $2, $3, $4, 'open', FALSE, $5, 1)
    RETURNING *
"#;

const GET_AUCTION: &str = "SELECT * FROM auctions WHERE id = $1";

const REPLACE_AUCTION: &str = r#"
    UPDATE auctions
    SET base_price = $2, close_time = $3, status = $4, winner_id = $5,
        winning_amount = $6, closed_at = $7, settled = $8, version = version + 1
    WHERE id = $1 AND version = $9
    RETURNING *
"#;

const LIST_AUCTIONS: &str = "SELECT * FROM auctions ORDER BY created_at DESC";

const OPEN_AUCTIONS_DUE: &str = r#"
    SELECT * FROM auctions
    WHERE status = 'open' AND close_time <= $1
    ORDER BY close_time
"#;

const UNSETTLED_AUCTIONS: &str = r#"
    SELECT * FROM auctions
    WHERE status = 'closed' AND settled = FALSE AND winner_id IS NOT NULL
    ORDER BY closed_at
"#;

// Bumping the auction version and inserting the bid in one statement keeps
// the admission atomic: zero rows back means the condition no longer held.
const APPEND_BID: &str = r#"
    WITH admitted AS (
        UPDATE auctions SET version = version + 1
        WHERE id = $1 AND version = $2 AND status = 'open'
        RETURNING id
    )
    INSERT INTO bids (auction_id, bidder_id, amount, created_at)
    SELECT id, $3, $4, $5 FROM admitted
    RETURNING *
"#;

const BIDS_FOR_AUCTION: &str = r#"
    SELECT * FROM bids WHERE auction_id = $1 ORDER BY amount DESC
"#;

const CREATE_SET: &str = r#"
    INSERT INTO sets (name, owner_id, version) VALUES ($1, $2, 1) RETURNING *
"#;

const GET_SET: &str = "SELECT * FROM sets WHERE id = $1";

const REPLACE_SET: &str = r#"
    UPDATE sets SET name = $2, owner_id = $3, version = version + 1
    WHERE id = $1 AND version = $4
    RETURNING *
"#;

const CREATE_ACCOUNT: &str = r#"
    INSERT INTO accounts (nickname, owned_set_ids, version) VALUES ($1, '{}', 1) RETURNING *
"#;

const GET_ACCOUNT: &str = "SELECT * FROM accounts WHERE id = $1";

const REPLACE_ACCOUNT: &str = r#"
    UPDATE accounts SET nickname = $2, owned_set_ids = $3, version = version + 1
    WHERE id = $1 AND version = $4
    RETURNING *
"#;

// endregion: --- Queries

// region:    --- Rows

#[derive(sqlx::FromRow)]
struct AuctionRow {
    id: i64,
    set_id: i64,
    seller_id: i64,
    base_price: i64,
    close_time: DateTime<Utc>,
    status: String,
    winner_id: Option<i64>,
    winning_amount: Option<i64>,
    closed_at: Option<DateTime<Utc>>,
    settled: bool,
    created_at: DateTime<Utc>,
    version: i64,
}

impl AuctionRow {
    fn into_versioned(self) -> StoreResult<Versioned<Auction>> {
        let status = AuctionStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Unavailable(format!("unexpected auction status {:?}", self.status))
        })?;
        Ok(Versioned {
            entity: Auction {
                id: self.id,
                set_id: self.set_id,
                seller_id: self.seller_id,
                base_price: self.base_price,
                close_time: self.close_time,
                status,
                winner_id: self.winner_id,
                winning_amount: self.winning_amount,
                closed_at: self.closed_at,
                settled: self.settled,
                created_at: self.created_at,
            },
            version: self.version,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SetRow {
    id: i64,
    name: String,
    owner_id: Option<i64>,
    version: i64,
}

impl SetRow {
    fn into_versioned(self) -> Versioned<CollectibleSet> {
        Versioned {
            entity: CollectibleSet {
                id: self.id,
                name: self.name,
                owner_id: self.owner_id,
            },
            version: self.version,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    nickname: String,
    owned_set_ids: Vec<i64>,
    version: i64,
}

impl AccountRow {
    fn into_versioned(self) -> Versioned<Account> {
        Versioned {
            entity: Account {
                id: self.id,
                nickname: self.nickname,
                owned_set_ids: self.owned_set_ids,
            },
            version: self.version,
        }
    }
}

// endregion: --- Rows

// region:    --- PgEntityStore

pub struct PgEntityStore {
    pool: Arc<PgPool>,
}

impl PgEntityStore {
    /// Connect with a small pool and bounded acquire timeout.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Apply the schema files. Statements use IF NOT EXISTS so this is safe
    /// on every startup.
    pub async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let schema_sql = include_str!("../sql/01-create-schema.sql");
        for query in schema_sql.split(';') {
            let query = query.trim();
            if !query.is_empty() {
                sqlx::query(query).execute(&*self.pool).await?;
            }
        }
        info!("{:<12} --> schema ready", "Store");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn create_auction(&self, new: NewAuction) -> StoreResult<Versioned<Auction>> {
        let row = sqlx::query_as::<_, AuctionRow>(CREATE_AUCTION)
            .bind(new.set_id)
            .bind(new.seller_id)
            .bind(new.base_price)
            .bind(new.close_time)
            .bind(new.created_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(unavailable)?;
        row.into_versioned()
    }

    async fn get_auction(&self, id: i64) -> StoreResult<Option<Versioned<Auction>>> {
        let row = sqlx::query_as::<_, AuctionRow>(GET_AUCTION)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        row.map(AuctionRow::into_versioned).transpose()
    }

    async fn replace_auction(
        &self,
        auction: &Auction,
        expected: Version,
    ) -> StoreResult<Versioned<Auction>> {
        let row = sqlx::query_as::<_, AuctionRow>(REPLACE_AUCTION)
            .bind(auction.id)
            .bind(auction.base_price)
            .bind(auction.close_time)
            .bind(auction.status.as_str())
            .bind(auction.winner_id)
            .bind(auction.winning_amount)
            .bind(auction.closed_at)
            .bind(auction.settled)
            .bind(expected)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        match row {
            Some(row) => row.into_versioned(),
            None => Err(StoreError::VersionConflict),
        }
    }

    async fn list_auctions(&self) -> StoreResult<Vec<Auction>> {
        let rows = sqlx::query_as::<_, AuctionRow>(LIST_AUCTIONS)
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;
        rows.into_iter()
            .map(|r| r.into_versioned().map(|v| v.entity))
            .collect()
    }

    async fn open_auctions_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<Versioned<Auction>>> {
        let rows = sqlx::query_as::<_, AuctionRow>(OPEN_AUCTIONS_DUE)
            .bind(now)
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;
        rows.into_iter().map(AuctionRow::into_versioned).collect()
    }

    async fn unsettled_auctions(&self) -> StoreResult<Vec<Versioned<Auction>>> {
        let rows = sqlx::query_as::<_, AuctionRow>(UNSETTLED_AUCTIONS)
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)?;
        rows.into_iter().map(AuctionRow::into_versioned).collect()
    }

    async fn append_bid(
        &self,
        new: NewBid,
        expected_auction_version: Version,
    ) -> StoreResult<Bid> {
        let row = sqlx::query_as::<_, Bid>(APPEND_BID)
            .bind(new.auction_id)
            .bind(expected_auction_version)
            .bind(new.bidder_id)
            .bind(new.amount)
            .bind(new.created_at)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        row.ok_or(StoreError::VersionConflict)
    }

    async fn bids_for_auction(&self, auction_id: i64) -> StoreResult<Vec<Bid>> {
        sqlx::query_as::<_, Bid>(BIDS_FOR_AUCTION)
            .bind(auction_id)
            .fetch_all(&*self.pool)
            .await
            .map_err(unavailable)
    }

    async fn create_set(&self, new: NewCollectibleSet) -> StoreResult<Versioned<CollectibleSet>> {
        let row = sqlx::query_as::<_, SetRow>(CREATE_SET)
            .bind(&new.name)
            .bind(new.owner_id)
            .fetch_one(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.into_versioned())
    }

    async fn get_set(&self, id: i64) -> StoreResult<Option<Versioned<CollectibleSet>>> {
        let row = sqlx::query_as::<_, SetRow>(GET_SET)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.map(SetRow::into_versioned))
    }

    async fn replace_set(
        &self,
        set: &CollectibleSet,
        expected: Version,
    ) -> StoreResult<Versioned<CollectibleSet>> {
        let row = sqlx::query_as::<_, SetRow>(REPLACE_SET)
            .bind(set.id)
            .bind(&set.name)
            .bind(set.owner_id)
            .bind(expected)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        row.map(SetRow::into_versioned)
            .ok_or(StoreError::VersionConflict)
    }

    async fn create_account(&self, new: NewAccount) -> StoreResult<Versioned<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(CREATE_ACCOUNT)
            .bind(&new.nickname)
            .fetch_one(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.into_versioned())
    }

    async fn get_account(&self, id: i64) -> StoreResult<Option<Versioned<Account>>> {
        let row = sqlx::query_as::<_, AccountRow>(GET_ACCOUNT)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.map(AccountRow::into_versioned))
    }

    async fn replace_account(
        &self,
        account: &Account,
        expected: Version,
    ) -> StoreResult<Versioned<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(REPLACE_ACCOUNT)
            .bind(account.id)
            .bind(&account.nickname)
            .bind(&account.owned_set_ids)
            .bind(expected)
            .fetch_optional(&*self.pool)
            .await
            .map_err(unavailable)?;
        row.map(AccountRow::into_versioned)
            .ok_or(StoreError::VersionConflict)
    }
}

// endregion: --- PgEntityStore
