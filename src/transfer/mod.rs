/// Ownership transfer coordinator.
///
/// The store offers no cross-entity transaction, so a sale is three
/// independent conditional updates in a fixed order: assign the set's
/// owner, release it from the seller's holdings, grant it to the winner's
/// holdings. Every step is idempotent (assigning the same owner, removing
/// an absent id or adding a present id are no-ops), so the whole sequence
/// can be re-driven after a partial failure and converges.
// region:    --- Imports
use tracing::info;

use crate::error::{TransferError, TransferStep};
use crate::store::{EntityStore, StoreError};
// endregion: --- Imports

/// Conflict retries per step before reporting the transfer as stalled.
const MAX_STEP_RETRIES: u32 = 10;

// region:    --- Transfer

pub async fn transfer(
    store: &dyn EntityStore,
    set_id: i64,
    seller_id: i64,
    winner_id: i64,
) -> Result<(), TransferError> {
    info!(
        "{:<12} --> transferring set {} from {} to {}",
        "Transfer", set_id, seller_id, winner_id
    );

    assign_owner(store, set_id, winner_id).await?;
    release_holding(store, seller_id, set_id).await?;
    grant_holding(store, winner_id, set_id).await?;

    info!(
        "{:<12} --> set {} now owned by {}",
        "Transfer", set_id, winner_id
    );
    Ok(())
}

/// Step 1: point the set at its new owner.
async fn assign_owner(
    store: &dyn EntityStore,
    set_id: i64,
    winner_id: i64,
) -> Result<(), TransferError> {
    let step = TransferStep::AssignOwner;
    for _ in 0..MAX_STEP_RETRIES {
        let versioned = store
            .get_set(set_id)
            .await
            .map_err(|source| TransferError::Partial { step, source })?
            .ok_or(TransferError::SetNotFound(set_id))?;

        if versioned.entity.owner_id == Some(winner_id) {
            return Ok(());
        }

        let mut set = versioned.entity;
        set.owner_id = Some(winner_id);
        match store.replace_set(&set, versioned.version).await {
            Ok(_) => return Ok(()),
            Err(StoreError::VersionConflict) => continue,
            Err(source) => return Err(TransferError::Partial { step, source }),
        }
    }
    Err(TransferError::Partial {
        step,
        source: StoreError::VersionConflict,
    })
}

/// Step 2: drop the set from an account's holdings if present.
async fn release_holding(
    store: &dyn EntityStore,
    account_id: i64,
    set_id: i64,
) -> Result<(), TransferError> {
    let step = TransferStep::ReleaseFromSeller;
    for _ in 0..MAX_STEP_RETRIES {
        let versioned = store
            .get_account(account_id)
            .await
            .map_err(|source| TransferError::Partial { step, source })?
            .ok_or(TransferError::AccountNotFound(account_id))?;

        if !versioned.entity.owned_set_ids.contains(&set_id) {
            return Ok(());
        }

        let mut account = versioned.entity;
        account.owned_set_ids.retain(|id| *id != set_id);
        match store.replace_account(&account, versioned.version).await {
            Ok(_) => return Ok(()),
            Err(StoreError::VersionConflict) => continue,
            Err(source) => return Err(TransferError::Partial { step, source }),
        }
    }
    Err(TransferError::Partial {
        step,
        source: StoreError::VersionConflict,
    })
}

/// Step 3: add the set to the winner's holdings if absent.
async fn grant_holding(
    store: &dyn EntityStore,
    account_id: i64,
    set_id: i64,
) -> Result<(), TransferError> {
    let step = TransferStep::GrantToWinner;
    for _ in 0..MAX_STEP_RETRIES {
        let versioned = store
            .get_account(account_id)
            .await
            .map_err(|source| TransferError::Partial { step, source })?
            .ok_or(TransferError::AccountNotFound(account_id))?;

        if versioned.entity.owned_set_ids.contains(&set_id) {
            return Ok(());
        }

        let mut account = versioned.entity;
        account.owned_set_ids.push(set_id);
        match store.replace_account(&account, versioned.version).await {
            Ok(_) => return Ok(()),
            Err(StoreError::VersionConflict) => continue,
            Err(source) => return Err(TransferError::Partial { step, source }),
        }
    }
    Err(TransferError::Partial {
        step,
        source: StoreError::VersionConflict,
    })
}

// endregion: --- Transfer

// region:    --- Tests

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAccount, NewCollectibleSet};
    use crate::store::MemoryStore;

    async fn seed(store: &MemoryStore) -> (i64, i64, i64) {
        let seller = store
            .create_account(NewAccount {
                nickname: "seller".into(),
            })
            .await
            .unwrap();
        let winner = store
            .create_account(NewAccount {
                nickname: "winner".into(),
            })
            .await
            .unwrap();
        let set = store
            .create_set(NewCollectibleSet {
                name: "castle".into(),
                owner_id: Some(seller.entity.id),
            })
            .await
            .unwrap();

        let mut seller_acc = seller.entity.clone();
        seller_acc.owned_set_ids.push(set.entity.id);
        store
            .replace_account(&seller_acc, seller.version)
            .await
            .unwrap();

        (set.entity.id, seller.entity.id, winner.entity.id)
    }

    #[tokio::test]
    async fn transfer_moves_ownership_exactly_once() {
        let store = MemoryStore::new();
        let (set_id, seller_id, winner_id) = seed(&store).await;

        transfer(&store, set_id, seller_id, winner_id)
            .await
            .unwrap();

        let set = store.get_set(set_id).await.unwrap().unwrap();
        assert_eq!(set.entity.owner_id, Some(winner_id));

        let seller = store.get_account(seller_id).await.unwrap().unwrap();
        assert!(!seller.entity.owned_set_ids.contains(&set_id));

        let winner = store.get_account(winner_id).await.unwrap().unwrap();
        assert_eq!(
            winner
                .entity
                .owned_set_ids
                .iter()
                .filter(|id| **id == set_id)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn re_driving_a_completed_transfer_is_a_noop() {
        let store = MemoryStore::new();
        let (set_id, seller_id, winner_id) = seed(&store).await;

        transfer(&store, set_id, seller_id, winner_id)
            .await
            .unwrap();
        transfer(&store, set_id, seller_id, winner_id)
            .await
            .unwrap();

        let winner = store.get_account(winner_id).await.unwrap().unwrap();
        assert_eq!(
            winner
                .entity
                .owned_set_ids
                .iter()
                .filter(|id| **id == set_id)
                .count(),
            1
        );
    }
}

// endregion: --- Tests
