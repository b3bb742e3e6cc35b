//! Wishlist membership toggle
//!
//! State only flips after the store confirmed the write or delete; a failed
//! attempt leaves it where it was and returns the error.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{WishlistEntry, WishlistStore};
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Membership {
    Member,
    NotMember,
}

pub struct WishlistToggle {
    store: WishlistStore,
    entry: WishlistEntry,
    state: Membership,
    reconciled: bool,
}

impl WishlistToggle {
    pub fn new(store: WishlistStore, user_id: Uuid, product_id: &str) -> Self {
        Self {
            store,
            entry: WishlistEntry::new(user_id, product_id),
            state: Membership::NotMember,
            reconciled: false,
        }
    }

    pub fn state(&self) -> Membership {
        self.state
    }

    /// Read the stored membership. Runs once per mount; later calls return
    /// the current state without touching the store.
    pub async fn reconcile(&mut self) -> Result<Membership, StoreError> {
        if self.reconciled {
            return Ok(self.state);
        }
        self.reconciled = true;

        let exists = self.store.contains(&self.entry).await?;
        self.state = if exists {
            Membership::Member
        } else {
            Membership::NotMember
        };
        Ok(self.state)
    }

    /// Add or remove the product, then flip
    pub async fn toggle(&mut self) -> Result<Membership, StoreError> {
        let next = match self.state {
            Membership::NotMember => {
                self.store.add(&self.entry).await.inspect_err(|e| {
                    warn!(product_id = %self.entry.product_id, error = %e, "Wishlist add failed");
                })?;
                Membership::Member
            }
            Membership::Member => {
                self.store.remove(&self.entry).await.inspect_err(|e| {
                    warn!(product_id = %self.entry.product_id, error = %e, "Wishlist remove failed");
                })?;
                Membership::NotMember
            }
        };

        self.state = next;
        info!(
            user_id = %self.entry.user_id,
            product_id = %self.entry.product_id,
            state = ?next,
            "Wishlist toggled"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::WISHLIST;
    use crate::store::{memory::Operation, DocumentStore, MemoryStore};
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    fn toggle(memory: &MemoryStore, user_id: Uuid) -> WishlistToggle {
        let store: Arc<dyn DocumentStore> = Arc::new(memory.clone());
        WishlistToggle::new(WishlistStore::new(store), user_id, "p1")
    }

    #[tokio::test]
    async fn toggling_twice_leaves_no_record() {
        let memory = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let mut wishlist = toggle(&memory, user_id);
        let doc_id = WishlistEntry::new(user_id, "p1").document_id();

        assert_eq!(wishlist.reconcile().await.unwrap(), Membership::NotMember);
        assert_eq!(wishlist.toggle().await.unwrap(), Membership::Member);
        assert!(memory.get_one(WISHLIST, &doc_id).await.unwrap().is_some());

        assert_eq!(wishlist.toggle().await.unwrap(), Membership::NotMember);
        assert!(memory.get_one(WISHLIST, &doc_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconcile_reads_existing_membership_once() {
        let memory = MemoryStore::new();
        let user_id = Uuid::new_v4();
        toggle(&memory, user_id).toggle().await.unwrap();

        let mut wishlist = toggle(&memory, user_id);
        assert_eq!(wishlist.reconcile().await.unwrap(), Membership::Member);

        // A second reconcile does not read again
        memory.fail_next(Operation::GetOne);
        assert_ok!(wishlist.reconcile().await);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_unchanged() {
        let memory = MemoryStore::new();
        let mut wishlist = toggle(&memory, Uuid::new_v4());
        wishlist.reconcile().await.unwrap();

        memory.fail_next(Operation::Put);
        assert_err!(wishlist.toggle().await);
        assert_eq!(wishlist.state(), Membership::NotMember);

        // Manual retry goes through
        assert_eq!(wishlist.toggle().await.unwrap(), Membership::Member);

        memory.fail_next(Operation::Delete);
        assert_err!(wishlist.toggle().await);
        assert_eq!(wishlist.state(), Membership::Member);
    }
}
