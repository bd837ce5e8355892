//! Membership persistence port.
//!
//! Grants are keyed by `order_no`; the store's uniqueness constraint on
//! that key is the activation idempotency guard. There is no update
//! operation: a grant is written once and never mutated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::membership::MembershipGrant;
use crate::domain::order::{OrderNo, UserRef};

use super::order_store::StoreError;

/// Outcome of inserting a grant.
///
/// `AlreadyExists` is how a lost activation race surfaces; it is not an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

/// Repository port for membership grants.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Whether a grant for this order already exists.
    async fn exists(&self, order_no: &OrderNo) -> Result<bool, StoreError>;

    /// Insert a grant. Returns `AlreadyExists` instead of failing when the
    /// order already has one.
    async fn create(&self, grant: MembershipGrant) -> Result<InsertOutcome, StoreError>;

    /// The account's latest entitlement expiry, if any grant exists.
    ///
    /// Activation reads this fresh on every attempt so extensions never
    /// compute from a stale expiry.
    async fn current_expiry(
        &self,
        user_ref: &UserRef,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_store_is_object_safe() {
        fn _accepts_dyn(_store: &dyn MembershipStore) {}
    }
}
