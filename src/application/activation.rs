//! Membership activation.
//!
//! Runs strictly after an order reaches `Paid`. The exists-check plus the
//! store's unique insert make activation idempotent without any lock: a
//! duplicate attempt either sees the grant up front or loses the insert
//! race and treats `AlreadyExists` as success.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::membership::MembershipGrant;
use crate::domain::order::{Order, OrderStatus, PaymentError};
use crate::ports::{InsertOutcome, MembershipStore};

/// Result of an activation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// A new grant was written.
    Granted(MembershipGrant),

    /// A grant for this order already existed; nothing was written.
    AlreadyGranted,
}

/// Computes and persists the membership grant funded by a paid order.
pub struct MembershipActivator {
    memberships: Arc<dyn MembershipStore>,
}

impl MembershipActivator {
    pub fn new(memberships: Arc<dyn MembershipStore>) -> Self {
        Self { memberships }
    }

    /// Activate the membership for a paid order, at most once.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` if the order is not `Paid`
    /// - `Store` on persistence failure (the caller records and retries)
    pub async fn activate(&self, order: &Order) -> Result<ActivationOutcome, PaymentError> {
        if order.status != OrderStatus::Paid {
            return Err(PaymentError::InvalidTransition {
                from: order.status,
                target: "membership_activation",
            });
        }

        if self.memberships.exists(&order.order_no).await? {
            return Ok(ActivationOutcome::AlreadyGranted);
        }

        // Fresh read: an extension must never compute from a stale expiry.
        let current_expiry = self.memberships.current_expiry(&order.user_ref).await?;
        let grant = MembershipGrant::issue(order, current_expiry, Utc::now());

        match self.memberships.create(grant.clone()).await? {
            InsertOutcome::Inserted => {
                tracing::info!(
                    order_no = %order.order_no,
                    user_ref = %order.user_ref,
                    plan = %order.plan,
                    expires_at = %grant.expires_at,
                    "membership activated"
                );
                Ok(ActivationOutcome::Granted(grant))
            }
            InsertOutcome::AlreadyExists => Ok(ActivationOutcome::AlreadyGranted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{PaymentMethod, Plan, TransitionTarget, UserRef};
    use crate::ports::StoreError;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ══════════════════════════════════════════════════════════════
    // Test Infrastructure
    // ══════════════════════════════════════════════════════════════

    struct MockMembershipStore {
        grants: Mutex<HashMap<String, MembershipGrant>>,
        fail_create: bool,
    }

    impl MockMembershipStore {
        fn new() -> Self {
            Self {
                grants: Mutex::new(HashMap::new()),
                fail_create: false,
            }
        }

        fn failing() -> Self {
            Self {
                grants: Mutex::new(HashMap::new()),
                fail_create: true,
            }
        }

        fn grant_count(&self) -> usize {
            self.grants.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MembershipStore for MockMembershipStore {
        async fn exists(&self, order_no: &crate::domain::order::OrderNo) -> Result<bool, StoreError> {
            Ok(self.grants.lock().unwrap().contains_key(order_no.as_str()))
        }

        async fn create(&self, grant: MembershipGrant) -> Result<InsertOutcome, StoreError> {
            if self.fail_create {
                return Err(StoreError::Unavailable("simulated outage".into()));
            }
            let mut grants = self.grants.lock().unwrap();
            if grants.contains_key(grant.order_no.as_str()) {
                Ok(InsertOutcome::AlreadyExists)
            } else {
                grants.insert(grant.order_no.as_str().to_string(), grant);
                Ok(InsertOutcome::Inserted)
            }
        }

        async fn current_expiry(
            &self,
            user_ref: &UserRef,
        ) -> Result<Option<DateTime<Utc>>, StoreError> {
            Ok(self
                .grants
                .lock()
                .unwrap()
                .values()
                .filter(|g| &g.user_ref == user_ref)
                .map(|g| g.expires_at)
                .max())
        }
    }

    fn paid_order() -> Order {
        let mut order = Order::create(
            UserRef::new("acct-42"),
            Plan::Basic,
            PaymentMethod::Epay,
            Utc::now(),
        );
        order
            .apply_transition(
                TransitionTarget::Paid {
                    transaction_id: "TXN-1".to_string(),
                },
                Utc::now(),
            )
            .unwrap();
        order
    }

    // ══════════════════════════════════════════════════════════════
    // Activation
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn activates_paid_order_once() {
        let store = Arc::new(MockMembershipStore::new());
        let activator = MembershipActivator::new(store.clone());
        let order = paid_order();

        let outcome = activator.activate(&order).await.unwrap();

        assert!(matches!(outcome, ActivationOutcome::Granted(_)));
        assert_eq!(store.grant_count(), 1);
    }

    #[tokio::test]
    async fn second_activation_is_a_noop() {
        let store = Arc::new(MockMembershipStore::new());
        let activator = MembershipActivator::new(store.clone());
        let order = paid_order();

        activator.activate(&order).await.unwrap();
        let outcome = activator.activate(&order).await.unwrap();

        assert_eq!(outcome, ActivationOutcome::AlreadyGranted);
        assert_eq!(store.grant_count(), 1);
    }

    #[tokio::test]
    async fn second_order_extends_existing_expiry() {
        let store = Arc::new(MockMembershipStore::new());
        let activator = MembershipActivator::new(store.clone());

        let first = paid_order();
        let ActivationOutcome::Granted(first_grant) = activator.activate(&first).await.unwrap()
        else {
            panic!("expected a new grant");
        };

        let second = paid_order();
        let ActivationOutcome::Granted(second_grant) = activator.activate(&second).await.unwrap()
        else {
            panic!("expected a new grant");
        };

        assert_eq!(
            second_grant.expires_at,
            first_grant.expires_at + Duration::days(30)
        );
    }

    #[tokio::test]
    async fn unpaid_order_cannot_activate() {
        let store = Arc::new(MockMembershipStore::new());
        let activator = MembershipActivator::new(store.clone());
        let order = Order::create(
            UserRef::new("acct-42"),
            Plan::Basic,
            PaymentMethod::Epay,
            Utc::now(),
        );

        let result = activator.activate(&order).await;

        assert!(matches!(
            result,
            Err(PaymentError::InvalidTransition { .. })
        ));
        assert_eq!(store.grant_count(), 0);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_error() {
        let store = Arc::new(MockMembershipStore::failing());
        let activator = MembershipActivator::new(store);
        let order = paid_order();

        let result = activator.activate(&order).await;

        assert!(matches!(result, Err(PaymentError::Store(_))));
    }
}
