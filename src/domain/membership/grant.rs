//! Membership grant computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, OrderNo, Plan, UserRef};

/// The entitlement record funded by exactly one paid order.
///
/// Keyed by `order_no`; the membership store's uniqueness constraint on that
/// key is what makes activation idempotent under concurrent duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipGrant {
    pub order_no: OrderNo,
    pub user_ref: UserRef,
    pub plan: Plan,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl MembershipGrant {
    /// Issue a grant for a freshly paid order.
    ///
    /// The expiry extends the account's current entitlement when one is
    /// still running: `expires_at = max(now, current_expiry) + duration`.
    /// `current_expiry` must come from a read performed inside the same
    /// activation attempt, never from a cached value.
    pub fn issue(
        order: &Order,
        current_expiry: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let base = match current_expiry {
            Some(expiry) if expiry > now => expiry,
            _ => now,
        };

        MembershipGrant {
            order_no: order.order_no.clone(),
            user_ref: order.user_ref.clone(),
            plan: order.plan,
            granted_at: now,
            expires_at: base + order.plan.duration(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::PaymentMethod;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    fn paid_order() -> Order {
        Order::create(
            UserRef::new("acct-42"),
            Plan::Basic,
            PaymentMethod::Alipay,
            now(),
        )
    }

    #[test]
    fn fresh_grant_runs_from_now() {
        let grant = MembershipGrant::issue(&paid_order(), None, now());

        assert_eq!(grant.granted_at, now());
        assert_eq!(grant.expires_at, now() + Duration::days(30));
    }

    #[test]
    fn active_membership_is_extended_from_current_expiry() {
        let current = now() + Duration::days(10);
        let grant = MembershipGrant::issue(&paid_order(), Some(current), now());

        assert_eq!(grant.expires_at, current + Duration::days(30));
    }

    #[test]
    fn lapsed_membership_restarts_from_now() {
        let lapsed = now() - Duration::days(5);
        let grant = MembershipGrant::issue(&paid_order(), Some(lapsed), now());

        assert_eq!(grant.expires_at, now() + Duration::days(30));
    }

    #[test]
    fn grant_carries_order_identity() {
        let order = paid_order();
        let grant = MembershipGrant::issue(&order, None, now());

        assert_eq!(grant.order_no, order.order_no);
        assert_eq!(grant.user_ref, order.user_ref);
        assert_eq!(grant.plan, order.plan);
    }
}
