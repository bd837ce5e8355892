//! In-memory store adapters.
//!
//! Back the order and membership ports with process-local maps. The CAS
//! semantics match a conditional `UPDATE ... WHERE version = $n` exactly,
//! so the reconciliation engine behaves identically against a database
//! deployment. Locks are held only for the map operation itself, never
//! across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::membership::MembershipGrant;
use crate::domain::order::{Order, OrderNo, UserRef};
use crate::ports::{CasOutcome, InsertOutcome, MembershipStore, OrderStore, StoreError};

/// Order store backed by a versioned map.
#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: RwLock<HashMap<String, Order>>,

    /// Fault injection: bump the stored version before every CAS check so
    /// each write loses its race.
    interfere_cas: AtomicBool,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a competing writer that wins every CAS race.
    #[cfg(test)]
    pub fn interfere_on_cas(&self, enabled: bool) {
        self.interfere_cas.store(enabled, Ordering::SeqCst);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Order>> {
        self.orders.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Order>> {
        self.orders.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<(), StoreError> {
        let mut orders = self.write();
        if orders.contains_key(order.order_no.as_str()) {
            return Err(StoreError::DuplicateOrder(order.order_no));
        }
        orders.insert(order.order_no.as_str().to_string(), order);
        Ok(())
    }

    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError> {
        Ok(self.read().get(order_no.as_str()).cloned())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        order: Order,
    ) -> Result<CasOutcome, StoreError> {
        let mut orders = self.write();

        if self.interfere_cas.load(Ordering::SeqCst) {
            if let Some(current) = orders.get_mut(order.order_no.as_str()) {
                current.version += 1;
            }
        }

        match orders.get(order.order_no.as_str()) {
            Some(current) if current.version == expected_version => {
                orders.insert(order.order_no.as_str().to_string(), order);
                Ok(CasOutcome::Swapped)
            }
            Some(_) => Ok(CasOutcome::VersionMismatch),
            None => Err(StoreError::Unavailable(format!(
                "order {} missing during swap",
                order.order_no
            ))),
        }
    }

    async fn list_by_user(&self, user_ref: &UserRef) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> = self
            .read()
            .values()
            .filter(|o| &o.user_ref == user_ref)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}

/// Membership store with a unique constraint on `order_no`.
#[derive(Default)]
pub struct InMemoryMembershipStore {
    grants: RwLock<HashMap<String, MembershipGrant>>,

    /// Fault injection: fail the next insert once.
    fail_next_create: AtomicBool,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of grants held; used by statistics and tests.
    pub fn grant_count(&self) -> usize {
        self.read().len()
    }

    /// Make the next `create` fail once with a store error.
    #[cfg(test)]
    pub fn fail_next_create(&self) {
        self.fail_next_create.store(true, Ordering::SeqCst);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, MembershipGrant>> {
        self.grants.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MembershipGrant>> {
        self.grants.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn exists(&self, order_no: &OrderNo) -> Result<bool, StoreError> {
        Ok(self.read().contains_key(order_no.as_str()))
    }

    async fn create(&self, grant: MembershipGrant) -> Result<InsertOutcome, StoreError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Unavailable("membership store outage".into()));
        }

        let mut grants = self.write();
        if grants.contains_key(grant.order_no.as_str()) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        grants.insert(grant.order_no.as_str().to_string(), grant);
        Ok(InsertOutcome::Inserted)
    }

    async fn current_expiry(
        &self,
        user_ref: &UserRef,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .read()
            .values()
            .filter(|g| &g.user_ref == user_ref)
            .map(|g| g.expires_at)
            .max())
    }
}
