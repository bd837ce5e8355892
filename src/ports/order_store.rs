//! Order persistence port.
//!
//! The store is the only mutable shared state in the core and is never
//! locked pessimistically: every write is a compare-and-swap conditioned on
//! the version the writer last read. Implementations must enforce that rule
//! even across process boundaries (a conditional `UPDATE ... WHERE version =
//! $n` in SQL terms).

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::{Order, OrderNo, PaymentError, UserRef};

/// Persistence failures from either store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// An order with this number already exists.
    #[error("Duplicate order number: {0}")]
    DuplicateOrder(OrderNo),

    /// Backend unavailable or I/O failure.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for PaymentError {
    fn from(err: StoreError) -> Self {
        PaymentError::Store(err.to_string())
    }
}

/// Outcome of a conditional write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored version matched and the write landed.
    Swapped,

    /// Another writer got there first; re-read and retry.
    VersionMismatch,
}

/// Repository port for the Order aggregate.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a freshly created order.
    ///
    /// # Errors
    ///
    /// - `DuplicateOrder` if the order number is already taken
    async fn insert(&self, order: Order) -> Result<(), StoreError>;

    /// Fetch an order by number. Returns `None` if unknown.
    async fn get(&self, order_no: &OrderNo) -> Result<Option<Order>, StoreError>;

    /// Replace the stored order iff its current version equals
    /// `expected_version`. The caller supplies the successor state with the
    /// version already advanced.
    async fn compare_and_swap(
        &self,
        expected_version: u64,
        order: Order,
    ) -> Result<CasOutcome, StoreError>;

    /// List a user's orders, most recent first.
    async fn list_by_user(&self, user_ref: &UserRef) -> Result<Vec<Order>, StoreError>;
}
