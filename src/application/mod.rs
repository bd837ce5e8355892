//! Application layer - orchestration over domain and ports.

mod activation;
mod orders;
mod reconciliation;

pub use activation::{ActivationOutcome, MembershipActivator};
pub use orders::{CreateOrderCommand, CreatedOrder, OrderService, ReconcileResult};
pub use reconciliation::{
    ActivationStatus, PaidEvidence, ReconcileOutcome, ReconciliationEngine, RetryPolicy,
};
