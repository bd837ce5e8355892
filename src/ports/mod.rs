//! Ports - contracts the core depends on, implemented by adapters.

mod gateway;
mod membership_store;
mod order_store;

pub use gateway::{
    CallbackAck, CallbackNotice, ClaimedResult, CreatePaymentRequest, GatewayError,
    GatewayOrderStatus, GatewayRegistry, PaymentCreated, PaymentGateway, PaymentInstructions,
};
pub use membership_store::{InsertOutcome, MembershipStore};
pub use order_store::{CasOutcome, OrderStore, StoreError};
