//! Order aggregate and its state machine.

mod errors;
mod order;
mod plan;

pub use errors::PaymentError;
pub use order::{
    Order, OrderNo, OrderStatus, PaymentMethod, TransitionEffect, TransitionTarget, UserRef,
};
pub use plan::Plan;
