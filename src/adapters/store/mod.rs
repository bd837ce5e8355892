//! Store adapters.

mod in_memory;

pub use in_memory::{InMemoryMembershipStore, InMemoryOrderStore};
