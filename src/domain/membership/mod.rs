//! Membership entitlements unlocked by paid orders.

mod grant;

pub use grant::MembershipGrant;
