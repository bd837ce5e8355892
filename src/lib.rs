//! Paylane - Payment order reconciliation core
//!
//! This crate implements the order/payment/membership backbone of the
//! Pixelrift image tools storefront: order creation against three external
//! payment gateways, asynchronous callback ingestion with per-provider
//! signature verification, and an idempotent reconciliation engine that
//! activates memberships exactly once per paid order.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
