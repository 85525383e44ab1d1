//! Property-based tests for inventory-rpc.
//!
//! Run with: cargo test --test property_tests

pub mod attempts;
pub mod normalization;
