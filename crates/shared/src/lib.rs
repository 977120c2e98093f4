//! Tenbill Shared Types and Utilities
//!
//! This crate contains types and database utilities shared across the
//! tenancy-billing platform.

pub mod db;
pub mod types;

pub use db::*;
pub use types::*;
