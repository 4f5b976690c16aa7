//! Core types shared by the oidc-link crates.
//!
//! This crate provides the strongly-typed identifiers and the `Result`
//! alias used by the relying-party reconciliation engine.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::AccountId;
