//! entitle-core: Shared types, configuration, and error handling for Entitle.
//!
//! This crate provides the foundational types used across all Entitle components:
//! - The two graph entities: `User` (principal) and `EntitlementDefinition` (grant)
//! - Typed identifiers for both
//! - Layered configuration loading
//! - The platform error type

pub mod config;
pub mod error;
pub mod types;

pub use error::EntitleError;
pub use types::{EntitlementDefinition, EntitlementId, User, UserId};
