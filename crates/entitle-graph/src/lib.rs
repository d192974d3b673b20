//! Entitle Graph: repository layer over the Neo4j graph.
//!
//! This crate is the single mutation point for user and entitlement nodes.
//! Every statement comes from the query builder in [`statement`], runs
//! through the [`boundary`] traits, and is decoded by [`decode`]. The
//! write path composes two statements inside one scoped transaction
//! ([`unit_of_work`]).
//!
//! Two boundary implementations ship with the crate: [`GraphClient`] over
//! `neo4rs`, and [`MemoryGraph`] for tests and offline runs.

pub mod boundary;
pub mod client;
pub mod decode;
pub mod memory;
pub mod registrar;
pub mod repository;
pub mod statement;
pub mod unit_of_work;

pub use boundary::{Cursor, Record, Session, Transaction};
pub use client::{GraphClient, GraphConfig, GraphError};
pub use decode::DecodeError;
pub use memory::{Fault, FaultStage, MemoryGraph};
pub use registrar::UserRegistrar;
pub use repository::{
    EntitlementRepository, LinkPolicy, LinkStatus, RepositoryConfig, RepositoryError,
};
pub use statement::{ParamValue, Statement, StatementKind};
pub use unit_of_work::{write_transaction, Completion, UnitOfWork};
