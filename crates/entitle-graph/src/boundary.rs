//! Session and transaction boundary consumed by the repository.
//!
//! A [`Session`] runs single statements and opens transactions. A
//! [`Transaction`] only runs statements; committing or rolling back consumes
//! it, so a finished transaction cannot be reused. Units of work never see
//! `commit`/`rollback` directly; [`crate::unit_of_work::write_transaction`]
//! owns that decision.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::client::GraphError;
use crate::decode::DecodeError;
use crate::statement::Statement;

/// One result row, decoded by column name.
pub trait Record: Send {
    /// Decode the whole row into `T`, matching column names to field names.
    fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError>;
}

/// A lazy, forward-only sequence of rows.
#[async_trait]
pub trait Cursor: Send {
    type Record: Record;

    /// The next row, `Ok(None)` once exhausted.
    async fn next(&mut self) -> Result<Option<Self::Record>, GraphError>;
}

/// An open write transaction.
#[async_trait]
pub trait Transaction: Send {
    type Record: Record;

    /// Run a statement and drain its rows. Failures while streaming surface
    /// as errors, same as failures to execute.
    async fn run(&mut self, statement: &Statement) -> Result<Vec<Self::Record>, GraphError>;

    async fn commit(self) -> Result<(), GraphError>;

    async fn rollback(self) -> Result<(), GraphError>;
}

/// An authenticated connection to the graph store.
#[async_trait]
pub trait Session: Send + Sync {
    type Cursor: Cursor;
    type Transaction: Transaction;

    /// Run a single statement in an implicit transaction.
    async fn run(&self, statement: &Statement) -> Result<Self::Cursor, GraphError>;

    /// Open an explicit transaction.
    async fn begin(&self) -> Result<Self::Transaction, GraphError>;
}
