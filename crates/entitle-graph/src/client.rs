//! Neo4j connection management and the `neo4rs`-backed session boundary.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, TryStreamExt};
use neo4rs::{ConfigBuilder, Graph, Query, Row, Txn};
use serde::Deserialize;

use crate::boundary::{Cursor, Session, Transaction};
use crate::decode::DecodeError;
use crate::statement::Statement;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Malformed statement: {0}")]
    Statement(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Configuration for connecting to Neo4j.
///
/// Loaded from the `[neo4j]` config section; every field has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Execute a raw write-only query outside the query builder.
    ///
    /// Administrative use only (fixtures, cleanup).
    pub async fn run_raw(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }
}

fn checked(statement: &Statement) -> Result<Query, GraphError> {
    let unbound = statement.unbound_params();
    if !unbound.is_empty() {
        return Err(GraphError::Statement(format!(
            "{:?} references unbound parameters {unbound:?}",
            statement.kind()
        )));
    }
    Ok(statement.to_query())
}

#[async_trait]
impl Session for GraphClient {
    type Cursor = Neo4jCursor;
    type Transaction = Neo4jTransaction;

    async fn run(&self, statement: &Statement) -> Result<Neo4jCursor, GraphError> {
        let query = checked(statement)?;
        tracing::debug!(kind = ?statement.kind(), "Running statement");
        let stream = self.graph.execute(query).await?;
        Ok(Neo4jCursor {
            rows: Box::pin(TryStreamExt::into_stream(stream.into_stream())),
        })
    }

    async fn begin(&self) -> Result<Neo4jTransaction, GraphError> {
        let txn = self.graph.start_txn().await?;
        Ok(Neo4jTransaction { txn })
    }
}

type BoxedRows = Pin<Box<dyn Stream<Item = Result<Row, neo4rs::Error>> + Send>>;

/// Row stream from a session-level statement. Rows are pulled on demand.
pub struct Neo4jCursor {
    rows: BoxedRows,
}

#[async_trait]
impl Cursor for Neo4jCursor {
    type Record = Row;

    async fn next(&mut self) -> Result<Option<Row>, GraphError> {
        Ok(self.rows.try_next().await?)
    }
}

/// An explicit `neo4rs` transaction.
pub struct Neo4jTransaction {
    txn: Txn,
}

#[async_trait]
impl Transaction for Neo4jTransaction {
    type Record = Row;

    async fn run(&mut self, statement: &Statement) -> Result<Vec<Row>, GraphError> {
        let query = checked(statement)?;
        tracing::debug!(kind = ?statement.kind(), "Running statement in transaction");
        let mut stream = self.txn.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(self.txn.handle()).await? {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn commit(self) -> Result<(), GraphError> {
        self.txn.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), GraphError> {
        self.txn.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::StatementKind;

    #[tokio::test]
    async fn cursor_pulls_rows_on_demand() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        use futures_util::{stream, StreamExt};
        use neo4rs::BoltList;

        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let rows = stream::iter(0..3).map(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, neo4rs::Error>(Row::new(BoltList::new(), BoltList::new()))
        });
        let mut cursor = Neo4jCursor {
            rows: Box::pin(rows),
        };

        assert!(cursor.next().await.unwrap().is_some());
        assert_eq!(pulled.load(Ordering::SeqCst), 1);
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(pulled.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn default_config_targets_local_bolt() {
        let config = GraphConfig::default();
        assert_eq!(config.uri, "bolt://localhost:7687");
        assert_eq!(config.max_connections, 16);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: GraphConfig =
            serde_json::from_value(serde_json::json!({ "uri": "bolt://graph:7687" })).unwrap();
        assert_eq!(config.uri, "bolt://graph:7687");
        assert_eq!(config.user, "neo4j");
        assert_eq!(config.fetch_size, 256);
    }

    #[test]
    fn unbound_parameters_are_rejected_before_sending() {
        let stmt = Statement::new(StatementKind::CountLinks, "RETURN $missing AS links");
        let Err(err) = checked(&stmt) else {
            panic!("statement with an unbound parameter was accepted");
        };
        assert!(matches!(err, GraphError::Statement(msg) if msg.contains("missing")));
    }
}
