//! In-memory graph implementing the session boundary.
//!
//! Interprets the statements produced by [`crate::statement`] by kind,
//! against a small node/edge store. Write transactions are serialized: a
//! transaction holds the store lock from `begin` until it finishes, works on
//! a private copy, and publishes the copy on commit.
//!
//! Faults can be injected per statement kind to exercise error paths.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::boundary::{Cursor, Record, Session, Transaction};
use crate::client::GraphError;
use crate::decode::DecodeError;
use crate::statement::{ParamValue, Statement, StatementKind};

/// Where an injected fault fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStage {
    /// The statement fails to execute; nothing is applied.
    Execute,
    /// The statement applies, then the cursor fails after `after` rows.
    /// Inside a transaction rows are drained, so the run fails outright.
    Stream { after: usize },
}

/// A one-shot failure for the next statement of `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fault {
    pub kind: StatementKind,
    pub stage: FaultStage,
}

impl Fault {
    pub fn execute(kind: StatementKind) -> Self {
        Self {
            kind,
            stage: FaultStage::Execute,
        }
    }

    pub fn stream(kind: StatementKind, after: usize) -> Self {
        Self {
            kind,
            stage: FaultStage::Stream { after },
        }
    }
}

#[derive(Debug, Clone)]
struct StoredNode {
    key: u64,
    props: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
struct Store {
    next_key: u64,
    users: Vec<StoredNode>,
    entitlements: Vec<StoredNode>,
    /// `ASSOCIATED_TO` edges as (entitlement key, user key).
    links: Vec<(u64, u64)>,
}

#[derive(Default)]
struct Control {
    faults: std::sync::Mutex<Vec<Fault>>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl Control {
    fn take_fault(&self, kind: StatementKind) -> Option<FaultStage> {
        let mut faults = self.faults.lock().unwrap_or_else(|p| p.into_inner());
        let pos = faults.iter().position(|f| f.kind == kind)?;
        Some(faults.remove(pos).stage)
    }
}

/// A shared in-memory graph. Clone is cheap (inner Arc).
#[derive(Clone, Default)]
pub struct MemoryGraph {
    store: Arc<Mutex<Store>>,
    control: Arc<Control>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a one-shot fault.
    pub fn inject(&self, fault: Fault) {
        self.control
            .faults
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(fault);
    }

    pub async fn user_count(&self) -> usize {
        self.store.lock().await.users.len()
    }

    pub async fn entitlement_count(&self) -> usize {
        self.store.lock().await.entitlements.len()
    }

    /// Total number of `ASSOCIATED_TO` edges.
    pub async fn link_count(&self) -> usize {
        self.store.lock().await.links.len()
    }

    /// Number of committed explicit transactions.
    pub fn commits(&self) -> usize {
        self.control.commits.load(Ordering::SeqCst)
    }

    /// Number of rolled back explicit transactions.
    pub fn rollbacks(&self) -> usize {
        self.control.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MemoryGraph {
    type Cursor = MemoryCursor;
    type Transaction = MemoryTransaction;

    async fn run(&self, statement: &Statement) -> Result<MemoryCursor, GraphError> {
        let fault = self.control.take_fault(statement.kind());
        if fault == Some(FaultStage::Execute) {
            return Err(injected(statement.kind()));
        }

        let mut store = self.store.lock().await;
        let rows = store.apply(statement)?;
        Ok(MemoryCursor::new(rows, statement.kind(), fault))
    }

    async fn begin(&self) -> Result<MemoryTransaction, GraphError> {
        let guard = self.store.clone().lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTransaction {
            guard,
            working,
            control: self.control.clone(),
        })
    }
}

/// An open transaction over a private copy of the store.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Store>,
    working: Store,
    control: Arc<Control>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    type Record = MemoryRecord;

    async fn run(&mut self, statement: &Statement) -> Result<Vec<MemoryRecord>, GraphError> {
        let fault = self.control.take_fault(statement.kind());
        if fault == Some(FaultStage::Execute) {
            return Err(injected(statement.kind()));
        }

        let rows = self.working.apply(statement)?;
        match fault {
            Some(FaultStage::Stream { .. }) => Err(injected(statement.kind())),
            _ => Ok(rows),
        }
    }

    async fn commit(self) -> Result<(), GraphError> {
        let Self {
            mut guard,
            working,
            control,
        } = self;
        *guard = working;
        control.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> Result<(), GraphError> {
        self.control.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Rows from a session-level statement, with an optional armed failure.
pub struct MemoryCursor {
    rows: VecDeque<MemoryRecord>,
    kind: StatementKind,
    fail_after: Option<usize>,
    delivered: usize,
}

impl MemoryCursor {
    fn new(rows: Vec<MemoryRecord>, kind: StatementKind, fault: Option<FaultStage>) -> Self {
        let fail_after = match fault {
            Some(FaultStage::Stream { after }) => Some(after),
            _ => None,
        };
        Self {
            rows: rows.into(),
            kind,
            fail_after,
            delivered: 0,
        }
    }
}

#[async_trait]
impl Cursor for MemoryCursor {
    type Record = MemoryRecord;

    async fn next(&mut self) -> Result<Option<MemoryRecord>, GraphError> {
        if let Some(after) = self.fail_after {
            if self.delivered >= after || self.rows.is_empty() {
                self.fail_after = None;
                self.rows.clear();
                return Err(injected(self.kind));
            }
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.delivered += 1;
        }
        Ok(row)
    }
}

/// A row as a map of column name to JSON value.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    columns: Map<String, Value>,
}

impl MemoryRecord {
    pub fn new(columns: Map<String, Value>) -> Self {
        Self { columns }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }
}

impl Record for MemoryRecord {
    fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        serde_json::from_value(Value::Object(self.columns.clone())).map_err(|e| {
            DecodeError::Shape {
                target: std::any::type_name::<T>(),
                reason: e.to_string(),
            }
        })
    }
}

fn injected(kind: StatementKind) -> GraphError {
    GraphError::Connection(format!("injected failure during {kind:?}"))
}

// ── Statement interpretation ─────────────────────────────────────

const PROJECTED: [&str; 7] = [
    "effectiveDate",
    "termDate",
    "createdBy",
    "createdTs",
    "modifiedBy",
    "modifiedTs",
    "roles",
];

impl Store {
    fn apply(&mut self, statement: &Statement) -> Result<Vec<MemoryRecord>, GraphError> {
        let unbound = statement.unbound_params();
        if !unbound.is_empty() {
            return Err(GraphError::Statement(format!(
                "{:?} references unbound parameters {unbound:?}",
                statement.kind()
            )));
        }

        match statement.kind() {
            StatementKind::CreateUser => {
                let id = text_param(statement, "id")?;
                let mut props = Map::new();
                props.insert("userID".into(), Value::String(id.clone()));
                props.insert("name".into(), json_param(statement, "name")?);
                let key = self.next_key();
                self.users.push(StoredNode { key, props });
                Ok(vec![single("id", Value::String(id))])
            }
            StatementKind::CreateEntitlement => {
                let mut props = Map::new();
                props.insert("entitlementID".into(), json_param(statement, "id")?);
                for name in PROJECTED {
                    props.insert(name.into(), json_param(statement, name)?);
                }
                let key = self.next_key();
                self.entitlements.push(StoredNode { key, props });
                Ok(Vec::new())
            }
            StatementKind::LinkEntitlement => {
                let et_id = text_param(statement, "etID")?;
                let user_id = text_param(statement, "userID")?;
                let mut rows = Vec::new();
                for et in self.entitlements.iter().filter(|n| has(n, "entitlementID", &et_id)) {
                    for usr in self.users.iter().filter(|n| has(n, "userID", &user_id)) {
                        self.links.push((et.key, usr.key));
                        rows.push(single("id", Value::String(et_id.clone())));
                    }
                }
                Ok(rows)
            }
            StatementKind::EntitlementById => {
                let et_id = text_param(statement, "entitlementID")?;
                Ok(self
                    .entitlements
                    .iter()
                    .filter(|n| has(n, "entitlementID", &et_id))
                    .map(|n| self.project(n))
                    .collect())
            }
            StatementKind::AllEntitlements => {
                Ok(self.entitlements.iter().map(|n| self.project(n)).collect())
            }
            StatementKind::CountLinks => {
                let et_id = text_param(statement, "entitlementID")?;
                let links = self
                    .entitlements
                    .iter()
                    .filter(|n| has(n, "entitlementID", &et_id))
                    .map(|et| self.links.iter().filter(|(e, _)| *e == et.key).count())
                    .sum::<usize>();
                Ok(vec![single("links", Value::from(links as i64))])
            }
        }
    }

    fn next_key(&mut self) -> u64 {
        self.next_key += 1;
        self.next_key
    }

    fn project(&self, et: &StoredNode) -> MemoryRecord {
        let user_id = self
            .links
            .iter()
            .filter(|(e, _)| *e == et.key)
            .find_map(|(_, u)| self.users.iter().find(|n| n.key == *u))
            .and_then(|usr| usr.props.get("userID").cloned())
            .unwrap_or(Value::Null);

        let mut columns = Map::new();
        columns.insert(
            "id".into(),
            et.props.get("entitlementID").cloned().unwrap_or(Value::Null),
        );
        columns.insert("userID".into(), user_id);
        for name in PROJECTED {
            columns.insert(
                name.into(),
                et.props.get(name).cloned().unwrap_or(Value::Null),
            );
        }
        MemoryRecord::new(columns)
    }
}

fn has(node: &StoredNode, prop: &str, value: &str) -> bool {
    node.props.get(prop).and_then(Value::as_str) == Some(value)
}

fn single(column: &str, value: Value) -> MemoryRecord {
    let mut columns = Map::new();
    columns.insert(column.to_string(), value);
    MemoryRecord::new(columns)
}

fn json_param(statement: &Statement, key: &str) -> Result<Value, GraphError> {
    statement
        .param(key)
        .map(ParamValue::to_json)
        .ok_or_else(|| GraphError::Statement(format!("missing parameter ${key}")))
}

fn text_param(statement: &Statement, key: &str) -> Result<String, GraphError> {
    match statement.param(key) {
        Some(ParamValue::Text(s)) => Ok(s.clone()),
        Some(other) => Err(GraphError::Statement(format!(
            "parameter ${key} must be a string, got {other:?}"
        ))),
        None => Err(GraphError::Statement(format!("missing parameter ${key}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement;
    use entitle_core::{EntitlementId, User};

    #[tokio::test]
    async fn session_statements_apply_immediately() {
        let graph = MemoryGraph::new();
        let user = User::new("alice");
        let mut cursor = graph.run(&statement::create_user(&user)).await.unwrap();
        let row = cursor.next().await.unwrap().unwrap();
        assert_eq!(row.get("id"), Some(&Value::String(user.id.to_string())));
        assert!(cursor.next().await.unwrap().is_none());
        assert_eq!(graph.user_count().await, 1);
    }

    #[tokio::test]
    async fn uncommitted_work_is_discarded() {
        let graph = MemoryGraph::new();
        let mut tx = graph.begin().await.unwrap();
        tx.run(&statement::create_user(&User::new("bob"))).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(graph.user_count().await, 0);
        assert_eq!(graph.rollbacks(), 1);
        assert_eq!(graph.commits(), 0);
    }

    #[tokio::test]
    async fn execute_fault_fires_once() {
        let graph = MemoryGraph::new();
        graph.inject(Fault::execute(StatementKind::CreateUser));
        let stmt = statement::create_user(&User::new("carol"));
        assert!(matches!(
            graph.run(&stmt).await,
            Err(GraphError::Connection(_))
        ));
        assert_eq!(graph.user_count().await, 0);
        assert!(graph.run(&stmt).await.is_ok());
        assert_eq!(graph.user_count().await, 1);
    }

    #[tokio::test]
    async fn stream_fault_fails_after_rows() {
        let graph = MemoryGraph::new();
        graph.inject(Fault::stream(StatementKind::CountLinks, 1));
        let mut cursor = graph
            .run(&statement::count_links(&EntitlementId::new()))
            .await
            .unwrap();
        assert!(cursor.next().await.unwrap().is_some());
        assert!(cursor.next().await.is_err());
    }

    #[tokio::test]
    async fn unbound_parameters_are_rejected() {
        let graph = MemoryGraph::new();
        let stmt = Statement::new(StatementKind::CountLinks, "RETURN $entitlementID");
        assert!(matches!(
            graph.run(&stmt).await,
            Err(GraphError::Statement(_))
        ));
    }
}
