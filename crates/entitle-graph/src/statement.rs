//! Cypher query builder.
//!
//! One pure function per graph operation. Each returns a [`Statement`]:
//! static query text plus the parameters it references. Query text is a
//! `&'static str`, so data values only ever reach the store as bound
//! parameters.

use std::collections::{BTreeMap, BTreeSet};

use neo4rs::{BoltNull, BoltType};

use entitle_core::{EntitlementDefinition, EntitlementId, User, UserId};

/// Which operation a statement performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    CreateUser,
    CreateEntitlement,
    LinkEntitlement,
    EntitlementById,
    AllEntitlements,
    CountLinks,
}

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Int(i64),
    Text(String),
    TextList(Vec<String>),
}

impl ParamValue {
    /// The JSON form, as stored by the in-memory graph.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::TextList(items) => serde_json::Value::from(items.clone()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(v: Vec<String>) -> Self {
        Self::TextList(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<ParamValue> for BoltType {
    fn from(v: ParamValue) -> Self {
        match v {
            ParamValue::Null => BoltType::Null(BoltNull),
            ParamValue::Int(n) => BoltType::from(n),
            ParamValue::Text(s) => BoltType::from(s),
            ParamValue::TextList(items) => BoltType::from(items),
        }
    }
}

/// A parameterized Cypher statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    text: &'static str,
    params: BTreeMap<&'static str, ParamValue>,
}

impl Statement {
    pub fn new(kind: StatementKind, text: &'static str) -> Self {
        Self {
            kind,
            text,
            params: BTreeMap::new(),
        }
    }

    /// Bind `value` to `$key`.
    pub fn bind(mut self, key: &'static str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key, value.into());
        self
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    pub fn params(&self) -> &BTreeMap<&'static str, ParamValue> {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    /// Every `$name` the query text refers to.
    pub fn referenced_params(&self) -> BTreeSet<&'static str> {
        let text = self.text;
        let bytes = text.as_bytes();
        let mut names = BTreeSet::new();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start {
                    names.insert(&text[start..end]);
                }
                i = end;
            } else {
                i += 1;
            }
        }
        names
    }

    /// Referenced parameters with no bound value.
    pub fn unbound_params(&self) -> Vec<&'static str> {
        self.referenced_params()
            .into_iter()
            .filter(|name| !self.params.contains_key(name))
            .collect()
    }

    /// Convert into a `neo4rs` query with all parameters bound.
    pub fn to_query(&self) -> neo4rs::Query {
        self.params
            .iter()
            .fold(neo4rs::query(self.text), |q, (key, value)| {
                q.param(key, BoltType::from(value.clone()))
            })
    }
}

// ── Cypher ───────────────────────────────────────────────────────

const CREATE_USER: &str = "CREATE (user:user)
     SET user.userID = $id,
         user.name = $name
     RETURN user.userID AS id";

const CREATE_ENTITLEMENT: &str = "CREATE (et:entitlement)
     SET et.entitlementID = $id,
         et.effectiveDate = $effectiveDate,
         et.termDate = $termDate,
         et.createdBy = $createdBy,
         et.createdTs = $createdTs,
         et.modifiedBy = $modifiedBy,
         et.modifiedTs = $modifiedTs,
         et.roles = $roles";

const LINK_ENTITLEMENT: &str = "MATCH (et:entitlement), (usr:user)
     WHERE et.entitlementID = $etID AND usr.userID = $userID
     CREATE (et)-[:ASSOCIATED_TO]->(usr)
     RETURN et.entitlementID AS id";

// Every entitlement read returns the same columns; see `decode::EntitlementRow`.
const ENTITLEMENT_BY_ID: &str = "MATCH (et:entitlement)
     WHERE et.entitlementID = $entitlementID
     RETURN et.entitlementID AS id,
            head([(et)-[:ASSOCIATED_TO]->(usr:user) | usr.userID]) AS userID,
            et.effectiveDate AS effectiveDate,
            et.termDate AS termDate,
            et.createdBy AS createdBy,
            et.createdTs AS createdTs,
            et.modifiedBy AS modifiedBy,
            et.modifiedTs AS modifiedTs,
            et.roles AS roles";

const ALL_ENTITLEMENTS: &str = "MATCH (et:entitlement)
     RETURN et.entitlementID AS id,
            head([(et)-[:ASSOCIATED_TO]->(usr:user) | usr.userID]) AS userID,
            et.effectiveDate AS effectiveDate,
            et.termDate AS termDate,
            et.createdBy AS createdBy,
            et.createdTs AS createdTs,
            et.modifiedBy AS modifiedBy,
            et.modifiedTs AS modifiedTs,
            et.roles AS roles";

const COUNT_LINKS: &str = "MATCH (et:entitlement)-[r:ASSOCIATED_TO]->(:user)
     WHERE et.entitlementID = $entitlementID
     RETURN count(r) AS links";

// ── Builders ─────────────────────────────────────────────────────

/// Create a user node.
pub fn create_user(user: &User) -> Statement {
    Statement::new(StatementKind::CreateUser, CREATE_USER)
        .bind("id", user.id.to_string())
        .bind("name", user.name.as_str())
}

/// Create an entitlement node with every scalar field set.
pub fn create_entitlement(et: &EntitlementDefinition) -> Statement {
    Statement::new(StatementKind::CreateEntitlement, CREATE_ENTITLEMENT)
        .bind("id", et.id.to_string())
        .bind("effectiveDate", et.effective_date.timestamp())
        .bind("termDate", et.term_date.timestamp())
        .bind("createdBy", et.created_by.as_str())
        .bind("createdTs", et.created_ts.timestamp())
        .bind("modifiedBy", et.modified_by.clone())
        .bind("modifiedTs", et.modified_ts.map(|ts| ts.timestamp()))
        .bind("roles", et.roles.clone())
}

/// Link an entitlement to its user. Yields one row per edge created.
pub fn link_entitlement(entitlement_id: &EntitlementId, user_id: &UserId) -> Statement {
    Statement::new(StatementKind::LinkEntitlement, LINK_ENTITLEMENT)
        .bind("etID", entitlement_id.to_string())
        .bind("userID", user_id.to_string())
}

/// Match one entitlement by id.
pub fn entitlement_by_id(entitlement_id: &EntitlementId) -> Statement {
    Statement::new(StatementKind::EntitlementById, ENTITLEMENT_BY_ID)
        .bind("entitlementID", entitlement_id.to_string())
}

/// Match every entitlement.
pub fn all_entitlements() -> Statement {
    Statement::new(StatementKind::AllEntitlements, ALL_ENTITLEMENTS)
}

/// Count `ASSOCIATED_TO` edges leaving an entitlement.
pub fn count_links(entitlement_id: &EntitlementId) -> Statement {
    Statement::new(StatementKind::CountLinks, COUNT_LINKS)
        .bind("entitlementID", entitlement_id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn definition() -> EntitlementDefinition {
        EntitlementDefinition::new(UserId::new(), Utc::now(), Utc::now(), "test")
            .with_roles(["viewer"])
    }

    fn all_statements() -> Vec<Statement> {
        let et = definition();
        vec![
            create_user(&User::new("alice")),
            create_entitlement(&et),
            link_entitlement(&et.id, &UserId::new()),
            entitlement_by_id(&et.id),
            all_entitlements(),
            count_links(&et.id),
        ]
    }

    #[test]
    fn param_keys_match_query_references() {
        for stmt in all_statements() {
            let bound: BTreeSet<&str> = stmt.params().keys().copied().collect();
            assert_eq!(
                stmt.referenced_params(),
                bound,
                "{:?} binds a different key set than it references",
                stmt.kind()
            );
        }
    }

    #[test]
    fn values_never_reach_query_text() {
        let mut et = definition();
        et.created_by = "x' }) DETACH DELETE et //".to_string();
        let stmt = create_entitlement(&et);
        assert_eq!(stmt.text(), CREATE_ENTITLEMENT);
        assert!(!stmt.text().contains("DETACH"));
        assert_eq!(
            stmt.param("createdBy"),
            Some(&ParamValue::Text(et.created_by.clone()))
        );
    }

    #[test]
    fn optional_fields_bind_as_null() {
        let stmt = create_entitlement(&definition());
        assert_eq!(stmt.param("modifiedBy"), Some(&ParamValue::Null));
        assert_eq!(stmt.param("modifiedTs"), Some(&ParamValue::Null));
    }

    #[test]
    fn timestamps_bind_as_unix_seconds() {
        let et = definition();
        let stmt = create_entitlement(&et);
        assert_eq!(
            stmt.param("createdTs"),
            Some(&ParamValue::Int(et.created_ts.timestamp()))
        );
        assert_eq!(
            stmt.param("roles"),
            Some(&ParamValue::TextList(vec!["viewer".to_string()]))
        );
    }

    #[test]
    fn link_matches_by_both_ids() {
        let et_id = EntitlementId::new();
        let user_id = UserId::new();
        let stmt = link_entitlement(&et_id, &user_id);
        assert!(stmt.text().contains("ASSOCIATED_TO"));
        assert_eq!(
            stmt.param("etID").and_then(ParamValue::as_text),
            Some(et_id.to_string().as_str())
        );
        assert_eq!(
            stmt.param("userID").and_then(ParamValue::as_text),
            Some(user_id.to_string().as_str())
        );
    }

    #[test]
    fn unbound_params_are_reported() {
        let stmt = Statement::new(StatementKind::CountLinks, COUNT_LINKS);
        assert_eq!(stmt.unbound_params(), vec!["entitlementID"]);
    }
}
