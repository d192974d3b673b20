//! Entitlement repository: the transactional write path and the read paths.

use async_trait::async_trait;
use serde::Deserialize;

use entitle_core::{EntitlementDefinition, EntitlementId, UserId};

use crate::boundary::{Cursor, Record, Session, Transaction};
use crate::client::GraphError;
use crate::decode::{self, LinkCountRow};
use crate::statement;
use crate::unit_of_work::{write_transaction, Completion, UnitOfWork};

/// Errors from repository operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Entitlement {entitlement_id} has no user to associate with")]
    MissingUser { entitlement_id: EntitlementId },

    #[error("Entitlement {entitlement_id} could not be linked to user {user_id}")]
    UserNotLinked {
        entitlement_id: EntitlementId,
        user_id: UserId,
    },

    #[error("Read interrupted after {} rows: {source}", .partial.len())]
    Interrupted {
        partial: Vec<EntitlementDefinition>,
        #[source]
        source: GraphError,
    },
}

/// What `add` does when the link step matches no user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPolicy {
    /// Commit anyway and report [`LinkStatus::Unlinked`].
    #[default]
    Lenient,
    /// Roll back and fail with [`RepositoryError::UserNotLinked`].
    Strict,
}

/// Repository settings, loaded from the `[repository]` config section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub link_policy: LinkPolicy,
}

/// Result of a committed `add`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The `ASSOCIATED_TO` edge was created.
    Linked,
    /// The node was committed without an edge (lenient policy only).
    Unlinked,
}

/// Repository for entitlement definitions over a session boundary.
pub struct EntitlementRepository<S> {
    session: S,
    link_policy: LinkPolicy,
}

impl<S: Session> EntitlementRepository<S> {
    /// A repository using the lenient link policy.
    pub fn new(session: S) -> Self {
        Self {
            session,
            link_policy: LinkPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: &RepositoryConfig) -> Self {
        self.link_policy = config.link_policy;
        self
    }

    pub fn with_link_policy(mut self, policy: LinkPolicy) -> Self {
        self.link_policy = policy;
        self
    }

    /// Create the entitlement node and link it to its user in one transaction.
    ///
    /// The user must already exist. If creating the node or the edge fails,
    /// nothing is persisted. When the link step matches no user, the outcome
    /// depends on the configured [`LinkPolicy`].
    pub async fn add(&self, et: &EntitlementDefinition) -> Result<LinkStatus, RepositoryError> {
        let user_id = et
            .user_id
            .as_ref()
            .ok_or_else(|| RepositoryError::MissingUser {
                entitlement_id: et.id.clone(),
            })?;

        let work = AddEntitlement {
            et,
            user_id,
            policy: self.link_policy,
        };
        let status = write_transaction(&self.session, work).await?;

        tracing::info!(
            entitlement_id = %et.id,
            user_id = %user_id,
            status = ?status,
            "Entitlement committed"
        );
        Ok(status)
    }

    /// Fetch one entitlement by id. `Ok(None)` when it does not exist.
    pub async fn get(
        &self,
        id: &EntitlementId,
    ) -> Result<Option<EntitlementDefinition>, RepositoryError> {
        let mut cursor = self.session.run(&statement::entitlement_by_id(id)).await?;
        match cursor.next().await? {
            Some(record) => Ok(Some(decode::entitlement(&record).map_err(GraphError::from)?)),
            None => Ok(None),
        }
    }

    /// Fetch every entitlement, in store order.
    ///
    /// If the cursor fails part way, the rows decoded so far are returned in
    /// [`RepositoryError::Interrupted`].
    pub async fn get_all(&self) -> Result<Vec<EntitlementDefinition>, RepositoryError> {
        let mut cursor = self.session.run(&statement::all_entitlements()).await?;
        let mut ets = Vec::new();
        loop {
            let step = match cursor.next().await {
                Ok(Some(record)) => decode::entitlement(&record).map_err(GraphError::from),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            match step {
                Ok(et) => ets.push(et),
                Err(source) => {
                    tracing::warn!(rows = ets.len(), error = %source, "Entitlement read interrupted");
                    return Err(RepositoryError::Interrupted {
                        partial: ets,
                        source,
                    });
                }
            }
        }
        tracing::debug!(rows = ets.len(), "Fetched entitlements");
        Ok(ets)
    }

    /// Number of `ASSOCIATED_TO` edges leaving the entitlement.
    pub async fn count_links(&self, id: &EntitlementId) -> Result<i64, RepositoryError> {
        let mut cursor = self.session.run(&statement::count_links(id)).await?;
        match cursor.next().await? {
            Some(record) => Ok(record
                .decode::<LinkCountRow>()
                .map_err(GraphError::from)?
                .links),
            None => Ok(0),
        }
    }
}

/// Node creation followed by the link step.
struct AddEntitlement<'a> {
    et: &'a EntitlementDefinition,
    user_id: &'a UserId,
    policy: LinkPolicy,
}

#[async_trait]
impl<'a> UnitOfWork for AddEntitlement<'a> {
    type Output = LinkStatus;
    type Error = RepositoryError;

    async fn perform<T: Transaction>(
        self,
        tx: &mut T,
    ) -> Result<Completion<LinkStatus, RepositoryError>, RepositoryError> {
        tx.run(&statement::create_entitlement(self.et)).await?;
        tracing::debug!(entitlement_id = %self.et.id, "Created entitlement node");

        let linked = tx
            .run(&statement::link_entitlement(&self.et.id, self.user_id))
            .await?;
        if !linked.is_empty() {
            tracing::debug!(entitlement_id = %self.et.id, edges = linked.len(), "Linked entitlement");
            return Ok(Completion::Commit(LinkStatus::Linked));
        }

        match self.policy {
            LinkPolicy::Lenient => {
                tracing::warn!(
                    entitlement_id = %self.et.id,
                    user_id = %self.user_id,
                    "Link step matched no user; committing entitlement without an edge"
                );
                Ok(Completion::Commit(LinkStatus::Unlinked))
            }
            LinkPolicy::Strict => Ok(Completion::Rollback(RepositoryError::UserNotLinked {
                entitlement_id: self.et.id.clone(),
                user_id: self.user_id.clone(),
            })),
        }
    }
}
