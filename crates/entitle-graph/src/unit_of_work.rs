//! Scoped write transactions.
//!
//! A [`UnitOfWork`] receives the open transaction by mutable reference and
//! can only run statements on it. It reports how the transaction should end
//! through [`Completion`]; [`write_transaction`] then performs exactly one of
//! commit or rollback before returning, including when the unit fails early.

use async_trait::async_trait;

use crate::boundary::{Session, Transaction};
use crate::client::GraphError;

/// How a unit of work wants its transaction to end.
#[derive(Debug)]
pub enum Completion<T, E> {
    Commit(T),
    Rollback(E),
}

/// Work performed inside one write transaction.
#[async_trait]
pub trait UnitOfWork: Send {
    type Output: Send;
    type Error: From<GraphError> + Send;

    async fn perform<T: Transaction>(
        self,
        tx: &mut T,
    ) -> Result<Completion<Self::Output, Self::Error>, Self::Error>;
}

/// Run `work` in a fresh transaction on `session`.
///
/// Commits on `Completion::Commit`; rolls back on `Completion::Rollback` or
/// on error. A failed rollback is logged and the original error returned.
pub async fn write_transaction<S, W>(session: &S, work: W) -> Result<W::Output, W::Error>
where
    S: Session,
    W: UnitOfWork,
{
    let mut tx = session.begin().await?;

    let outcome = work.perform(&mut tx).await;
    match outcome {
        Ok(Completion::Commit(output)) => {
            tx.commit().await?;
            Ok(output)
        }
        Ok(Completion::Rollback(err)) | Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
