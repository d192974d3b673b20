//! User registration.

use entitle_core::User;

use crate::boundary::{Cursor, Session};
use crate::client::GraphError;
use crate::statement;

/// Creates user nodes with one statement each, no explicit transaction.
pub struct UserRegistrar<S> {
    session: S,
}

impl<S: Session> UserRegistrar<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }

    /// Create a user node. Execution errors propagate unchanged; an empty
    /// result is not an error.
    pub async fn add(&self, user: &User) -> Result<(), GraphError> {
        let mut cursor = self.session.run(&statement::create_user(user)).await?;
        if cursor.next().await?.is_none() {
            tracing::debug!(user_id = %user.id, "User creation returned no row");
        }
        tracing::info!(user_id = %user.id, "Registered user");
        Ok(())
    }
}
