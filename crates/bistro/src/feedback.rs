//! Feedback submission.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::auth::AuthGateway;
use crate::error::{Error, Result};
use crate::store::{server_timestamp, to_fields, DocumentStore, FEEDBACK};

const SEND_FEEDBACK: &str = "User must be logged in to send feedback";

/// Append-only feedback sink.
#[derive(Debug, Clone)]
pub struct FeedbackSink {
    store: Arc<dyn DocumentStore>,
    auth: AuthGateway,
}

impl FeedbackSink {
    /// Create a feedback sink.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, auth: AuthGateway) -> Self {
        Self { store, auth }
    }

    /// Submit feedback as the signed-in user. Returns the feedback id.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank feedback,
    /// [`Error::NotAuthenticated`] when nobody is signed in, or a store error.
    pub async fn submit(&self, body: &str) -> Result<String> {
        let user = self.auth.require_user(SEND_FEEDBACK)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(Error::validation("feedback", "Please enter your feedback"));
        }

        let fields = to_fields(&json!({
            "userId": user.uid,
            "feedback": body,
            "timestamp": server_timestamp(),
        }))?;
        let id = self
            .store
            .add(FEEDBACK, fields)
            .await
            .map_err(Error::into_store)?;

        info!("Stored feedback {} from {}", id, user.uid);
        Ok(id)
    }
}
