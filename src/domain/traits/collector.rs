use async_trait::async_trait;

use crate::application::errors::CollectError;
use crate::domain::entities::User;

/// Collects a single free-text reply from a user, usually over direct messages.
///
/// Implementations do not apply a deadline; callers wrap `collect` in a
/// timeout and dropping the future must abandon the conversation.
#[async_trait]
pub trait ReplyCollector: Send + Sync {
    async fn collect(&self, user: &User, prompt: &str) -> Result<String, CollectError>;
}
