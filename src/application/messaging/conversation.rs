//! Interactive conversations - routes a user's next message to a waiting collector

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::application::errors::CollectError;
use crate::domain::entities::User;
use crate::domain::traits::{Bot, ReplyCollector};

type Waiting = HashMap<String, (Uuid, oneshot::Sender<String>)>;

/// Sends prompts over direct messages and hands the user's next reply back.
///
/// At most one conversation is open per user. The adapter calls [`offer`]
/// for every incoming direct message; a message that completes a
/// conversation is not dispatched as a command.
///
/// [`offer`]: ConversationRouter::offer
pub struct ConversationRouter {
    bot: Arc<dyn Bot>,
    waiting: Mutex<Waiting>,
}

/// Closes the conversation when the collecting future finishes or is dropped
struct Ticket<'a> {
    router: &'a ConversationRouter,
    user_id: String,
    id: Uuid,
}

impl Drop for Ticket<'_> {
    fn drop(&mut self) {
        let mut waiting = self.router.lock();
        if waiting.get(&self.user_id).map(|(id, _)| *id) == Some(self.id) {
            waiting.remove(&self.user_id);
        }
    }
}

impl ConversationRouter {
    pub fn new(bot: Arc<dyn Bot>) -> Self {
        Self {
            bot,
            waiting: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Waiting> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_waiting(&self, user_id: &str) -> bool {
        self.lock().contains_key(user_id)
    }

    /// Deliver `text` to the conversation open for `user_id`.
    ///
    /// Returns `false` when no conversation was waiting.
    pub fn offer(&self, user_id: &str, text: impl Into<String>) -> bool {
        let Some((_, reply)) = self.lock().remove(user_id) else {
            return false;
        };
        reply.send(text.into()).is_ok()
    }

    /// Abandon the conversation open for `user_id`, failing its collector
    pub fn cancel(&self, user_id: &str) -> bool {
        self.lock().remove(user_id).is_some()
    }
}

#[async_trait]
impl ReplyCollector for ConversationRouter {
    async fn collect(&self, user: &User, prompt: &str) -> Result<String, CollectError> {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        {
            let mut waiting = self.lock();
            if waiting.contains_key(&user.id) {
                return Err(CollectError::Unavailable(format!(
                    "already waiting for a reply from {}",
                    user
                )));
            }
            waiting.insert(user.id.clone(), (id, tx));
        }
        let _ticket = Ticket {
            router: self,
            user_id: user.id.clone(),
            id,
        };

        self.bot
            .send_direct(&user.id, prompt)
            .await
            .map_err(|e| CollectError::Unavailable(e.to_string()))?;
        debug!("Waiting for a reply from {}", user);

        rx.await.map_err(|_| CollectError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::errors::BotError;
    use crate::domain::traits::BotInfo;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingBot {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Bot for RecordingBot {
        async fn start(&self) -> Result<(), BotError> {
            Ok(())
        }

        async fn send_message(&self, _channel_id: &str, _text: &str) -> Result<String, BotError> {
            Ok(String::new())
        }

        async fn send_direct(&self, user_id: &str, text: &str) -> Result<String, BotError> {
            self.sent.lock().unwrap().push((user_id.to_string(), text.to_string()));
            Ok(String::new())
        }

        fn bot_info(&self) -> BotInfo {
            BotInfo {
                id: "bot".into(),
                name: "test".into(),
                username: "test".into(),
            }
        }
    }

    async fn offer_when_waiting(router: &ConversationRouter, user_id: &str, text: &str) -> bool {
        while !router.is_waiting(user_id) {
            tokio::task::yield_now().await;
        }
        router.offer(user_id, text)
    }

    #[tokio::test]
    async fn test_reply_reaches_collector() {
        let bot = Arc::new(RecordingBot::default());
        let router = ConversationRouter::new(bot.clone());
        let user = User::new("7");

        let (reply, delivered) = tokio::join!(
            router.collect(&user, "Send the source"),
            offer_when_waiting(&router, "7", "reply: hi"),
        );
        assert!(delivered);
        assert_eq!(reply.unwrap(), "reply: hi");
        assert!(!router.is_waiting("7"));
        assert_eq!(bot.sent.lock().unwrap()[0], ("7".to_string(), "Send the source".to_string()));
    }

    #[tokio::test]
    async fn test_dropped_collector_closes_conversation() {
        let router = ConversationRouter::new(Arc::new(RecordingBot::default()));
        let user = User::new("7");

        let timed_out = tokio::time::timeout(Duration::from_millis(20), router.collect(&user, "p")).await;
        assert!(timed_out.is_err());
        assert!(!router.is_waiting("7"));
        assert!(!router.offer("7", "late reply"));
    }

    #[tokio::test]
    async fn test_cancel_fails_collector() {
        let router = ConversationRouter::new(Arc::new(RecordingBot::default()));
        let user = User::new("7");

        let cancel = async {
            while !router.is_waiting("7") {
                tokio::task::yield_now().await;
            }
            router.cancel("7")
        };
        let (reply, cancelled) = tokio::join!(router.collect(&user, "p"), cancel);
        assert!(cancelled);
        assert_eq!(reply.unwrap_err(), CollectError::Cancelled);
    }
}
