//! Per-message handling: decode, validate, persist, checkpoint.

use crate::config::Action;
use crate::error::UserError;
use crate::kafka::{CheckpointManager, KafkaMessage};
use crate::model::{Envelope, User, UserState};
use crate::store::{UserGateway, WriteOutcome};
use crate::Error;
use tracing::{debug, error, info, warn};

/// Terminal outcome of one message.
#[derive(Debug)]
pub enum Outcome {
    /// A statement was written.
    Persisted,
    /// Nothing to write.
    NoOp,
    /// Decode or validation failure; nothing was written.
    Rejected(UserError),
    /// Persistence failed; the message is dropped.
    Failed(Error),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Persisted => "persisted",
            Outcome::NoOp => "noop",
            Outcome::Rejected(_) => "rejected",
            Outcome::Failed(_) => "failed",
        }
    }
}

/// Result of processing one message.
#[derive(Debug)]
pub struct Processed {
    pub offset: i64,
    pub outcome: Outcome,
    /// Whether the checkpoint commit succeeded.
    pub committed: bool,
}

/// Applies one lifecycle action to each message and checkpoints it.
pub struct MessageProcessor {
    gateway: UserGateway,
    checkpoint: CheckpointManager,
    action: Action,
}

impl MessageProcessor {
    pub fn new(gateway: UserGateway, checkpoint: CheckpointManager, action: Action) -> Self {
        Self {
            gateway,
            checkpoint,
            action,
        }
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Split into the gateway and the checkpoint manager.
    pub fn into_parts(self) -> (UserGateway, CheckpointManager) {
        (self.gateway, self.checkpoint)
    }

    /// Handle `message` to a terminal outcome, then commit the next offset.
    ///
    /// The commit happens for every outcome, so a permanently bad message
    /// is consumed exactly once.
    pub async fn process(&self, message: &KafkaMessage) -> Processed {
        debug!(
            partition = message.partition,
            offset = message.offset,
            key = ?message.key_str(),
            value = ?message.value_str(),
            "Message received"
        );

        let outcome = match Envelope::decode(message.value.as_deref()) {
            Ok(envelope) => {
                debug!(
                    offset = message.offset,
                    version = ?envelope.version.as_ref().map(|v| v.as_str()),
                    login = ?envelope.data.login,
                    fields = ?envelope.data.present_fields(),
                    "Message decoded"
                );
                self.apply(envelope.data).await
            }
            Err(e) => Outcome::Rejected(e),
        };

        match &outcome {
            Outcome::Persisted => info!(
                offset = message.offset,
                action = %self.action,
                outcome = outcome.label(),
                "User persisted"
            ),
            Outcome::NoOp => debug!(
                offset = message.offset,
                action = %self.action,
                outcome = outcome.label(),
                "Nothing to write"
            ),
            Outcome::Rejected(e) => warn!(
                offset = message.offset,
                action = %self.action,
                outcome = outcome.label(),
                error = %e,
                "Message rejected"
            ),
            Outcome::Failed(e) => error!(
                offset = message.offset,
                action = %self.action,
                outcome = outcome.label(),
                error = %e,
                "Failed to persist user"
            ),
        }

        // Commit errors are logged by the checkpoint manager
        let committed = self.checkpoint.commit(message.next_offset()).await.is_ok();

        Processed {
            offset: message.offset,
            outcome,
            committed,
        }
    }

    async fn apply(&self, mut user: User) -> Outcome {
        let result = match self.action {
            Action::Create => {
                if let Err(e) = user.check_creatable() {
                    return Outcome::Rejected(e);
                }
                user.ensure_state(UserState::NEW);
                self.gateway.insert(&user).await.map(|()| WriteOutcome::Written)
            }
            Action::Update | Action::Remove if user.login.is_none() => {
                return Outcome::Rejected(UserError::Validation("login is required".into()));
            }
            Action::Update => self.gateway.update(&user).await,
            Action::Remove => self.gateway.remove(&mut user).await,
        };

        match result {
            Ok(WriteOutcome::Written) => Outcome::Persisted,
            Ok(WriteOutcome::NoOp) => Outcome::NoOp,
            Err(e) => Outcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OffsetPolicy;
    use crate::kafka::{CheckpointKey, MemoryOffsetStore};
    use crate::store::{MemoryUserStore, Value};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    fn fixed_clock() -> i64 {
        NOW
    }

    struct Harness {
        users: Arc<MemoryUserStore>,
        offsets: Arc<MemoryOffsetStore>,
        processor: MessageProcessor,
    }

    fn harness(action: Action) -> Harness {
        let users = Arc::new(MemoryUserStore::new());
        let offsets = Arc::new(MemoryOffsetStore::new());
        let gateway = UserGateway::new(users.clone(), "user").with_clock(fixed_clock);
        let checkpoint = CheckpointManager::new(
            offsets.clone(),
            CheckpointKey::new("g", "t", 0),
            OffsetPolicy::Oldest,
        );
        Harness {
            users,
            offsets,
            processor: MessageProcessor::new(gateway, checkpoint, action),
        }
    }

    fn committed(h: &Harness) -> Option<i64> {
        h.offsets
            .committed(&CheckpointKey::new("g", "t", 0))
            .map(|c| c.offset)
    }

    #[tokio::test]
    async fn test_create_persists_with_default_state() {
        let h = harness(Action::Create);
        let message = KafkaMessage::new(
            "t",
            0,
            4,
            r#"{"version":1,"data":{"login":"a","password":"p","name":"n","birthdate":"1000","emails":["a@b.c"]}}"#,
        );

        let processed = h.processor.process(&message).await;
        assert!(matches!(processed.outcome, Outcome::Persisted));
        assert!(processed.committed);
        assert_eq!(committed(&h), Some(5));

        let row = h.users.row("a").unwrap();
        assert_eq!(row.get("state"), Some(&Value::Int(1)));
        assert_eq!(row.get("created"), Some(&Value::Timestamp(NOW)));
        assert_eq!(row.get("modified"), Some(&Value::Timestamp(NOW)));
    }

    #[tokio::test]
    async fn test_create_keeps_supplied_state() {
        let h = harness(Action::Create);
        let message = KafkaMessage::new(
            "t",
            0,
            0,
            r#"{"data":{"login":"a","password":"p","name":"n","birthdate":1000,"emails":["a@b.c"],"state":"3"}}"#,
        );

        h.processor.process(&message).await;
        assert_eq!(h.users.row("a").unwrap().get("state"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_ineligible_create_is_committed_not_written() {
        let h = harness(Action::Create);
        let message = KafkaMessage::new(
            "t",
            0,
            9,
            r#"{"version":1,"data":{"login":"a","password":"p","name":"n","birthdate":"1000","emails":[]}}"#,
        );

        let processed = h.processor.process(&message).await;
        assert!(matches!(
            processed.outcome,
            Outcome::Rejected(UserError::Validation(_))
        ));
        assert_eq!(h.users.row_count(), 0);
        assert_eq!(committed(&h), Some(10));
    }

    #[tokio::test]
    async fn test_undecodable_message_is_committed() {
        let h = harness(Action::Create);
        let processed = h
            .processor
            .process(&KafkaMessage::new("t", 0, 0, "not json"))
            .await;
        assert!(matches!(processed.outcome, Outcome::Rejected(UserError::Decode(_))));
        assert_eq!(committed(&h), Some(1));

        let mut empty = KafkaMessage::new("t", 0, 1, "");
        empty.value = None;
        let processed = h.processor.process(&empty).await;
        assert!(matches!(processed.outcome, Outcome::Rejected(UserError::Decode(_))));
        assert_eq!(committed(&h), Some(2));
    }

    #[tokio::test]
    async fn test_store_failure_is_committed() {
        let h = harness(Action::Create);
        h.users.fail_next("write timeout");
        let message = KafkaMessage::new(
            "t",
            0,
            2,
            r#"{"data":{"login":"a","password":"p","name":"n","birthdate":"1000","emails":["a@b.c"]}}"#,
        );

        let processed = h.processor.process(&message).await;
        assert!(matches!(processed.outcome, Outcome::Failed(Error::Store(_))));
        assert_eq!(committed(&h), Some(3));
    }

    #[tokio::test]
    async fn test_malformed_number_is_a_persistence_failure() {
        let h = harness(Action::Create);
        let message = KafkaMessage::new(
            "t",
            0,
            0,
            r#"{"data":{"login":"a","password":"p","name":"n","birthdate":"abc","emails":["a@b.c"]}}"#,
        );

        let processed = h.processor.process(&message).await;
        assert!(matches!(
            processed.outcome,
            Outcome::Failed(Error::User(UserError::MalformedNumber { field: "birthdate", .. }))
        ));
        assert!(processed.committed);
    }

    #[tokio::test]
    async fn test_update_and_remove_need_login() {
        for action in [Action::Update, Action::Remove] {
            let h = harness(action);
            let processed = h
                .processor
                .process(&KafkaMessage::new("t", 0, 0, r#"{"data":{"name":"n"}}"#))
                .await;
            assert!(matches!(
                processed.outcome,
                Outcome::Rejected(UserError::Validation(_))
            ));
            assert!(h.users.statements().is_empty());
            assert_eq!(committed(&h), Some(1));
        }
    }

    #[tokio::test]
    async fn test_remove_soft_deletes() {
        let h = harness(Action::Remove);
        let processed = h
            .processor
            .process(&KafkaMessage::new("t", 0, 0, r#"{"data":{"login":"x"}}"#))
            .await;
        assert!(matches!(processed.outcome, Outcome::Persisted));

        let row = h.users.row("x").unwrap();
        assert_eq!(row.get("state"), Some(&Value::Int(16)));
        assert_eq!(row.get("modified"), Some(&Value::Timestamp(NOW)));
        assert_eq!(row.len(), 3);
    }

    #[tokio::test]
    async fn test_commit_failure_does_not_change_outcome() {
        let h = harness(Action::Update);
        h.offsets.fail_commits(true);

        let processed = h
            .processor
            .process(&KafkaMessage::new("t", 0, 0, r#"{"data":{"login":"x","name":"n"}}"#))
            .await;
        assert!(matches!(processed.outcome, Outcome::Persisted));
        assert!(!processed.committed);
        assert_eq!(committed(&h), None);
    }
}
