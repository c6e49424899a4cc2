use crate::ports::directory::Directory;
use crate::ports::presenter::{MessageAlert, Presenter};
use crate::types::messaging::{ANONYMOUS_SENDER, Message};

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

const PREVIEW_CHARS: usize = 120;

/// What happened to one feed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    OwnMessage,
    UnknownConversation,
    NotParticipant,
    LookupFailed,
    Presented { native: bool },
}

/// Live subscription to message inserts for one signed-in user.
///
/// Released by [`FeedSubscription::unsubscribe`] or on drop. Releasing drops
/// the feed receiver, which closes the upstream connection.
#[derive(Debug)]
pub struct FeedSubscription {
    user_id: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FeedSubscription {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        let _ = self.stop.send(true);
        self.handle.abort();
        tracing::debug!(user_id = %self.user_id, "message feed released");
    }
}

#[derive(Debug, Clone)]
pub struct ChangeFeedListener<D, P> {
    directory: D,
    presenter: P,
}

impl<D, P> ChangeFeedListener<D, P>
where
    D: Directory,
    P: Presenter,
{
    pub fn new(directory: D, presenter: P) -> Self {
        Self {
            directory,
            presenter,
        }
    }

    /// Starts handling inserts from `feed` on behalf of `user_id`. Events are
    /// handled concurrently; nothing is deduplicated.
    pub fn subscribe(&self, user_id: &str, feed: mpsc::Receiver<Message>) -> FeedSubscription {
        let (stop, stop_rx) = watch::channel(false);
        let listener = self.clone();
        let user = user_id.to_string();
        let handle = tokio::spawn(async move {
            listener.run(user, feed, stop_rx).await;
        });
        tracing::info!(user_id, "message feed subscribed");
        FeedSubscription {
            user_id: user_id.to_string(),
            stop,
            handle,
        }
    }

    async fn run(
        self,
        user_id: String,
        mut feed: mpsc::Receiver<Message>,
        mut stop: watch::Receiver<bool>,
    ) {
        // Dropping the set aborts handlers still in flight.
        let mut in_flight = JoinSet::new();
        loop {
            tokio::select! {
                _ = stop.changed() => break,
                event = feed.recv() => {
                    let Some(message) = event else {
                        tracing::info!(user_id = %user_id, "message feed closed");
                        break;
                    };
                    let listener = self.clone();
                    let user_id = user_id.clone();
                    in_flight.spawn(async move { listener.handle(&user_id, &message).await });
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }
        if !*stop.borrow() {
            while in_flight.join_next().await.is_some() {}
        }
    }

    pub async fn handle(&self, user_id: &str, message: &Message) -> Outcome {
        if message.sender_id == user_id {
            return Outcome::OwnMessage;
        }

        let conversation = match self.directory.conversation(&message.conversation_id).await {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return Outcome::UnknownConversation,
            Err(err) => {
                tracing::warn!(
                    conversation_id = %message.conversation_id,
                    error = %err,
                    "conversation lookup failed"
                );
                return Outcome::LookupFailed;
            }
        };
        if !conversation.has_participant(user_id) {
            return Outcome::NotParticipant;
        }

        let sender_name = match self.directory.profile(&message.sender_id).await {
            Ok(Some(profile)) => profile.display_name().to_string(),
            Ok(None) => ANONYMOUS_SENDER.to_string(),
            Err(err) => {
                tracing::warn!(sender_id = %message.sender_id, error = %err, "profile lookup failed");
                ANONYMOUS_SENDER.to_string()
            }
        };

        let alert = MessageAlert {
            message_id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            title: format!("Nuevo mensaje de {sender_name}"),
            body: preview(&message.content),
            sender_name,
        };
        self.presenter.toast(&alert);
        let native = !self.presenter.is_visible();
        if native {
            self.presenter.notify(&alert);
        }
        Outcome::Presented { native }
    }
}

fn preview(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let mut cut: String = content.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::messaging::{Conversation, Profile};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use time::OffsetDateTime;

    #[derive(Clone, Default)]
    struct TestPresenter {
        visible: Arc<AtomicBool>,
        toasts: Arc<Mutex<Vec<MessageAlert>>>,
        natives: Arc<Mutex<Vec<MessageAlert>>>,
    }

    impl Presenter for TestPresenter {
        fn is_visible(&self) -> bool {
            self.visible.load(Ordering::SeqCst)
        }

        fn toast(&self, alert: &MessageAlert) {
            self.toasts.lock().expect("toasts lock").push(alert.clone());
        }

        fn notify(&self, alert: &MessageAlert) {
            self.natives.lock().expect("natives lock").push(alert.clone());
        }
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::default();
        store
            .insert_conversation(Conversation {
                id: "c1".to_string(),
                animal_id: "a1".to_string(),
                adopter_id: "adopter".to_string(),
                publisher_id: "publisher".to_string(),
                created_at: OffsetDateTime::UNIX_EPOCH,
            })
            .expect("insert conversation");
        store
            .insert_profile(Profile {
                id: "adopter".to_string(),
                email: Some("marta@example.com".to_string()),
                ..Default::default()
            })
            .expect("insert profile");
        store
    }

    fn message(conversation_id: &str, sender_id: &str) -> Message {
        Message {
            id: format!("m-{sender_id}"),
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: "¿Sigue disponible?".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[tokio::test]
    async fn handle__should_ignore_own_messages() {
        // Given
        let presenter = TestPresenter::default();
        let listener = ChangeFeedListener::new(store(), presenter.clone());

        // When
        let outcome = listener.handle("adopter", &message("c1", "adopter")).await;

        // Then
        assert_eq!(outcome, Outcome::OwnMessage);
        assert!(presenter.toasts.lock().expect("toasts lock").is_empty());
    }

    #[tokio::test]
    async fn handle__should_ignore_conversations_of_other_users() {
        // Given
        let presenter = TestPresenter::default();
        let listener = ChangeFeedListener::new(store(), presenter.clone());

        // When
        let outcome = listener.handle("stranger", &message("c1", "adopter")).await;

        // Then
        assert_eq!(outcome, Outcome::NotParticipant);
        assert!(presenter.toasts.lock().expect("toasts lock").is_empty());
        assert!(presenter.natives.lock().expect("natives lock").is_empty());
    }

    #[tokio::test]
    async fn handle__should_drop_unknown_conversation_silently() {
        // Given
        let presenter = TestPresenter::default();
        let listener = ChangeFeedListener::new(store(), presenter.clone());

        // When
        let outcome = listener.handle("publisher", &message("missing", "adopter")).await;

        // Then
        assert_eq!(outcome, Outcome::UnknownConversation);
        assert!(presenter.toasts.lock().expect("toasts lock").is_empty());
    }

    #[tokio::test]
    async fn handle__should_toast_and_notify_when_hidden() {
        // Given
        let presenter = TestPresenter::default();
        let listener = ChangeFeedListener::new(store(), presenter.clone());

        // When
        let outcome = listener.handle("publisher", &message("c1", "adopter")).await;

        // Then
        assert_eq!(outcome, Outcome::Presented { native: true });
        let toasts = presenter.toasts.lock().expect("toasts lock").clone();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].title, "Nuevo mensaje de marta");
        assert_eq!(toasts[0].body, "¿Sigue disponible?");
        assert_eq!(presenter.natives.lock().expect("natives lock").len(), 1);
    }

    #[tokio::test]
    async fn handle__should_only_toast_when_visible() {
        // Given
        let presenter = TestPresenter::default();
        presenter.visible.store(true, Ordering::SeqCst);
        let listener = ChangeFeedListener::new(store(), presenter.clone());

        // When
        let outcome = listener.handle("adopter", &message("c1", "publisher")).await;

        // Then
        assert_eq!(outcome, Outcome::Presented { native: false });
        let toasts = presenter.toasts.lock().expect("toasts lock").clone();
        assert_eq!(toasts[0].sender_name, ANONYMOUS_SENDER);
        assert!(presenter.natives.lock().expect("natives lock").is_empty());
    }

    #[tokio::test]
    async fn subscribe__should_present_feed_events_until_unsubscribed() {
        // Given
        let presenter = TestPresenter::default();
        let listener = ChangeFeedListener::new(store(), presenter.clone());
        let (tx, rx) = mpsc::channel(8);
        let subscription = listener.subscribe("publisher", rx);

        // When
        tx.send(message("c1", "adopter")).await.expect("send");
        for _ in 0..50 {
            if !presenter.toasts.lock().expect("toasts lock").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        subscription.unsubscribe();

        // Then
        assert_eq!(presenter.toasts.lock().expect("toasts lock").len(), 1);
        tokio::time::timeout(Duration::from_secs(1), tx.closed())
            .await
            .expect("feed released");
    }

    #[test]
    fn preview__should_truncate_long_messages() {
        let long = "a".repeat(200);

        let cut = preview(&long);

        assert_eq!(cut.chars().count(), PREVIEW_CHARS + 1);
        assert!(cut.ends_with('…'));
    }
}
