/// What the page shows for an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAlert {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_name: String,
    pub title: String,
    pub body: String,
}

/// The page side of the listener: toasts, native notifications and
/// visibility.
pub trait Presenter: Clone + Send + Sync + 'static {
    fn is_visible(&self) -> bool;
    fn toast(&self, alert: &MessageAlert);
    fn notify(&self, alert: &MessageAlert);
}
