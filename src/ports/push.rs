use crate::types::push::PushSubscription;

/// Failure reported by a push delivery attempt.
pub trait DeliveryError: std::fmt::Display + Send + Sync + 'static {
    /// True when the provider says the endpoint no longer exists.
    fn is_gone(&self) -> bool;
}

pub trait PushSender: Clone + Send + Sync + 'static {
    type Error: DeliveryError;
    type Fut<'a>: Future<Output = Result<(), Self::Error>> + Send + 'a
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a [u8]) -> Self::Fut<'a>;
}
