use crate::types::push::{NewSubscription, PushSubscription};

use futures_util::future::BoxFuture;

/// Storage of push endpoints. One row per endpoint.
pub trait SubscriptionRegistry: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// Inserts the subscription, or rebinds the row that already holds the
    /// same endpoint.
    fn upsert(
        &self,
        subscription: NewSubscription,
    ) -> BoxFuture<'_, Result<PushSubscription, Self::Error>>;

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PushSubscription>, Self::Error>>;

    /// Returns whether a row was removed.
    fn delete<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, Result<bool, Self::Error>>;
}
