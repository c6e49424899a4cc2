use crate::types::messaging::{Conversation, Profile};

use futures_util::future::BoxFuture;

/// Read access to the conversation and profile tables.
pub trait Directory: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    fn conversation<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Conversation>, Self::Error>>;

    fn profile<'a>(&'a self, user_id: &'a str)
    -> BoxFuture<'a, Result<Option<Profile>, Self::Error>>;

    fn profiles_in_province<'a>(
        &'a self,
        province: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Profile>, Self::Error>>;
}
