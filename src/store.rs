//! Backing storage for push subscriptions, conversations and profiles.
//!
//! [`Store::Memory`] keeps everything in process and is used for local runs
//! and tests. [`Store::Rest`] talks to the hosted database's REST endpoint
//! with the privileged service credential.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestBackend;

use crate::ports::directory::Directory;
use crate::ports::registry::SubscriptionRegistry;
use crate::types::messaging::{Conversation, Profile};
use crate::types::push::{NewSubscription, PushSubscription};

use futures_util::future::BoxFuture;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend returned no rows for an upsert")]
    EmptyUpsert,
    #[error("service key is not a valid header value")]
    InvalidServiceKey,
    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone)]
pub enum Store {
    Memory(MemoryStore),
    Rest(RestBackend),
}

impl Default for Store {
    fn default() -> Self {
        Self::Memory(MemoryStore::default())
    }
}

impl SubscriptionRegistry for Store {
    type Error = StoreError;

    fn upsert(
        &self,
        subscription: NewSubscription,
    ) -> BoxFuture<'_, Result<PushSubscription, Self::Error>> {
        match self {
            Self::Memory(store) => store.upsert(subscription),
            Self::Rest(backend) => backend.upsert(subscription),
        }
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PushSubscription>, Self::Error>> {
        match self {
            Self::Memory(store) => store.list_for_user(user_id),
            Self::Rest(backend) => backend.list_for_user(user_id),
        }
    }

    fn delete<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, Result<bool, Self::Error>> {
        match self {
            Self::Memory(store) => store.delete(subscription_id),
            Self::Rest(backend) => backend.delete(subscription_id),
        }
    }
}

impl Directory for Store {
    type Error = StoreError;

    fn conversation<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Conversation>, Self::Error>> {
        match self {
            Self::Memory(store) => store.conversation(conversation_id),
            Self::Rest(backend) => backend.conversation(conversation_id),
        }
    }

    fn profile<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Profile>, Self::Error>> {
        match self {
            Self::Memory(store) => store.profile(user_id),
            Self::Rest(backend) => backend.profile(user_id),
        }
    }

    fn profiles_in_province<'a>(
        &'a self,
        province: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Profile>, Self::Error>> {
        match self {
            Self::Memory(store) => store.profiles_in_province(province),
            Self::Rest(backend) => backend.profiles_in_province(province),
        }
    }
}
