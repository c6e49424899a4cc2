use super::StoreError;
use crate::ports::directory::Directory;
use crate::ports::registry::SubscriptionRegistry;
use crate::types::messaging::{Conversation, Profile};
use crate::types::push::{NewSubscription, PushSubscription};

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use time::OffsetDateTime;

#[derive(Debug, Default)]
struct Tables {
    subscriptions: Vec<PushSubscription>,
    conversations: HashMap<String, Conversation>,
    profiles: HashMap<String, Profile>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        self.tables()?
            .conversations
            .insert(conversation.id.clone(), conversation);
        Ok(())
    }

    pub fn insert_profile(&self, profile: Profile) -> Result<(), StoreError> {
        self.tables()?.profiles.insert(profile.id.clone(), profile);
        Ok(())
    }

    fn upsert_now(&self, subscription: NewSubscription) -> Result<PushSubscription, StoreError> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables
            .subscriptions
            .iter_mut()
            .find(|row| row.endpoint == subscription.endpoint)
        {
            existing.user_id = subscription.user_id;
            existing.p256dh = subscription.p256dh;
            existing.auth = subscription.auth;
            return Ok(existing.clone());
        }

        let row = PushSubscription {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: subscription.user_id,
            endpoint: subscription.endpoint,
            p256dh: subscription.p256dh,
            auth: subscription.auth,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.subscriptions.push(row.clone());
        Ok(row)
    }

    fn list_now(&self, user_id: &str) -> Result<Vec<PushSubscription>, StoreError> {
        Ok(self
            .tables()?
            .subscriptions
            .iter()
            .filter(|row| row.user_id == user_id)
            .cloned()
            .collect())
    }

    fn delete_now(&self, subscription_id: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables()?;
        let before = tables.subscriptions.len();
        tables.subscriptions.retain(|row| row.id != subscription_id);
        Ok(tables.subscriptions.len() != before)
    }
}

impl SubscriptionRegistry for MemoryStore {
    type Error = StoreError;

    fn upsert(
        &self,
        subscription: NewSubscription,
    ) -> BoxFuture<'_, Result<PushSubscription, Self::Error>> {
        Box::pin(std::future::ready(self.upsert_now(subscription)))
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PushSubscription>, Self::Error>> {
        Box::pin(std::future::ready(self.list_now(user_id)))
    }

    fn delete<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, Result<bool, Self::Error>> {
        Box::pin(std::future::ready(self.delete_now(subscription_id)))
    }
}

impl Directory for MemoryStore {
    type Error = StoreError;

    fn conversation<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Conversation>, Self::Error>> {
        let result = self
            .tables()
            .map(|tables| tables.conversations.get(conversation_id).cloned());
        Box::pin(std::future::ready(result))
    }

    fn profile<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Profile>, Self::Error>> {
        let result = self
            .tables()
            .map(|tables| tables.profiles.get(user_id).cloned());
        Box::pin(std::future::ready(result))
    }

    fn profiles_in_province<'a>(
        &'a self,
        province: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Profile>, Self::Error>> {
        let result = self.tables().map(|tables| {
            let mut profiles: Vec<Profile> = tables
                .profiles
                .values()
                .filter(|profile| profile.province.as_deref() == Some(province))
                .cloned()
                .collect();
            profiles.sort_by(|a, b| a.id.cmp(&b.id));
            profiles
        });
        Box::pin(std::future::ready(result))
    }
}
