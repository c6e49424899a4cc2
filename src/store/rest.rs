use super::StoreError;
use crate::ports::directory::Directory;
use crate::ports::registry::SubscriptionRegistry;
use crate::types::messaging::{Conversation, Profile};
use crate::types::push::{NewSubscription, PushSubscription};

use futures_util::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

const SUBSCRIPTIONS: &str = "push_subscriptions";
const CONVERSATIONS: &str = "conversations";
const PROFILES: &str = "profiles";
const PROFILE_COLUMNS: &str = "id,full_name,email,country,province";

/// PostgREST client for the hosted database, authenticated with the
/// privileged service key.
#[derive(Debug, Clone)]
pub struct RestBackend {
    base_url: String,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(database_url: &str, service_key: &str) -> Result<Self, StoreError> {
        let mut headers = HeaderMap::new();
        let key =
            HeaderValue::from_str(service_key.trim()).map_err(|_| StoreError::InvalidServiceKey)?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", service_key.trim()))
            .map_err(|_| StoreError::InvalidServiceKey)?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(Self {
            base_url: format!("{}/rest/v1", database_url.trim_end_matches('/')),
            client,
        })
    }

    fn table(&self, table: &str) -> String {
        format!("{}/{table}", self.base_url)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: (&str, String),
        columns: &str,
    ) -> Result<Vec<T>, StoreError> {
        let response = self
            .client
            .get(self.table(table))
            .query(&[(filter.0, filter.1.as_str()), ("select", columns)])
            .send()
            .await?;
        decode(response).await
    }

    async fn upsert_row(&self, subscription: NewSubscription) -> Result<PushSubscription, StoreError> {
        let response = self
            .client
            .post(self.table(SUBSCRIPTIONS))
            .query(&[("on_conflict", "endpoint")])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[subscription])
            .send()
            .await?;
        let rows: Vec<PushSubscription> = decode(response).await?;
        rows.into_iter().next().ok_or(StoreError::EmptyUpsert)
    }

    async fn delete_row(&self, subscription_id: &str) -> Result<bool, StoreError> {
        let response = self
            .client
            .delete(self.table(SUBSCRIPTIONS))
            .query(&[("id", format!("eq.{subscription_id}"))])
            .header("Prefer", "return=representation")
            .send()
            .await?;
        let rows: Vec<serde_json::Value> = decode(response).await?;
        Ok(!rows.is_empty())
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json().await?)
}

impl SubscriptionRegistry for RestBackend {
    type Error = StoreError;

    fn upsert(
        &self,
        subscription: NewSubscription,
    ) -> BoxFuture<'_, Result<PushSubscription, Self::Error>> {
        Box::pin(self.upsert_row(subscription))
    }

    fn list_for_user<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PushSubscription>, Self::Error>> {
        Box::pin(self.select::<PushSubscription>(
            SUBSCRIPTIONS,
            ("user_id", format!("eq.{user_id}")),
            "*",
        ))
    }

    fn delete<'a>(&'a self, subscription_id: &'a str) -> BoxFuture<'a, Result<bool, Self::Error>> {
        Box::pin(self.delete_row(subscription_id))
    }
}

impl Directory for RestBackend {
    type Error = StoreError;

    fn conversation<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Conversation>, Self::Error>> {
        Box::pin(async move {
            let rows: Vec<Conversation> = self
                .select(CONVERSATIONS, ("id", format!("eq.{conversation_id}")), "*")
                .await?;
            Ok(rows.into_iter().next())
        })
    }

    fn profile<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Profile>, Self::Error>> {
        Box::pin(async move {
            let rows: Vec<Profile> = self
                .select(PROFILES, ("id", format!("eq.{user_id}")), PROFILE_COLUMNS)
                .await?;
            Ok(rows.into_iter().next())
        })
    }

    fn profiles_in_province<'a>(
        &'a self,
        province: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Profile>, Self::Error>> {
        Box::pin(self.select::<Profile>(
            PROFILES,
            ("province", format!("eq.{province}")),
            PROFILE_COLUMNS,
        ))
    }
}
