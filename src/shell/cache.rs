use crate::ports::shell::{CacheStorage, FetchResponse};

use futures_util::future::BoxFuture;
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, thiserror::Error)]
#[error("cache {0} does not exist")]
pub struct MissingCache(pub String);

/// Process-local cache storage. Cache names are kept sorted so listings are
/// stable.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStorage {
    caches: Arc<Mutex<BTreeMap<String, HashMap<String, FetchResponse>>>>,
}

impl MemoryCacheStorage {
    fn caches(&self) -> MutexGuard<'_, BTreeMap<String, HashMap<String, FetchResponse>>> {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entry_count(&self, cache: &str) -> usize {
        self.caches().get(cache).map_or(0, HashMap::len)
    }
}

fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string()
}

impl CacheStorage for MemoryCacheStorage {
    type Error = MissingCache;

    fn open<'a>(&'a self, cache: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
        self.caches().entry(cache.to_string()).or_default();
        Box::pin(std::future::ready(Ok(())))
    }

    fn names(&self) -> BoxFuture<'_, Result<Vec<String>, Self::Error>> {
        let names = self.caches().keys().cloned().collect();
        Box::pin(std::future::ready(Ok(names)))
    }

    fn delete<'a>(&'a self, cache: &'a str) -> BoxFuture<'a, Result<bool, Self::Error>> {
        let removed = self.caches().remove(cache).is_some();
        Box::pin(std::future::ready(Ok(removed)))
    }

    fn lookup<'a>(
        &'a self,
        cache: &'a str,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<Option<FetchResponse>, Self::Error>> {
        let hit = self
            .caches()
            .get(cache)
            .and_then(|entries| entries.get(&cache_key(url)).cloned());
        Box::pin(std::future::ready(Ok(hit)))
    }

    fn put<'a>(
        &'a self,
        cache: &'a str,
        url: &'a Url,
        response: FetchResponse,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        let result = match self.caches().get_mut(cache) {
            Some(entries) => {
                entries.insert(cache_key(url), response);
                Ok(())
            }
            None => Err(MissingCache(cache.to_string())),
        };
        Box::pin(std::future::ready(result))
    }
}
