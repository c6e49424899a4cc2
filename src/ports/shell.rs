use crate::shell::notification::NotificationOptions;

use futures_util::future::BoxFuture;
use reqwest::{Method, Url};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }
}

/// Who produced a response, relative to the worker's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Basic,
    Cors,
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub kind: ResponseKind,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Successful and produced by our own origin.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

/// Named response stores, keyed by request URL.
pub trait CacheStorage: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    fn open<'a>(&'a self, cache: &'a str) -> BoxFuture<'a, Result<(), Self::Error>>;
    fn names(&self) -> BoxFuture<'_, Result<Vec<String>, Self::Error>>;
    fn delete<'a>(&'a self, cache: &'a str) -> BoxFuture<'a, Result<bool, Self::Error>>;
    fn lookup<'a>(
        &'a self,
        cache: &'a str,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<Option<FetchResponse>, Self::Error>>;
    fn put<'a>(
        &'a self,
        cache: &'a str,
        url: &'a Url,
        response: FetchResponse,
    ) -> BoxFuture<'a, Result<(), Self::Error>>;
}

pub trait Network: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<FetchResponse, Self::Error>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
    pub id: String,
    pub url: Url,
}

/// The browser surface the worker drives: open windows and OS notifications.
pub trait WorkerHost: Clone + Send + Sync + 'static {
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// All application windows, controlled or not.
    fn windows(&self) -> BoxFuture<'_, Result<Vec<WindowClient>, Self::Error>>;
    fn navigate_and_focus<'a>(
        &'a self,
        client_id: &'a str,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<(), Self::Error>>;
    fn open_window<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(), Self::Error>>;
    /// Takes control of every open page without waiting for a reload.
    fn claim(&self) -> BoxFuture<'_, Result<(), Self::Error>>;
    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        options: &'a NotificationOptions,
    ) -> BoxFuture<'a, Result<(), Self::Error>>;
    fn close_notification<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<(), Self::Error>>;
}
