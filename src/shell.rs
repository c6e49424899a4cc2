//! Offline cache shell: the installed worker that pre-caches the app shell,
//! answers same-origin GETs cache-first and turns push messages into
//! notifications.
//!
//! Every event handler returns a [`KeepAlive`] handle. The host must await it
//! before it lets the worker be suspended; the worker keeps no state between
//! events apart from what lives in [`CacheStorage`].

pub mod cache;
pub mod notification;

use crate::ports::shell::{
    CacheStorage, FetchRequest, FetchResponse, Network, WindowClient, WorkerHost,
};

use notification::{CLOSE_ACTION, NotificationClick};
use reqwest::{Method, Url};
use std::sync::{Arc, Mutex, PoisonError};
use time::OffsetDateTime;
use tokio::task::{JoinError, JoinHandle};

pub const CACHE_PREFIX: &str = "huellas-digitales";

#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// Version tag; the only cache that survives activation.
    pub cache_name: String,
    pub origin: Url,
    /// Host of the backend API. Requests to it are never cached.
    pub api_host: String,
    /// Paths pre-cached during install, relative to `origin`.
    pub manifest: Vec<String>,
}

impl ShellConfig {
    pub fn new(version: &str, origin: Url, api_host: &str) -> Self {
        Self {
            cache_name: format!("{CACHE_PREFIX}-{version}"),
            origin,
            api_host: api_host.to_string(),
            manifest: [
                "/",
                "/manifest.json",
                "/icons/icon-192x192.png",
                "/icons/icon-512x512.png",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Installing,
    Active,
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    CacheFirst,
    Network,
}

#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("invalid manifest entry {0}")]
    InvalidAsset(String),
    #[error("fetching {url} failed: {reason}")]
    Fetch { url: String, reason: String },
    #[error("cache storage failed: {0}")]
    Cache(String),
    #[error("worker has not finished installing")]
    NotInstalled,
}

/// Handle on a running event handler.
#[derive(Debug)]
pub struct KeepAlive<T> {
    handle: JoinHandle<T>,
}

impl<T> KeepAlive<T> {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub async fn settled(self) -> Result<T, JoinError> {
        self.handle.await
    }
}

#[derive(Debug)]
struct ShellState {
    lifecycle: Lifecycle,
    installed: bool,
}

#[derive(Debug, Clone)]
pub struct CacheShell<C, N, H> {
    config: Arc<ShellConfig>,
    cache: C,
    network: N,
    host: H,
    state: Arc<Mutex<ShellState>>,
}

impl<C, N, H> CacheShell<C, N, H>
where
    C: CacheStorage,
    N: Network,
    H: WorkerHost,
{
    pub fn new(config: ShellConfig, cache: C, network: N, host: H) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            network,
            host,
            state: Arc::new(Mutex::new(ShellState {
                lifecycle: Lifecycle::Installing,
                installed: false,
            })),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .lifecycle
    }

    fn update(&self, change: impl FnOnce(&mut ShellState)) {
        change(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// A newer worker has taken over; from now on fetches go to the network.
    pub fn supersede(&self) {
        self.update(|state| state.lifecycle = Lifecycle::Superseded);
        tracing::info!(cache = %self.config.cache_name, "worker superseded");
    }

    pub fn route(&self, request: &FetchRequest) -> Route {
        if request.method != Method::GET {
            return Route::Network;
        }
        if let Some(host) = request.url.host_str()
            && (host == self.config.api_host || host.ends_with(&format!(".{}", self.config.api_host)))
        {
            return Route::Network;
        }
        if request.url.origin() != self.config.origin.origin() {
            return Route::Network;
        }
        Route::CacheFirst
    }

    pub fn install(&self) -> KeepAlive<Result<(), ShellError>> {
        let shell = self.clone();
        KeepAlive {
            handle: tokio::spawn(async move {
                let result = shell.precache().await;
                match &result {
                    Ok(()) => {
                        shell.update(|state| state.installed = true);
                        tracing::info!(cache = %shell.config.cache_name, "worker installed");
                    }
                    Err(err) => tracing::error!(error = %err, "worker install failed"),
                }
                result
            }),
        }
    }

    async fn precache(&self) -> Result<(), ShellError> {
        let cache_name = &self.config.cache_name;
        self.cache
            .open(cache_name)
            .await
            .map_err(|err| ShellError::Cache(err.to_string()))?;

        // Fetch everything before storing anything so a failed install leaves
        // no partial manifest behind.
        let mut fetched = Vec::with_capacity(self.config.manifest.len());
        for asset in &self.config.manifest {
            let url = self
                .config
                .origin
                .join(asset)
                .map_err(|_| ShellError::InvalidAsset(asset.clone()))?;
            let request = FetchRequest::get(url);
            let response =
                self.network
                    .fetch(&request)
                    .await
                    .map_err(|err| ShellError::Fetch {
                        url: request.url.to_string(),
                        reason: err.to_string(),
                    })?;
            if !(200..300).contains(&response.status) {
                return Err(ShellError::Fetch {
                    url: request.url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((request.url, response));
        }

        for (url, response) in fetched {
            self.cache
                .put(cache_name, &url, response)
                .await
                .map_err(|err| ShellError::Cache(err.to_string()))?;
        }
        Ok(())
    }

    pub fn activate(&self) -> KeepAlive<Result<(), ShellError>> {
        let shell = self.clone();
        KeepAlive {
            handle: tokio::spawn(async move {
                let installed = shell
                    .state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .installed;
                if !installed {
                    return Err(ShellError::NotInstalled);
                }
                shell.evict_stale_caches().await;
                if let Err(err) = shell.host.claim().await {
                    tracing::warn!(error = %err, "failed to claim open pages");
                }
                shell.update(|state| state.lifecycle = Lifecycle::Active);
                tracing::info!(cache = %shell.config.cache_name, "worker active");
                Ok(())
            }),
        }
    }

    async fn evict_stale_caches(&self) {
        let names = match self.cache.names().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list caches");
                return;
            }
        };
        for name in names
            .iter()
            .filter(|name| **name != self.config.cache_name)
        {
            match self.cache.delete(name).await {
                Ok(_) => tracing::info!(cache = %name, "deleted stale cache"),
                Err(err) => tracing::warn!(cache = %name, error = %err, "failed to delete cache"),
            }
        }
    }

    pub fn fetch(&self, request: FetchRequest) -> KeepAlive<Result<FetchResponse, ShellError>> {
        let shell = self.clone();
        KeepAlive {
            handle: tokio::spawn(async move { shell.respond(&request).await }),
        }
    }

    async fn respond(&self, request: &FetchRequest) -> Result<FetchResponse, ShellError> {
        if self.lifecycle() != Lifecycle::Active || self.route(request) == Route::Network {
            return self.from_network(request).await;
        }

        let cache_name = &self.config.cache_name;
        match self.cache.lookup(cache_name, &request.url).await {
            Ok(Some(hit)) => return Ok(hit),
            Ok(None) => {}
            Err(err) => tracing::warn!(url = %request.url, error = %err, "cache lookup failed"),
        }

        let response = self.from_network(request).await?;
        if response.is_cacheable()
            && let Err(err) = self
                .cache
                .put(cache_name, &request.url, response.clone())
                .await
        {
            tracing::warn!(url = %request.url, error = %err, "failed to cache response");
        }
        Ok(response)
    }

    async fn from_network(&self, request: &FetchRequest) -> Result<FetchResponse, ShellError> {
        self.network
            .fetch(request)
            .await
            .map_err(|err| ShellError::Fetch {
                url: request.url.to_string(),
                reason: err.to_string(),
            })
    }

    pub fn push(&self, data: Option<Vec<u8>>) -> KeepAlive<()> {
        let shell = self.clone();
        KeepAlive {
            handle: tokio::spawn(async move {
                let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
                let (title, options) = notification::from_push_data(data.as_deref(), now_ms);
                if let Err(err) = shell.host.show_notification(&title, &options).await {
                    tracing::error!(error = %err, "failed to show notification");
                }
            }),
        }
    }

    pub fn notification_click(&self, click: NotificationClick) -> KeepAlive<()> {
        let shell = self.clone();
        KeepAlive {
            handle: tokio::spawn(async move {
                if let Err(err) = shell.host.close_notification(&click.tag).await {
                    tracing::warn!(error = %err, "failed to close notification");
                }
                if click.action == CLOSE_ACTION {
                    return;
                }
                shell.focus_or_open(&click.data.url).await;
            }),
        }
    }

    async fn focus_or_open(&self, target: &str) {
        let origin = &self.config.origin;
        let target = origin.join(target).unwrap_or_else(|_| origin.clone());

        let windows = match self.host.windows().await {
            Ok(windows) => windows,
            Err(err) => {
                tracing::warn!(error = %err, "failed to list windows");
                Vec::new()
            }
        };
        let existing: Option<&WindowClient> = windows
            .iter()
            .find(|window| window.url.origin() == origin.origin());

        let result = match existing {
            Some(window) => self.host.navigate_and_focus(&window.id, &target).await,
            None => self.host.open_window(&target).await,
        };
        if let Err(err) = result {
            tracing::error!(url = %target, error = %err, "failed to open notification target");
        }
    }
}

#[cfg(test)]
#[allow(non_snake_case)]
mod tests {
    use super::*;
    use crate::ports::shell::ResponseKind;
    use cache::MemoryCacheStorage;
    use futures_util::future::BoxFuture;
    use notification::{NotificationData, NotificationOptions};
    use std::collections::HashMap;

    const ORIGIN: &str = "https://huellas.example";
    const API_HOST: &str = "abcd.supabase.co";

    fn page(body: &str) -> FetchResponse {
        FetchResponse {
            status: 200,
            kind: ResponseKind::Basic,
            content_type: Some("text/html".to_string()),
            body: body.as_bytes().to_vec(),
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("offline")]
    struct Offline;

    #[derive(Clone, Default)]
    struct TestNetwork {
        responses: Arc<Mutex<HashMap<String, FetchResponse>>>,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl TestNetwork {
        fn serve(&self, url: &str, response: FetchResponse) {
            self.responses
                .lock()
                .expect("responses lock")
                .insert(url.to_string(), response);
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().expect("requests lock").clone()
        }
    }

    impl Network for TestNetwork {
        type Error = Offline;

        fn fetch<'a>(
            &'a self,
            request: &'a FetchRequest,
        ) -> BoxFuture<'a, Result<FetchResponse, Self::Error>> {
            let url = request.url.to_string();
            self.requests.lock().expect("requests lock").push(url.clone());
            let response = self.responses.lock().expect("responses lock").get(&url).cloned();
            Box::pin(std::future::ready(response.ok_or(Offline)))
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum HostCall {
        Claim,
        Show(String, NotificationOptions),
        Close(String),
        Navigate(String, String),
        Open(String),
    }

    #[derive(Clone, Default)]
    struct TestHost {
        windows: Arc<Mutex<Vec<WindowClient>>>,
        calls: Arc<Mutex<Vec<HostCall>>>,
    }

    impl TestHost {
        fn record(&self, call: HostCall) -> BoxFuture<'static, Result<(), Offline>> {
            self.calls.lock().expect("calls lock").push(call);
            Box::pin(std::future::ready(Ok(())))
        }

        fn calls(&self) -> Vec<HostCall> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl WorkerHost for TestHost {
        type Error = Offline;

        fn windows(&self) -> BoxFuture<'_, Result<Vec<WindowClient>, Self::Error>> {
            let windows = self.windows.lock().expect("windows lock").clone();
            Box::pin(std::future::ready(Ok(windows)))
        }

        fn navigate_and_focus<'a>(
            &'a self,
            client_id: &'a str,
            url: &'a Url,
        ) -> BoxFuture<'a, Result<(), Self::Error>> {
            self.record(HostCall::Navigate(client_id.to_string(), url.to_string()))
        }

        fn open_window<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(), Self::Error>> {
            self.record(HostCall::Open(url.to_string()))
        }

        fn claim(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
            self.record(HostCall::Claim)
        }

        fn show_notification<'a>(
            &'a self,
            title: &'a str,
            options: &'a NotificationOptions,
        ) -> BoxFuture<'a, Result<(), Self::Error>> {
            self.record(HostCall::Show(title.to_string(), options.clone()))
        }

        fn close_notification<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
            self.record(HostCall::Close(tag.to_string()))
        }
    }

    fn shell_config() -> ShellConfig {
        let mut config = ShellConfig::new("v2", Url::parse(ORIGIN).expect("origin"), API_HOST);
        config.manifest = vec!["/".to_string(), "/icons/icon-192x192.png".to_string()];
        config
    }

    fn serve_manifest(network: &TestNetwork) {
        network.serve(&format!("{ORIGIN}/"), page("shell"));
        network.serve(&format!("{ORIGIN}/icons/icon-192x192.png"), page("icon"));
    }

    type TestShell = CacheShell<MemoryCacheStorage, TestNetwork, TestHost>;

    async fn active_shell() -> (TestShell, MemoryCacheStorage, TestNetwork, TestHost) {
        let cache = MemoryCacheStorage::default();
        let network = TestNetwork::default();
        let host = TestHost::default();
        serve_manifest(&network);
        let shell = CacheShell::new(shell_config(), cache.clone(), network.clone(), host.clone());
        shell.install().settled().await.expect("join").expect("install");
        shell.activate().settled().await.expect("join").expect("activate");
        (shell, cache, network, host)
    }

    fn url(path: &str) -> Url {
        Url::parse(&format!("{ORIGIN}{path}")).expect("url")
    }

    #[tokio::test]
    async fn install__should_precache_manifest() {
        // Given
        let cache = MemoryCacheStorage::default();
        let network = TestNetwork::default();
        serve_manifest(&network);
        let shell = CacheShell::new(shell_config(), cache.clone(), network, TestHost::default());

        // When
        let result = shell.install().settled().await.expect("join");

        // Then
        assert!(result.is_ok());
        assert_eq!(cache.entry_count("huellas-digitales-v2"), 2);
        assert_eq!(shell.lifecycle(), Lifecycle::Installing);
    }

    #[tokio::test]
    async fn install__should_fail_when_any_asset_is_missing() {
        // Given
        let cache = MemoryCacheStorage::default();
        let network = TestNetwork::default();
        network.serve(&format!("{ORIGIN}/"), page("shell"));
        let shell = CacheShell::new(shell_config(), cache.clone(), network, TestHost::default());

        // When
        let result = shell.install().settled().await.expect("join");

        // Then
        assert!(matches!(result, Err(ShellError::Fetch { .. })));
        assert_eq!(cache.entry_count("huellas-digitales-v2"), 0);
        assert!(matches!(
            shell.activate().settled().await.expect("join"),
            Err(ShellError::NotInstalled)
        ));
    }

    #[tokio::test]
    async fn activate__should_remove_only_stale_caches_and_claim_pages() {
        // Given
        let cache = MemoryCacheStorage::default();
        cache.open("huellas-digitales-v1").await.expect("open old");
        cache
            .put("huellas-digitales-v1", &url("/"), page("old"))
            .await
            .expect("put old");
        let network = TestNetwork::default();
        serve_manifest(&network);
        let host = TestHost::default();
        let shell = CacheShell::new(shell_config(), cache.clone(), network, host.clone());
        shell.install().settled().await.expect("join").expect("install");

        // When
        shell.activate().settled().await.expect("join").expect("activate");

        // Then
        let names = cache.names().await.expect("names");
        assert_eq!(names, vec!["huellas-digitales-v2".to_string()]);
        assert_eq!(cache.entry_count("huellas-digitales-v2"), 2);
        assert_eq!(host.calls(), vec![HostCall::Claim]);
        assert_eq!(shell.lifecycle(), Lifecycle::Active);
    }

    #[tokio::test]
    async fn fetch__should_serve_cached_asset_without_network() {
        // Given
        let (shell, _, network, _) = active_shell().await;
        let before = network.requests().len();

        // When
        let response = shell
            .fetch(FetchRequest::get(url("/")))
            .settled()
            .await
            .expect("join")
            .expect("response");

        // Then
        assert_eq!(response.body, b"shell");
        assert_eq!(network.requests().len(), before);
    }

    #[tokio::test]
    async fn fetch__should_bypass_cache_for_api_host() {
        // Given
        let (shell, cache, network, _) = active_shell().await;
        let api_url = Url::parse(&format!("https://{API_HOST}/rest/v1/animals")).expect("api url");
        cache
            .put("huellas-digitales-v2", &api_url, page("stale"))
            .await
            .expect("seed cache");
        network.serve(api_url.as_str(), page("fresh"));

        // When
        let response = shell
            .fetch(FetchRequest::get(api_url.clone()))
            .settled()
            .await
            .expect("join")
            .expect("response");

        // Then
        assert_eq!(response.body, b"fresh");
        assert_eq!(network.requests().last(), Some(&api_url.to_string()));
    }

    #[tokio::test]
    async fn fetch__should_bypass_cache_for_non_get() {
        // Given
        let (shell, _, network, _) = active_shell().await;
        network.serve(&format!("{ORIGIN}/"), page("posted"));
        let request = FetchRequest {
            method: Method::POST,
            url: url("/"),
        };

        // When
        let response = shell
            .fetch(request)
            .settled()
            .await
            .expect("join")
            .expect("response");

        // Then
        assert_eq!(response.body, b"posted");
    }

    #[tokio::test]
    async fn fetch__should_store_fresh_same_origin_responses_only() {
        // Given
        let (shell, cache, network, _) = active_shell().await;
        network.serve(&format!("{ORIGIN}/adoptar"), page("adoptar"));
        network.serve(
            &format!("{ORIGIN}/missing"),
            FetchResponse {
                status: 404,
                ..page("nope")
            },
        );

        // When
        for path in ["/adoptar", "/missing"] {
            shell
                .fetch(FetchRequest::get(url(path)))
                .settled()
                .await
                .expect("join")
                .expect("response");
        }

        // Then
        let cached = cache
            .lookup("huellas-digitales-v2", &url("/adoptar"))
            .await
            .expect("lookup");
        assert!(cached.is_some());
        let missing = cache
            .lookup("huellas-digitales-v2", &url("/missing"))
            .await
            .expect("lookup");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn fetch__should_skip_cache_once_superseded() {
        // Given
        let (shell, _, network, _) = active_shell().await;
        shell.supersede();
        let before = network.requests().len();

        // When
        shell
            .fetch(FetchRequest::get(url("/")))
            .settled()
            .await
            .expect("join")
            .expect("response");

        // Then
        assert_eq!(network.requests().len(), before + 1);
        assert_eq!(shell.lifecycle(), Lifecycle::Superseded);
    }

    #[test]
    fn route__should_send_cross_origin_requests_to_network() {
        // Given
        let shell: TestShell = CacheShell::new(
            shell_config(),
            MemoryCacheStorage::default(),
            TestNetwork::default(),
            TestHost::default(),
        );

        // Then
        assert_eq!(shell.route(&FetchRequest::get(url("/"))), Route::CacheFirst);
        assert_eq!(
            shell.route(&FetchRequest::get(
                Url::parse("https://tiles.example/1/2/3.png").expect("url")
            )),
            Route::Network
        );
        assert_eq!(
            shell.route(&FetchRequest::get(
                Url::parse("https://realtime.abcd.supabase.co/socket").expect("url")
            )),
            Route::Network
        );
    }

    #[tokio::test]
    async fn push__should_show_one_default_notification_for_invalid_json() {
        // Given
        let (shell, _, _, host) = active_shell().await;

        // When
        shell
            .push(Some(b"not valid json".to_vec()))
            .settled()
            .await
            .expect("join");

        // Then
        let shown: Vec<HostCall> = host
            .calls()
            .into_iter()
            .filter(|call| matches!(call, HostCall::Show(..)))
            .collect();
        assert_eq!(shown.len(), 1);
        match &shown[0] {
            HostCall::Show(title, options) => {
                assert_eq!(title, "Huellas Digitales");
                assert!(options.require_interaction);
            }
            other => panic!("unexpected call: {other:?}"),
        }
    }

    fn click(action: &str, target: &str) -> NotificationClick {
        NotificationClick {
            action: action.to_string(),
            tag: "huellas-1".to_string(),
            data: NotificationData {
                url: target.to_string(),
                timestamp: 1,
            },
        }
    }

    #[tokio::test]
    async fn notification_click__should_only_close_on_dismiss() {
        // Given
        let (shell, _, _, host) = active_shell().await;

        // When
        shell
            .notification_click(click(CLOSE_ACTION, "/mensajes"))
            .settled()
            .await
            .expect("join");

        // Then
        assert_eq!(
            host.calls(),
            vec![HostCall::Claim, HostCall::Close("huellas-1".to_string())]
        );
    }

    #[tokio::test]
    async fn notification_click__should_focus_existing_window() {
        // Given
        let (shell, _, _, host) = active_shell().await;
        host.windows.lock().expect("windows lock").extend([
            WindowClient {
                id: "other".to_string(),
                url: Url::parse("https://elsewhere.example/").expect("url"),
            },
            WindowClient {
                id: "w1".to_string(),
                url: url("/mapa"),
            },
        ]);

        // When
        shell
            .notification_click(click("", "/mensajes/c1"))
            .settled()
            .await
            .expect("join");

        // Then
        assert_eq!(
            host.calls()[1..],
            [
                HostCall::Close("huellas-1".to_string()),
                HostCall::Navigate("w1".to_string(), format!("{ORIGIN}/mensajes/c1")),
            ]
        );
    }

    #[tokio::test]
    async fn notification_click__should_open_window_when_none_exists() {
        // Given
        let (shell, _, _, host) = active_shell().await;

        // When
        shell
            .notification_click(click("open", "/mensajes/c1"))
            .settled()
            .await
            .expect("join");

        // Then
        assert_eq!(
            host.calls().last(),
            Some(&HostCall::Open(format!("{ORIGIN}/mensajes/c1")))
        );
    }
}
