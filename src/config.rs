use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppConfig {
    pub bind: SocketAddr,
    /// Title of push notifications sent without one.
    pub app_name: String,
    pub vapid_private_key: Option<String>,
    pub vapid_public_key: Option<String>,
    pub vapid_subject: Option<String>,
    pub backend: Option<BackendConfig>,
    pub auth: Option<AuthConfig>,
    pub push_timeout: Duration,
}

/// Hosted database reached over REST with the privileged service key.
#[derive(Clone)]
pub struct BackendConfig {
    pub database_url: String,
    pub service_key: String,
}

#[derive(Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the hosted auth service.
    pub secret: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 3000)),
            app_name: crate::push::DEFAULT_TITLE.to_string(),
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            backend: None,
            auth: None,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}
