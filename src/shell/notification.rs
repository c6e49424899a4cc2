use crate::push::{DEFAULT_BADGE, DEFAULT_BODY, DEFAULT_ICON, DEFAULT_TITLE, DEFAULT_URL};

use serde::{Deserialize, Serialize};

pub const OPEN_ACTION: &str = "open";
pub const CLOSE_ACTION: &str = "close";
const VIBRATE_PATTERN: [u32; 3] = [100, 50, 100];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationData {
    pub url: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// Options handed to the host when showing a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub data: NotificationData,
    pub actions: Vec<NotificationAction>,
    pub require_interaction: bool,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationClick {
    /// Empty when the body of the notification was clicked.
    pub action: String,
    pub tag: String,
    pub data: NotificationData,
}

// Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
struct InboundPush {
    title: Option<String>,
    body: Option<String>,
    icon: Option<String>,
    badge: Option<String>,
    url: Option<String>,
    timestamp: Option<i64>,
}

fn or_default(value: Option<String>, default: &str) -> String {
    value
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Turns a push body into the notification to show. Never fails: missing or
/// unreadable payloads fall back to the default strings.
pub fn from_push_data(data: Option<&[u8]>, now_ms: i64) -> (String, NotificationOptions) {
    let inbound = match data {
        None => InboundPush::default(),
        Some(bytes) => match serde_json::from_slice::<InboundPush>(bytes) {
            Ok(inbound) => inbound,
            Err(err) => {
                tracing::warn!(error = %err, "unreadable push payload, using defaults");
                InboundPush::default()
            }
        },
    };

    let timestamp = inbound.timestamp.unwrap_or(now_ms);
    let options = NotificationOptions {
        body: or_default(inbound.body, DEFAULT_BODY),
        icon: or_default(inbound.icon, DEFAULT_ICON),
        badge: or_default(inbound.badge, DEFAULT_BADGE),
        vibrate: VIBRATE_PATTERN.to_vec(),
        data: NotificationData {
            url: or_default(inbound.url, DEFAULT_URL),
            timestamp,
        },
        actions: vec![
            NotificationAction {
                action: OPEN_ACTION.to_string(),
                title: "Abrir".to_string(),
            },
            NotificationAction {
                action: CLOSE_ACTION.to_string(),
                title: "Cerrar".to_string(),
            },
        ],
        require_interaction: true,
        tag: format!("huellas-{timestamp}"),
    };
    (or_default(inbound.title, DEFAULT_TITLE), options)
}
