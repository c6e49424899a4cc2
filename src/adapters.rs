use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;

use crate::ports;
use crate::ports::presenter::MessageAlert;
use crate::ports::shell::{FetchRequest, FetchResponse, ResponseKind, WindowClient};
use crate::shell::notification::NotificationOptions;
use crate::types::push::{PushSubscription, VapidConfig};

/// Seconds the push service keeps an undelivered message.
const PUSH_TTL_SECS: u32 = 24 * 60 * 60;

#[derive(Clone)]
pub struct WebPushSender {
    vapid: VapidConfig,
    client: Arc<web_push::WebPushClient>,
}

impl WebPushSender {
    pub fn new(vapid: VapidConfig) -> Result<Self, web_push::WebPushError> {
        let client = web_push::WebPushClient::new()?;
        Ok(Self {
            vapid,
            client: Arc::new(client),
        })
    }
}

impl ports::push::DeliveryError for web_push::WebPushError {
    fn is_gone(&self) -> bool {
        matches!(
            self,
            web_push::WebPushError::EndpointNotValid | web_push::WebPushError::EndpointNotFound
        )
    }
}

impl ports::push::PushSender for WebPushSender {
    type Error = web_push::WebPushError;
    type Fut<'a>
        = Pin<Box<dyn Future<Output = Result<(), Self::Error>> + Send + 'a>>
    where
        Self: 'a;

    fn send<'a>(&'a self, subscription: &'a PushSubscription, payload: &'a [u8]) -> Self::Fut<'a> {
        Box::pin(async move {
            let subscription_info = web_push::SubscriptionInfo::new(
                subscription.endpoint.clone(),
                subscription.p256dh.clone(),
                subscription.auth.clone(),
            );
            let mut builder = web_push::WebPushMessageBuilder::new(&subscription_info)?;
            builder.set_payload(web_push::ContentEncoding::Aes128Gcm, payload);
            builder.set_ttl(PUSH_TTL_SECS);
            let mut signature_builder = web_push::VapidSignatureBuilder::from_base64(
                &self.vapid.private_key,
                web_push::URL_SAFE_NO_PAD,
                &subscription_info,
            )?;
            signature_builder.add_claim("sub", self.vapid.subject.as_str());
            builder.set_vapid_signature(signature_builder.build()?);
            self.client.send(builder.build()?).await?;
            Ok(())
        })
    }
}

/// Network access for the cache shell. Responses from `origin` are `Basic`,
/// everything else `Cors`.
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    origin: Url,
    client: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            client: reqwest::Client::new(),
        }
    }
}

impl ports::shell::Network for HttpNetwork {
    type Error = reqwest::Error;

    fn fetch<'a>(
        &'a self,
        request: &'a FetchRequest,
    ) -> BoxFuture<'a, Result<FetchResponse, Self::Error>> {
        Box::pin(async move {
            let response = self
                .client
                .request(request.method.clone(), request.url.clone())
                .send()
                .await?;
            let kind = if response.url().origin() == self.origin.origin() {
                ResponseKind::Basic
            } else {
                ResponseKind::Cors
            };
            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response.bytes().await?.to_vec();
            Ok(FetchResponse {
                status,
                kind,
                content_type,
                body,
            })
        })
    }
}

/// Presents message alerts as log lines. Used by the `listen` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPresenter {
    pub visible: bool,
}

impl ports::presenter::Presenter for LogPresenter {
    fn is_visible(&self) -> bool {
        self.visible
    }

    fn toast(&self, alert: &MessageAlert) {
        tracing::info!(
            conversation_id = %alert.conversation_id,
            message_id = %alert.message_id,
            "{}: {}",
            alert.title,
            alert.body
        );
    }

    fn notify(&self, alert: &MessageAlert) {
        tracing::info!(
            conversation_id = %alert.conversation_id,
            native = true,
            "{}: {}",
            alert.title,
            alert.body
        );
    }
}

/// Worker host without any windows. Notifications and navigation requests are
/// only logged; used when the shell runs outside a browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessHost;

impl ports::shell::WorkerHost for HeadlessHost {
    type Error = Infallible;

    fn windows(&self) -> BoxFuture<'_, Result<Vec<WindowClient>, Self::Error>> {
        Box::pin(std::future::ready(Ok(Vec::new())))
    }

    fn navigate_and_focus<'a>(
        &'a self,
        client_id: &'a str,
        url: &'a Url,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        tracing::info!(client_id, url = %url, "navigate window");
        Box::pin(std::future::ready(Ok(())))
    }

    fn open_window<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<(), Self::Error>> {
        tracing::info!(url = %url, "open window");
        Box::pin(std::future::ready(Ok(())))
    }

    fn claim(&self) -> BoxFuture<'_, Result<(), Self::Error>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn show_notification<'a>(
        &'a self,
        title: &'a str,
        options: &'a NotificationOptions,
    ) -> BoxFuture<'a, Result<(), Self::Error>> {
        tracing::info!(tag = %options.tag, "{}: {}", title, options.body);
        Box::pin(std::future::ready(Ok(())))
    }

    fn close_notification<'a>(&'a self, tag: &'a str) -> BoxFuture<'a, Result<(), Self::Error>> {
        tracing::debug!(tag, "close notification");
        Box::pin(std::future::ready(Ok(())))
    }
}
