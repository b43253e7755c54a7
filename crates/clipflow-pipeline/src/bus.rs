//! Per-channel progress fan-out.
//!
//! Each channel gets its own broadcast sender, created on first subscribe and
//! dropped with its last subscriber. Publishing never blocks the pipeline: an
//! event with no listener is discarded, and a subscriber that falls behind
//! skips the events it missed.

use clipflow_core::models::ProgressEvent;
use futures::Stream;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("not authorized to follow channel {0}")]
    Unauthorized(String),

    #[error("progress bus is shut down")]
    Closed,

    #[error("channel token error: {0}")]
    Token(String),
}

/// Decides whether a credential may follow a channel. Checked once per subscription.
pub trait ChannelAuthorizer: Send + Sync {
    fn authorize(&self, channel_id: &str, credential: &str) -> Result<(), BusError>;
}

/// Accepts every subscriber. Used when no token secret is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenChannels;

impl ChannelAuthorizer for OpenChannels {
    fn authorize(&self, _channel_id: &str, _credential: &str) -> Result<(), BusError> {
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChannelClaims {
    channel_id: String,
    exp: i64,
}

/// HS256 tokens scoped to a single channel.
pub struct JwtChannelAuthorizer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtChannelAuthorizer {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Mint a token that lets its bearer follow `channel_id` for `ttl`.
    pub fn issue(&self, channel_id: &str, ttl: Duration) -> Result<String, BusError> {
        let exp = chrono::Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| BusError::Token(e.to_string()))?;
        let claims = ChannelClaims {
            channel_id: channel_id.to_string(),
            exp: exp.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| BusError::Token(e.to_string()))
    }
}

impl ChannelAuthorizer for JwtChannelAuthorizer {
    fn authorize(&self, channel_id: &str, credential: &str) -> Result<(), BusError> {
        let data = decode::<ChannelClaims>(
            credential,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| {
            tracing::debug!(channel_id = %channel_id, error = %e, "Rejected channel token");
            BusError::Unauthorized(channel_id.to_string())
        })?;

        if data.claims.channel_id != channel_id {
            return Err(BusError::Unauthorized(channel_id.to_string()));
        }
        Ok(())
    }
}

struct Inner {
    channels: RwLock<HashMap<String, broadcast::Sender<ProgressEvent>>>,
    capacity: usize,
    closed: AtomicBool,
    authorizer: Arc<dyn ChannelAuthorizer>,
}

/// Process-wide progress bus. Cheap to clone.
#[derive(Clone)]
pub struct ProgressBus {
    inner: Arc<Inner>,
}

impl ProgressBus {
    pub fn new(capacity: usize, authorizer: Arc<dyn ChannelAuthorizer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                channels: RwLock::new(HashMap::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
                authorizer,
            }),
        }
    }

    /// Fire-and-forget delivery to the event's channel.
    pub fn publish(&self, event: ProgressEvent) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let channels = self
            .inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(&event.channel_id) else {
            tracing::trace!(
                channel_id = %event.channel_id,
                job_id = %event.job_id,
                percent = event.percent,
                "No subscribers for progress event"
            );
            return;
        };
        if sender.send(event).is_err() {
            tracing::debug!("Progress event dropped, subscribers already gone");
        }
    }

    /// Follow a channel. The credential is checked once, here.
    pub fn subscribe(&self, channel_id: &str, credential: &str) -> Result<Subscription, BusError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        self.inner.authorizer.authorize(channel_id, credential)?;

        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let receiver = channels
            .entry(channel_id.to_string())
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe();

        tracing::debug!(channel_id = %channel_id, "Progress subscriber attached");
        Ok(Subscription {
            channel_id: channel_id.to_string(),
            receiver,
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Stop delivering and drop every channel. Open subscriptions end.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::Release);
        let mut channels = self
            .inner
            .channels
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let dropped = channels.len();
        channels.clear();
        tracing::info!(channels = dropped, "Progress bus shut down");
    }

    pub fn channel_count(&self) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn subscriber_count(&self, channel_id: &str) -> usize {
        self.inner
            .channels
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(channel_id)
            .map_or(0, |sender| sender.receiver_count())
    }
}

/// A live view of one channel. Dropping it detaches from the bus.
pub struct Subscription {
    channel_id: String,
    receiver: broadcast::Receiver<ProgressEvent>,
    bus: std::sync::Weak<Inner>,
}

impl Subscription {
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// Next event, or `None` once the bus is shut down.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel_id = %self.channel_id,
                        skipped,
                        "Progress subscriber lagged, events skipped"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> {
        futures::stream::unfold(self, |mut sub| async move {
            sub.recv().await.map(|event| (event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut channels = inner.channels.write().unwrap_or_else(|e| e.into_inner());
        // Our own receiver is still counted until this drop finishes.
        let last = channels
            .get(&self.channel_id)
            .is_some_and(|sender| sender.receiver_count() <= 1);
        if last {
            channels.remove(&self.channel_id);
            tracing::debug!(channel_id = %self.channel_id, "Progress channel released");
        }
    }
}
