//! Push-based revocation — a long-lived subscription reporting, for one
//! active identity, that its backing subject record left the active set.

use async_trait::async_trait;
use console_core::config::PushConfig;
use console_core::error::{ConsoleError, ConsoleResult};
use console_core::types::{IdentityClass, IdentitySnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Out-of-band signal that a subject must no longer be treated as
/// authenticated. Delivery is at-least-once and may race a sign-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationSignal {
    pub class: IdentityClass,
    pub subject_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Callback invoked for every delivered revocation.
pub type RevocationNotify = Box<dyn Fn(RevocationSignal) + Send + Sync>;

/// A live subscription for one active identity. Dropping the handle tears
/// the feed task down; the coordinator's epoch guard discards anything that
/// was already in flight.
pub struct SubscriptionHandle {
    class: IdentityClass,
    subject_id: Uuid,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Tear the subscription down.
    pub fn unsubscribe(self) {
        debug!(class = %self.class, subject_id = %self.subject_id, "Unsubscribing revocation feed");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Long-lived push channel delivering revocation signals for one identity.
#[async_trait]
pub trait RevocationFeed: Send + Sync {
    /// Open a subscription keyed to the snapshot's class and subject id.
    /// `notify` may fire asynchronously at any time until the handle drops.
    async fn subscribe(
        &self,
        snapshot: &IdentitySnapshot,
        notify: RevocationNotify,
    ) -> ConsoleResult<SubscriptionHandle>;
}

/// NATS-backed feed: one subject per identity,
/// `<prefix>.revoked.<class>.<subject_id>`.
pub struct NatsRevocationFeed {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsRevocationFeed {
    pub async fn connect(config: &PushConfig) -> ConsoleResult<Self> {
        let url = config
            .urls
            .first()
            .cloned()
            .unwrap_or_else(|| "nats://localhost:4222".to_string());
        info!(url = %url, "Connecting to push channel");

        let client = async_nats::connect(&url)
            .await
            .map_err(|e| ConsoleError::Push(e.to_string()))?;
        Ok(Self {
            client,
            subject_prefix: config.subject_prefix.clone(),
        })
    }
}

#[async_trait]
impl RevocationFeed for NatsRevocationFeed {
    async fn subscribe(
        &self,
        snapshot: &IdentitySnapshot,
        notify: RevocationNotify,
    ) -> ConsoleResult<SubscriptionHandle> {
        let subject = format!(
            "{}.revoked.{}.{}",
            self.subject_prefix, snapshot.class, snapshot.subject_id
        );
        let mut subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .map_err(|e| ConsoleError::Push(e.to_string()))?;

        let class = snapshot.class;
        let subject_id = snapshot.subject_id;
        let task = tokio::spawn(async move {
            info!(subject = %subject, "Revocation subscription opened");
            while let Some(msg) = subscriber.next().await {
                // The subject is already keyed to one identity; an
                // unparseable payload still counts as a revocation.
                let signal = serde_json::from_slice::<RevocationSignal>(&msg.payload)
                    .unwrap_or_else(|_| RevocationSignal {
                        class,
                        subject_id,
                        reason: None,
                    });
                metrics::counter!("session.revocations_received").increment(1);
                notify(signal);
            }
            warn!(subject = %subject, "Revocation subscription stream ended");
        });

        Ok(SubscriptionHandle {
            class,
            subject_id,
            task,
        })
    }
}

/// In-process feed for tests, dev mode, and embedded deployments. Signals
/// are fanned out over a broadcast channel and filtered per subscription.
pub struct InProcessRevocationFeed {
    tx: broadcast::Sender<RevocationSignal>,
}

impl InProcessRevocationFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Emit a revocation to every live subscription.
    pub fn emit(&self, signal: RevocationSignal) {
        let _ = self.tx.send(signal);
    }

    /// Number of live subscription tasks.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InProcessRevocationFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RevocationFeed for InProcessRevocationFeed {
    async fn subscribe(
        &self,
        snapshot: &IdentitySnapshot,
        notify: RevocationNotify,
    ) -> ConsoleResult<SubscriptionHandle> {
        let mut rx = self.tx.subscribe();
        let class = snapshot.class;
        let subject_id = snapshot.subject_id;

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(signal) if signal.class == class && signal.subject_id == subject_id => {
                        notify(signal);
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Revocation feed lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(SubscriptionHandle {
            class,
            subject_id,
            task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use console_core::types::{SubjectRecord, SubjectStatus};
    use tokio::sync::mpsc;

    fn snapshot(class: IdentityClass, subject_id: Uuid) -> IdentitySnapshot {
        IdentitySnapshot {
            class,
            subject_id,
            subject: SubjectRecord {
                subject_id,
                display_name: "Operator".into(),
                email: None,
                tenant_id: (class == IdentityClass::Tenant).then(Uuid::new_v4),
                roles: vec![],
                enabled: true,
                status: SubjectStatus::Active,
            },
            resolved_at: Utc::now(),
        }
    }

    fn capture() -> (RevocationNotify, mpsc::UnboundedReceiver<RevocationSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let notify: RevocationNotify = Box::new(move |signal| {
            let _ = tx.send(signal);
        });
        (notify, rx)
    }

    #[tokio::test]
    async fn test_matching_signal_is_delivered() {
        let feed = InProcessRevocationFeed::new();
        let subject_id = Uuid::new_v4();
        let (notify, mut rx) = capture();
        let handle = feed
            .subscribe(&snapshot(IdentityClass::Tenant, subject_id), notify)
            .await
            .unwrap();

        feed.emit(RevocationSignal {
            class: IdentityClass::Tenant,
            subject_id,
            reason: Some("tenant suspended".into()),
        });

        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.subject_id, subject_id);
        assert_eq!(delivered.reason.as_deref(), Some("tenant suspended"));
        handle.unsubscribe();
    }

    #[tokio::test]
    async fn test_signal_for_other_identity_is_filtered() {
        let feed = InProcessRevocationFeed::new();
        let subject_id = Uuid::new_v4();
        let (notify, mut rx) = capture();
        let _handle = feed
            .subscribe(&snapshot(IdentityClass::Tenant, subject_id), notify)
            .await
            .unwrap();

        feed.emit(RevocationSignal {
            class: IdentityClass::Platform,
            subject_id: Uuid::new_v4(),
            reason: None,
        });
        feed.emit(RevocationSignal {
            class: IdentityClass::Tenant,
            subject_id,
            reason: None,
        });

        // Only the matching signal comes through.
        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.subject_id, subject_id);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let feed = InProcessRevocationFeed::new();
        let subject_id = Uuid::new_v4();
        let (notify, mut rx) = capture();
        let handle = feed
            .subscribe(&snapshot(IdentityClass::Platform, subject_id), notify)
            .await
            .unwrap();
        assert_eq!(feed.subscriber_count(), 1);

        handle.unsubscribe();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(feed.subscriber_count(), 0);

        feed.emit(RevocationSignal {
            class: IdentityClass::Platform,
            subject_id,
            reason: None,
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(rx.try_recv().is_err());
    }
}
