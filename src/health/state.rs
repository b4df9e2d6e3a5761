//! Per-service serving status.
//!
//! # States
//! - Serving: the named service accepts traffic
//! - NotServing: registered, but orchestrators should route elsewhere
//! - ServiceUnknown: only ever observed by watchers of an unregistered name
//!
//! # State Transitions
//! ```text
//! (absent) → Serving | NotServing : set_serving / set_not_serving
//! Serving ←→ NotServing           : any time, e.g. NotServing on drain
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::proto::ServingStatus;

/// Owned, thread-safe map from service name to serving status.
///
/// The empty name denotes the server as a whole.
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    services: Arc<DashMap<String, watch::Sender<ServingStatus>>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `service` as SERVING.
    pub fn set_serving(&self, service: &str) {
        self.set_status(service, ServingStatus::Serving);
    }

    /// Mark `service` as NOT_SERVING.
    pub fn set_not_serving(&self, service: &str) {
        self.set_status(service, ServingStatus::NotServing);
    }

    /// Replace the status of `service`, registering it if needed.
    pub fn set_status(&self, service: &str, status: ServingStatus) {
        let entry = self
            .services
            .entry(service.to_string())
            .or_insert_with(|| watch::channel(ServingStatus::ServiceUnknown).0);

        let previous = entry.send_replace(status);
        if previous != status {
            tracing::info!(
                service = %display_name(service),
                from = ?previous,
                to = ?status,
                "Health status changed"
            );
        }
    }

    /// Flip every registered service to NOT_SERVING.
    pub fn set_all_not_serving(&self) {
        let names: Vec<String> = self
            .services
            .iter()
            .filter(|entry| *entry.value().borrow() != ServingStatus::ServiceUnknown)
            .map(|entry| entry.key().clone())
            .collect();

        for name in names {
            self.set_not_serving(&name);
        }
    }

    /// Current status of a registered service; `None` if never registered.
    pub fn query(&self, service: &str) -> Option<ServingStatus> {
        self.services
            .get(service)
            .map(|entry| *entry.value().borrow())
            .filter(|status| *status != ServingStatus::ServiceUnknown)
    }

    /// Receiver observing `service`; starts at SERVICE_UNKNOWN if unregistered.
    ///
    /// Watching an unregistered name leaves a placeholder behind until
    /// [`release`](Self::release) is called; prefer [`watch_stream`](Self::watch_stream).
    pub fn watch(&self, service: &str) -> watch::Receiver<ServingStatus> {
        self.services
            .entry(service.to_string())
            .or_insert_with(|| watch::channel(ServingStatus::ServiceUnknown).0)
            .subscribe()
    }

    /// Stream of `service`'s status that drops its placeholder when it ends.
    pub fn watch_stream(&self, service: &str) -> StatusWatch {
        StatusWatch {
            inner: Some(WatchStream::new(self.watch(service))),
            registry: self.clone(),
            service: service.to_string(),
        }
    }

    /// Forget `service` if it was never registered and nobody watches it.
    pub fn release(&self, service: &str) {
        self.services.remove_if(service, |_, tx| {
            *tx.borrow() == ServingStatus::ServiceUnknown && tx.receiver_count() == 0
        });
    }

    /// Number of names tracked, placeholders included.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Status updates for one service, from [`HealthRegistry::watch_stream`].
pub struct StatusWatch {
    inner: Option<WatchStream<ServingStatus>>,
    registry: HealthRegistry,
    service: String,
}

impl Stream for StatusWatch {
    type Item = ServingStatus;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut() {
            Some(inner) => inner.poll_next_unpin(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for StatusWatch {
    fn drop(&mut self) {
        // Drop the receiver first so it is not counted.
        self.inner.take();
        self.registry.release(&self.service);
    }
}

fn display_name(service: &str) -> &str {
    if service.is_empty() {
        "<server>"
    } else {
        service
    }
}
