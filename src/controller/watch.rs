//! Watch engine: a resumable event stream over the Canary collection.
//!
//! Opens a long-lived watch at the current cursor and forwards decoded
//! events in arrival order. The apiserver closes watch connections
//! periodically; that is silently reopened from the cursor. A `410 Gone`
//! status means the cursor fell out of the apiserver's history: the
//! collection is relisted and, if the cached state still matches, the list's
//! version is adopted and watching resumes with no events emitted. Anything
//! else the engine surfaces on its error channel is fatal to the current
//! pipeline iteration.

use std::sync::Arc;

use futures::{StreamExt, pin_mut};
use kube::api::{ListParams, WatchEvent, WatchParams};
use kube::{Api, ResourceExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::controller::error::{Error, Result};
use crate::controller::registry::{ResourceVersion, VersionCache};
use crate::crd::Canary;
use crate::health::HealthState;

/// Decoded canary change event, delivered in apiserver order.
#[derive(Clone, Debug)]
pub enum CanaryEvent {
    Added(Canary),
    Modified(Canary),
    Deleted(Canary),
}

impl CanaryEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CanaryEvent::Added(_) => "Added",
            CanaryEvent::Modified(_) => "Modified",
            CanaryEvent::Deleted(_) => "Deleted",
        }
    }

    pub fn object(&self) -> &Canary {
        match self {
            CanaryEvent::Added(c) | CanaryEvent::Modified(c) | CanaryEvent::Deleted(c) => c,
        }
    }
}

/// Capacity of the event channel between the watch and dispatch tasks.
const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Streams canary events from the apiserver, owning the watch cursor.
pub struct WatchEngine {
    api: Api<Canary>,
    versions: VersionCache,
    cursor: ResourceVersion,
    health_state: Option<Arc<HealthState>>,
}

impl WatchEngine {
    pub fn new(
        api: Api<Canary>,
        versions: VersionCache,
        cursor: ResourceVersion,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            api,
            versions,
            cursor,
            health_state,
        }
    }

    /// Spawn the watch task.
    ///
    /// Events arrive on the first channel until a fatal condition, at which
    /// point exactly one error is delivered on the second channel and the
    /// event channel closes.
    pub fn spawn(self) -> (mpsc::Receiver<CanaryEvent>, mpsc::Receiver<Error>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            if let Err(err) = self.run(&event_tx).await {
                // Send fails only if the control loop already went away
                let _ = error_tx.send(err).await;
            }
        });

        (event_rx, error_rx)
    }

    async fn run(mut self, events: &mpsc::Sender<CanaryEvent>) -> Result<()> {
        let params = WatchParams::default();
        loop {
            let stream = match self.api.watch(&params, self.cursor.as_str()).await {
                Ok(stream) => stream,
                // The watch request itself can be rejected with 410 when the
                // cursor is too old
                Err(kube::Error::Api(e)) if e.code == 410 => {
                    self.recover_from_gone().await?;
                    continue;
                }
                Err(e) => return Err(Error::Kube(e)),
            };
            pin_mut!(stream);
            info!(cursor = %self.cursor, "watch stream opened");

            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(WatchEvent::Added(canary)) => {
                        self.forward(events, CanaryEvent::Added(canary)).await?;
                    }
                    Ok(WatchEvent::Modified(canary)) => {
                        self.forward(events, CanaryEvent::Modified(canary)).await?;
                    }
                    Ok(WatchEvent::Deleted(canary)) => {
                        self.forward(events, CanaryEvent::Deleted(canary)).await?;
                    }
                    Ok(WatchEvent::Bookmark(bookmark)) => {
                        // A bookmark is just a cursor checkpoint from the
                        // apiserver; no event to emit
                        self.cursor = bookmark.metadata.resource_version.clone().into();
                    }
                    Ok(WatchEvent::Error(status)) if status.code == 410 => {
                        self.recover_from_gone().await?;
                        break;
                    }
                    Ok(WatchEvent::Error(status)) => {
                        warn!(
                            code = status.code,
                            reason = %status.reason,
                            message = %status.message,
                            "unexpected status from apiserver"
                        );
                    }
                    Err(kube::Error::Api(e)) if e.code == 410 => {
                        self.recover_from_gone().await?;
                        break;
                    }
                    // Malformed frame or transport fault mid-stream
                    Err(e) => return Err(Error::Kube(e)),
                }
            }

            // The apiserver closes watch streams periodically; reopen from
            // the current cursor without surfacing an error
            debug!(cursor = %self.cursor, "apiserver closed watch stream, reopening");
            if let Some(state) = &self.health_state {
                state.metrics.record_watch_reconnect();
            }
        }
    }

    /// Advance the cursor to the event's version and hand it to the dispatcher.
    async fn forward(
        &mut self,
        events: &mpsc::Sender<CanaryEvent>,
        event: CanaryEvent,
    ) -> Result<()> {
        let name = event.object().name_any();
        let version = event
            .object()
            .resource_version()
            .ok_or(Error::MissingVersion { name: name.clone() })?;

        self.cursor = version.into();
        debug!(kind = event.kind(), name = %name, cursor = %self.cursor, "canary event");

        events
            .send(event)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Handle a `410 Gone`: relist and resume if nothing changed underneath
    /// us, otherwise fail so the control loop rebuilds from bootstrap.
    async fn recover_from_gone(&mut self) -> Result<()> {
        warn!(cursor = %self.cursor, "watch cursor expired (410 Gone), relisting");
        if let Some(state) = &self.health_state {
            state.metrics.record_relist();
        }

        let list = match self.api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) => {
                // Cannot prove the cache is current, so treat it as stale
                error!(error = %e, "relist after 410 failed");
                return Err(Error::HistoryOutdated);
            }
        };

        if self.versions.is_stale(&list.items) {
            return Err(Error::HistoryOutdated);
        }

        self.cursor = list
            .metadata
            .resource_version
            .clone()
            .ok_or(Error::MissingListVersion)?
            .into();
        info!(cursor = %self.cursor, "cached state still current, resuming watch");
        Ok(())
    }
}
