use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::client::DeviceClient;
use crate::error::ClientError;
use crate::snapshot::DeviceSnapshot;

/// Interval between background refreshes unless configured otherwise.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(5 * 60);

const MIN_UPDATE_INTERVAL: Duration = Duration::from_secs(1);
const EVENT_CHANNEL_SIZE: usize = 64;

/// Refresh activity of a [`StateCoordinator`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
    /// No refresh in flight; the snapshot is current as of the last refresh.
    #[display("idle")]
    Idle,
    #[display("refreshing")]
    Refreshing,
    /// No refresh in flight and the last one failed. The previous snapshot is
    /// still served.
    #[display("stale")]
    Stale,
}

/// Result of one refresh, shared with every caller that coalesced onto it.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Updated(DeviceSnapshot),
    Failed(Arc<ClientError>),
}

impl RefreshOutcome {
    #[must_use]
    pub fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    /// Converts the outcome into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the refresh error when the refresh failed.
    pub fn into_result(self) -> Result<DeviceSnapshot, Arc<ClientError>> {
        match self {
            Self::Updated(snapshot) => Ok(snapshot),
            Self::Failed(error) => Err(error),
        }
    }
}

/// Notification broadcast after every refresh.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Updated {
        snapshot: DeviceSnapshot,
        at: OffsetDateTime,
    },
    /// The refresh failed; the last snapshot was kept.
    UpdateFailed {
        error: Arc<ClientError>,
        consecutive_failures: u32,
        at: OffsetDateTime,
    },
}

/// Keeps a cached snapshot of one switch fresh.
///
/// Refreshes run on a fixed interval once [`StateCoordinator::start`] is
/// called, and on demand through [`StateCoordinator::request_refresh`]. At
/// most one refresh runs at a time; concurrent requests share its result.
///
/// Cheaply cloneable.
#[derive(Debug, Clone)]
pub struct StateCoordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    client: Arc<DeviceClient>,
    update_interval: Duration,
    snapshot: watch::Sender<Option<DeviceSnapshot>>,
    phase: watch::Sender<CoordinatorPhase>,
    events: broadcast::Sender<CoordinatorEvent>,
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
    consecutive_failures: AtomicU32,
    cancel: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

#[bon::bon]
impl StateCoordinator {
    /// Creates a coordinator bound to one client. Nothing runs until
    /// [`StateCoordinator::start`] or a refresh request.
    ///
    /// Intervals shorter than one second are raised to one second.
    #[builder]
    pub fn new(
        client: Arc<DeviceClient>,
        #[builder(default = DEFAULT_UPDATE_INTERVAL)] update_interval: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(None);
        let (phase, _) = watch::channel(CoordinatorPhase::Idle);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            inner: Arc::new(CoordinatorInner {
                client,
                update_interval: update_interval.max(MIN_UPDATE_INTERVAL),
                snapshot,
                phase,
                events,
                in_flight: Mutex::new(None),
                consecutive_failures: AtomicU32::new(0),
                cancel: CancellationToken::new(),
                ticker: Mutex::new(None),
            }),
        }
    }
}

impl StateCoordinator {
    /// Starts the periodic refresh task. Calling it again has no effect.
    ///
    /// The first periodic refresh happens one interval after start; use
    /// [`StateCoordinator::first_refresh`] to populate the snapshot right away.
    pub fn start(&self) {
        let mut ticker = lock(&self.inner.ticker);
        if ticker.is_some() || self.inner.cancel.is_cancelled() {
            return;
        }

        let inner = Arc::downgrade(&self.inner);
        let cancel = self.inner.cancel.clone();
        let update_interval = self.inner.update_interval;
        *ticker = Some(tokio::spawn(run_ticker(inner, cancel, update_interval)));
        info!(
            name = %self.inner.client.name(),
            update_interval = %humantime::format_duration(update_interval),
            "state coordinator started"
        );
    }

    /// Stops the periodic refresh task. A refresh already running completes
    /// before this returns.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = lock(&self.inner.ticker).take();
        if let Some(handle) = handle {
            if let Err(error) = handle.await {
                warn!(%error, "refresh ticker ended abnormally");
            }
        }
        debug!(name = %self.inner.client.name(), "state coordinator stopped");
    }

    /// Runs the initial refresh.
    ///
    /// # Errors
    ///
    /// Returns the client error when the device could not be read.
    pub async fn first_refresh(&self) -> Result<DeviceSnapshot, Arc<ClientError>> {
        self.request_refresh().await.into_result()
    }

    /// Refreshes now, or waits for the refresh already in flight and returns
    /// its outcome.
    pub async fn request_refresh(&self) -> RefreshOutcome {
        self.inner.request_refresh().await
    }

    /// Returns the last successfully fetched snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<DeviceSnapshot> {
        self.inner.snapshot.borrow().clone()
    }

    /// Subscribes to snapshot changes. Receivers are notified only when the
    /// value changed.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<DeviceSnapshot>> {
        self.inner.snapshot.subscribe()
    }

    /// Subscribes to refresh events.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn phase(&self) -> CoordinatorPhase {
        *self.inner.phase.borrow()
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.consecutive_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn client(&self) -> &Arc<DeviceClient> {
        &self.inner.client
    }

    #[must_use]
    pub fn update_interval(&self) -> Duration {
        self.inner.update_interval
    }
}

impl CoordinatorInner {
    async fn request_refresh(&self) -> RefreshOutcome {
        loop {
            let waiter = {
                let mut in_flight = lock(&self.in_flight);
                match in_flight.as_ref() {
                    Some(sender) => Some(sender.subscribe()),
                    None => {
                        let (sender, _) = broadcast::channel(1);
                        *in_flight = Some(sender);
                        None
                    }
                }
            };

            let Some(mut receiver) = waiter else {
                let leader = InFlightRefresh::new(self);
                let outcome = self.refresh().await;
                leader.finish(outcome.clone());
                return outcome;
            };

            trace!("joining in-flight refresh");
            match receiver.recv().await {
                Ok(outcome) => return outcome,
                Err(error) => debug!(%error, "in-flight refresh was abandoned, retrying"),
            }
        }
    }

    #[instrument(skip(self), level = "debug", fields(name = %self.client.name()))]
    async fn refresh(&self) -> RefreshOutcome {
        self.phase.send_replace(CoordinatorPhase::Refreshing);

        match self.client.refresh_state().await {
            Ok(snapshot) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.snapshot.send_if_modified(|current| {
                    if current.as_ref() == Some(&snapshot) {
                        return false;
                    }
                    *current = Some(snapshot.clone());
                    true
                });
                self.phase.send_replace(CoordinatorPhase::Idle);
                self.publish(CoordinatorEvent::Updated {
                    snapshot: snapshot.clone(),
                    at: OffsetDateTime::now_utc(),
                });
                RefreshOutcome::Updated(snapshot)
            }
            Err(error) => {
                let error = Arc::new(error);
                let consecutive_failures = self
                    .consecutive_failures
                    .fetch_add(1, Ordering::Relaxed)
                    .saturating_add(1);
                warn!(
                    error = %error,
                    kind = %error.kind(),
                    consecutive_failures,
                    "refresh failed, keeping last snapshot"
                );
                self.phase.send_replace(CoordinatorPhase::Stale);
                self.publish(CoordinatorEvent::UpdateFailed {
                    error: Arc::clone(&error),
                    consecutive_failures,
                    at: OffsetDateTime::now_utc(),
                });
                RefreshOutcome::Failed(error)
            }
        }
    }

    fn publish(&self, event: CoordinatorEvent) {
        if self.events.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}

/// Owns the in-flight slot while a refresh runs. Dropping it without
/// finishing releases the slot so waiters retry.
struct InFlightRefresh<'a> {
    inner: &'a CoordinatorInner,
    finished: bool,
}

impl<'a> InFlightRefresh<'a> {
    fn new(inner: &'a CoordinatorInner) -> Self {
        Self {
            inner,
            finished: false,
        }
    }

    fn finish(mut self, outcome: RefreshOutcome) {
        self.finished = true;
        let sender = lock(&self.inner.in_flight).take();
        let Some(sender) = sender else {
            return;
        };
        if sender.send(outcome).is_err() {
            trace!("no coalesced waiters");
        }
    }
}

impl Drop for InFlightRefresh<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        lock(&self.inner.in_flight).take();
        let phase = if self.inner.consecutive_failures.load(Ordering::Relaxed) > 0 {
            CoordinatorPhase::Stale
        } else {
            CoordinatorPhase::Idle
        };
        self.inner.phase.send_replace(phase);
        debug!("refresh abandoned before completion");
    }
}

async fn run_ticker(
    inner: Weak<CoordinatorInner>,
    cancel: CancellationToken,
    update_interval: Duration,
) {
    let mut interval = tokio::time::interval(update_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let outcome = inner.request_refresh().await;
                trace!(updated = outcome.is_updated(), "periodic refresh finished");
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::hw::FakeSwitch;

    fn coordinator(update_interval: Duration) -> StateCoordinator {
        let switch = FakeSwitch::builder().build();
        let client = DeviceClient::builder()
            .name("Rack")
            .host("fake")
            .connector(switch.connector())
            .build();
        StateCoordinator::builder()
            .client(Arc::new(client))
            .update_interval(update_interval)
            .build()
    }

    #[rstest]
    #[case::zero(Duration::ZERO, MIN_UPDATE_INTERVAL)]
    #[case::sub_second(Duration::from_millis(250), MIN_UPDATE_INTERVAL)]
    #[case::minutes(Duration::from_secs(120), Duration::from_secs(120))]
    fn update_interval_has_a_floor(#[case] requested: Duration, #[case] expected: Duration) {
        assert_eq!(expected, coordinator(requested).update_interval());
    }

    #[test]
    fn new_coordinator_is_idle_without_snapshot() {
        let coordinator = coordinator(DEFAULT_UPDATE_INTERVAL);
        assert_eq!(CoordinatorPhase::Idle, coordinator.phase());
        assert_eq!(None, coordinator.snapshot());
        assert_eq!(0, coordinator.consecutive_failures());
    }

    #[test]
    fn phase_serializes_in_snake_case() {
        let json = serde_json::to_string(&CoordinatorPhase::Stale).expect("phase should serialize");
        assert_eq!("\"stale\"", json);
    }
}
