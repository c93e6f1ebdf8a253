use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::{ClientError, SessionError};
use crate::hw::{DeviceSession, Endpoint, SessionConnector, SwitchProperties};
use crate::snapshot::{DeviceSnapshot, PowerStatus};

type SessionSlot = Option<Box<dyn DeviceSession>>;

#[derive(Debug)]
struct CachedState {
    connected: bool,
    input_count: u8,
    output_count: u8,
    selected_source: String,
    source_list: Arc<[String]>,
}

impl Default for CachedState {
    fn default() -> Self {
        Self {
            connected: false,
            input_count: 0,
            output_count: 0,
            selected_source: "0".to_string(),
            source_list: Arc::from(Vec::<String>::new()),
        }
    }
}

impl CachedState {
    fn snapshot(&self) -> DeviceSnapshot {
        if !self.connected {
            return DeviceSnapshot::disconnected();
        }
        DeviceSnapshot::connected(
            self.input_count,
            self.output_count,
            Arc::clone(&self.source_list),
            self.selected_source.clone(),
        )
    }

    fn apply(&mut self, properties: SwitchProperties) {
        if self.input_count != properties.input_count() {
            self.input_count = properties.input_count();
            self.source_list = source_list(self.input_count);
        }
        self.output_count = properties.output_count();
        self.selected_source = properties.selected_source().to_string();
    }
}

fn source_list(input_count: u8) -> Arc<[String]> {
    (1..=input_count).map(|source| source.to_string()).collect()
}

/// Long-lived client for one switch.
///
/// The session is opened lazily and replaced after any failure. All device
/// I/O is serialized through one lock, so concurrent callers queue rather
/// than interleave frames.
#[derive(Debug)]
pub struct DeviceClient {
    name: String,
    endpoint: Endpoint,
    connector: Box<dyn SessionConnector>,
    session: Mutex<SessionSlot>,
    cache: RwLock<CachedState>,
}

#[bon::bon]
impl DeviceClient {
    /// Creates a client. No connection is attempted until the first operation.
    ///
    /// ```
    /// let switch = tesmart::FakeSwitch::builder().build();
    /// let client = tesmart::DeviceClient::builder()
    ///     .name("Rack")
    ///     .host("10.0.0.5")
    ///     .port(5000)
    ///     .connector(switch.connector())
    ///     .build();
    /// assert!(!client.is_connected());
    /// ```
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        #[builder(into)] host: String,
        port: Option<u16>,
        connector: Box<dyn SessionConnector>,
    ) -> Self {
        Self {
            name,
            endpoint: Endpoint::new(host, port),
            connector,
            session: Mutex::new(None),
            cache: RwLock::new(CachedState::default()),
        }
    }
}

impl DeviceClient {
    /// Reads the switch, updates the cached state and returns it.
    ///
    /// The snapshot is taken before the session lock is released, so a
    /// concurrent failing command cannot turn it into the disconnected
    /// sentinel. The source list is rebuilt only when the input count changed.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Communication`] when the device is unreachable
    /// and [`ClientError::Device`] for any other failure.
    #[instrument(skip(self), level = "debug", fields(name = %self.name))]
    pub async fn refresh_state(&self) -> Result<DeviceSnapshot, ClientError> {
        let mut slot = self.session.lock().await;
        let (mut session, io) = self.acquire_session(&mut slot).await?;
        let result = session.update().await;
        let properties = self.complete_io(&mut slot, session, io, result)?;

        debug!(?properties, "device state refreshed");
        let mut cache = self.cache_mut();
        cache.apply(properties);
        Ok(cache.snapshot())
    }

    /// Routes the given source to the output.
    ///
    /// The cached selection is not touched; it changes on the next refresh.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSource`] when `source` is not a positive
    /// integer. The held session is dropped but no device I/O happens.
    /// Otherwise returns the errors of
    /// [`DeviceClient::refresh_state`].
    #[instrument(skip(self), level = "debug", fields(name = %self.name))]
    pub async fn select_source(&self, source: &str) -> Result<(), ClientError> {
        let mut slot = self.session.lock().await;
        let Some(source_number) = parse_source(source) else {
            // Rejected input still costs the session, but never a device exchange.
            slot.take();
            self.cache_mut().connected = false;
            warn!(source, "invalid source identifier, discarding device session");
            return Err(ClientError::InvalidSource {
                value: source.to_string(),
            });
        };

        let (mut session, io) = self.acquire_session(&mut slot).await?;
        let result = session.select_source(source_number).await;
        self.complete_io(&mut slot, session, io, result)
    }

    /// # Errors
    ///
    /// Returns the errors of [`DeviceClient::refresh_state`].
    #[instrument(skip(self), level = "debug", fields(name = %self.name))]
    pub async fn set_buzzer_muting(&self, muted: bool) -> Result<(), ClientError> {
        let mut slot = self.session.lock().await;
        let (mut session, io) = self.acquire_session(&mut slot).await?;
        let result = session.set_buzzer_muting(muted).await;
        self.complete_io(&mut slot, session, io, result)
    }

    /// Sets the LED timeout. The switch accepts `0` (never), `10` and `30`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidLedTimeout`] for any other value, otherwise
    /// the errors of [`DeviceClient::refresh_state`].
    #[instrument(skip(self), level = "debug", fields(name = %self.name))]
    pub async fn set_led_timeout_seconds(&self, seconds: u32) -> Result<(), ClientError> {
        let mut slot = self.session.lock().await;
        let (mut session, io) = self.acquire_session(&mut slot).await?;
        let result = session.set_led_timeout_seconds(seconds).await;

        self.complete_io(&mut slot, session, io, result)
            .map_err(|error| match error {
                ClientError::Device {
                    source: source @ SessionError::InvalidArgument { .. },
                    ..
                } => ClientError::InvalidLedTimeout { seconds, source },
                other => other,
            })
    }

    /// # Errors
    ///
    /// Returns the errors of [`DeviceClient::refresh_state`].
    #[instrument(skip(self), level = "debug", fields(name = %self.name))]
    pub async fn set_auto_input_detection(&self, enabled: bool) -> Result<(), ClientError> {
        let mut slot = self.session.lock().await;
        let (mut session, io) = self.acquire_session(&mut slot).await?;
        let result = session.set_auto_input_detection(enabled).await;
        self.complete_io(&mut slot, session, io, result)
    }

    /// Tests the connection parameters with one refresh.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`DeviceClient::refresh_state`].
    pub async fn check_connection(&self) -> Result<bool, ClientError> {
        let snapshot = self.refresh_state().await?;
        Ok(snapshot.status() == PowerStatus::On)
    }

    /// Returns the cached state, or the disconnected sentinel when no session
    /// is held.
    #[must_use]
    pub fn state(&self) -> DeviceSnapshot {
        self.cache().snapshot()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.cache().connected
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn input_count(&self) -> u8 {
        self.cache().input_count
    }

    #[must_use]
    pub fn output_count(&self) -> u8 {
        self.cache().output_count
    }

    #[must_use]
    pub fn selected_source(&self) -> String {
        self.cache().selected_source.clone()
    }

    #[must_use]
    pub fn source_list(&self) -> Arc<[String]> {
        Arc::clone(&self.cache().source_list)
    }

    /// Takes the held session out of its slot, connecting first when there is
    /// none. Connection failures are classified like any other I/O failure.
    async fn acquire_session(
        &self,
        slot: &mut SessionSlot,
    ) -> Result<(Box<dyn DeviceSession>, PendingIo<'_>), ClientError> {
        let session = match slot.take() {
            Some(session) => session,
            None => {
                debug!(endpoint = %self.endpoint, "opening device session");
                match self.connector.connect(&self.endpoint).await {
                    Ok(session) => {
                        self.cache_mut().connected = true;
                        session
                    }
                    Err(source) => return Err(self.discard_session(source)),
                }
            }
        };
        Ok((session, PendingIo::new(self)))
    }

    /// Puts the session back on success. On failure the session is dropped so
    /// the next operation reconnects.
    fn complete_io<T>(
        &self,
        slot: &mut SessionSlot,
        session: Box<dyn DeviceSession>,
        io: PendingIo<'_>,
        result: Result<T, SessionError>,
    ) -> Result<T, ClientError> {
        io.complete();
        match result {
            Ok(value) => {
                *slot = Some(session);
                Ok(value)
            }
            Err(source) => {
                drop(session);
                Err(self.discard_session(source))
            }
        }
    }

    fn discard_session(&self, source: SessionError) -> ClientError {
        self.cache_mut().connected = false;
        warn!(
            name = %self.name,
            endpoint = %self.endpoint,
            error = %source,
            transient = source.is_transient(),
            "discarding device session"
        );

        let name = self.name.clone();
        let endpoint = self.endpoint.clone();
        if source.is_transient() {
            ClientError::Communication {
                name,
                endpoint,
                source,
            }
        } else {
            ClientError::Device {
                name,
                endpoint,
                source,
            }
        }
    }

    fn cache(&self) -> RwLockReadGuard<'_, CachedState> {
        self.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_mut(&self) -> RwLockWriteGuard<'_, CachedState> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the client disconnected when an operation is dropped mid-flight,
/// since the session it held is gone with it.
struct PendingIo<'a> {
    client: &'a DeviceClient,
    done: bool,
}

impl<'a> PendingIo<'a> {
    fn new(client: &'a DeviceClient) -> Self {
        Self {
            client,
            done: false,
        }
    }

    fn complete(mut self) {
        self.done = true;
    }
}

impl Drop for PendingIo<'_> {
    fn drop(&mut self) {
        if !self.done {
            debug!(name = %self.client.name, "device operation abandoned");
            self.client.cache_mut().connected = false;
        }
    }
}

fn parse_source(source: &str) -> Option<u8> {
    source
        .trim()
        .parse::<u8>()
        .ok()
        .filter(|source_number| *source_number > 0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::plain("3", Some(3))]
    #[case::padded(" 12 ", Some(12))]
    #[case::zero("0", None)]
    #[case::negative("-1", None)]
    #[case::letters("abc", None)]
    #[case::too_large("256", None)]
    #[case::empty("", None)]
    fn parse_source_accepts_positive_integers(#[case] raw: &str, #[case] expected: Option<u8>) {
        assert_eq!(expected, parse_source(raw));
    }

    #[test]
    fn source_list_counts_from_one() {
        assert_eq!(
            vec!["1".to_string(), "2".into(), "3".into()],
            source_list(3).to_vec()
        );
        assert!(source_list(0).is_empty());
    }

    #[test]
    fn apply_keeps_source_list_when_input_count_is_unchanged() {
        let mut cache = CachedState::default();
        cache.apply(SwitchProperties::new(4, 1, 2));
        let first = Arc::clone(&cache.source_list);

        cache.apply(SwitchProperties::new(4, 1, 3));
        assert!(Arc::ptr_eq(&first, &cache.source_list));
        assert_eq!("3", cache.selected_source);

        cache.apply(SwitchProperties::new(8, 1, 3));
        assert!(!Arc::ptr_eq(&first, &cache.source_list));
        assert_eq!(8, cache.source_list.len());
    }
}
