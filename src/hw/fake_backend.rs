use std::collections::VecDeque;
use std::io;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::debug;

use super::Endpoint;
use super::session::{DeviceSession, SessionConnector, SwitchProperties};
use crate::error::{FixtureError, SessionError};
use crate::protocol::{self, LedTimeout};
use crate::utils::format_hex;

const FAKE_TIMEOUT: Duration = Duration::from_secs(3);

/// Device operation a scripted fault applies to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum FaultStage {
    #[display("connect")]
    Connect,
    #[display("update")]
    Update,
    /// Any of the four device commands.
    #[display("command")]
    Command,
}

impl FromStr for FaultStage {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "connect" => Ok(Self::Connect),
            "update" => Ok(Self::Update),
            "command" => Ok(Self::Command),
            other => Err(FixtureError::UnknownFaultStage {
                value: other.to_string(),
            }),
        }
    }
}

/// Failure a scripted fault produces.
#[derive(Debug, Clone, Copy, Eq, PartialEq, derive_more::Display)]
pub enum FaultKind {
    #[display("timeout")]
    Timeout,
    #[display("refused")]
    Refused,
    #[display("malformed")]
    Malformed,
    #[display("closed")]
    Closed,
}

impl FaultKind {
    fn into_error(self) -> SessionError {
        match self {
            Self::Timeout => SessionError::Timeout {
                timeout: FAKE_TIMEOUT,
            },
            Self::Refused => SessionError::ConnectionRefused {
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
            Self::Malformed => SessionError::MalformedResponse {
                payload: format_hex(&[0xAA, 0xBB, 0x03, 0x7F, 0x00, 0xEE]),
            },
            Self::Closed => SessionError::Closed,
        }
    }
}

impl FromStr for FaultKind {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "timeout" => Ok(Self::Timeout),
            "refused" => Ok(Self::Refused),
            "malformed" => Ok(Self::Malformed),
            "closed" => Ok(Self::Closed),
            other => Err(FixtureError::UnknownFaultKind {
                value: other.to_string(),
            }),
        }
    }
}

/// One scripted failure, consumed by the next operation of its stage.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Fault {
    stage: FaultStage,
    kind: FaultKind,
}

impl Fault {
    #[must_use]
    pub fn new(stage: FaultStage, kind: FaultKind) -> Self {
        Self { stage, kind }
    }
}

impl FromStr for Fault {
    type Err = FixtureError;

    /// Parses `stage:kind`, for example `update:timeout`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let Some((stage, kind)) = value.split_once(':') else {
            return Err(FixtureError::InvalidFaultRecord {
                value: value.to_string(),
            });
        };
        Ok(Self::new(stage.parse()?, kind.parse()?))
    }
}

/// Call counters recorded by a [`FakeSwitch`].
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct FakeCounters {
    connects: usize,
    updates: usize,
    commands: usize,
    max_concurrent_io: usize,
}

impl FakeCounters {
    /// Connection attempts, including failed ones.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.connects
    }

    #[must_use]
    pub fn updates(&self) -> usize {
        self.updates
    }

    #[must_use]
    pub fn commands(&self) -> usize {
        self.commands
    }

    /// Highest number of operations observed in flight at once.
    #[must_use]
    pub fn max_concurrent_io(&self) -> usize {
        self.max_concurrent_io
    }

    /// Every device operation attempted so far.
    #[must_use]
    pub fn total_io(&self) -> usize {
        self.connects + self.updates + self.commands
    }
}

#[derive(Debug)]
struct FakeSwitchState {
    input_count: u8,
    output_count: u8,
    selected_source: u8,
    buzzer_muted: bool,
    auto_input_detection: bool,
    led_timeout: LedTimeout,
    latency: Duration,
    faults: VecDeque<Fault>,
    counters: FakeCounters,
    active_io: usize,
}

impl FakeSwitchState {
    fn begin_io(&mut self, stage: FaultStage) {
        match stage {
            FaultStage::Connect => self.counters.connects += 1,
            FaultStage::Update => self.counters.updates += 1,
            FaultStage::Command => self.counters.commands += 1,
        }
        self.active_io += 1;
        self.counters.max_concurrent_io = self.counters.max_concurrent_io.max(self.active_io);
    }

    fn take_fault(&mut self, stage: FaultStage) -> Option<FaultKind> {
        let index = self.faults.iter().position(|fault| fault.stage == stage)?;
        self.faults.remove(index).map(|fault| fault.kind)
    }
}

/// In-memory switch used by tests and the `--fake` backend.
///
/// Clones share one device, so a test can keep a handle while the client owns
/// the connector.
#[derive(Debug, Clone)]
pub struct FakeSwitch {
    state: Arc<Mutex<FakeSwitchState>>,
}

#[bon::bon]
impl FakeSwitch {
    /// Creates a fake switch.
    ///
    /// ```
    /// let switch = tesmart::FakeSwitch::builder()
    ///     .input_count(8)
    ///     .selected_source(2)
    ///     .build();
    /// assert_eq!(2, switch.selected_source());
    /// ```
    #[builder]
    pub fn new(
        #[builder(default = 4)] input_count: u8,
        #[builder(default = 1)] output_count: u8,
        #[builder(default = 1)] selected_source: u8,
        #[builder(default)] latency: Duration,
        #[builder(default)] faults: Vec<Fault>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeSwitchState {
                input_count,
                output_count,
                selected_source,
                buzzer_muted: false,
                auto_input_detection: false,
                led_timeout: LedTimeout::Never,
                latency,
                faults: faults.into(),
                counters: FakeCounters::default(),
                active_io: 0,
            })),
        }
    }
}

impl FakeSwitch {
    /// Returns a connector whose sessions talk to this switch.
    #[must_use]
    pub fn connector(&self) -> Box<dyn SessionConnector> {
        Box::new(FakeConnector {
            switch: self.clone(),
        })
    }

    /// Queues a failure for the next operation of the fault's stage.
    pub fn fail_next(&self, fault: Fault) {
        self.lock().faults.push_back(fault);
    }

    /// Changes the input count the device reports.
    pub fn set_input_count(&self, input_count: u8) {
        self.lock().input_count = input_count;
    }

    /// Changes the routed input as if someone pressed a front-panel button.
    pub fn set_selected_source(&self, source: u8) {
        self.lock().selected_source = source;
    }

    /// Delay applied to every later device operation.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    #[must_use]
    pub fn counters(&self) -> FakeCounters {
        self.lock().counters
    }

    #[must_use]
    pub fn selected_source(&self) -> u8 {
        self.lock().selected_source
    }

    #[must_use]
    pub fn buzzer_muted(&self) -> bool {
        self.lock().buzzer_muted
    }

    #[must_use]
    pub fn led_timeout(&self) -> LedTimeout {
        self.lock().led_timeout
    }

    #[must_use]
    pub fn auto_input_detection(&self) -> bool {
        self.lock().auto_input_detection
    }

    fn lock(&self) -> MutexGuard<'_, FakeSwitchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn perform<T>(
        &self,
        stage: FaultStage,
        apply: impl FnOnce(&mut FakeSwitchState) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let latency = {
            let mut state = self.lock();
            state.begin_io(stage);
            state.latency
        };
        let _active = ActiveIo { switch: self };
        if !latency.is_zero() {
            sleep(latency).await;
        }

        let mut state = self.lock();
        if let Some(kind) = state.take_fault(stage) {
            debug!(%stage, %kind, "injecting fake fault");
            return Err(kind.into_error());
        }
        apply(&mut state)
    }
}

struct ActiveIo<'a> {
    switch: &'a FakeSwitch,
}

impl Drop for ActiveIo<'_> {
    fn drop(&mut self) {
        let mut state = self.switch.lock();
        state.active_io = state.active_io.saturating_sub(1);
    }
}

#[derive(Debug)]
struct FakeConnector {
    switch: FakeSwitch,
}

#[async_trait]
impl SessionConnector for FakeConnector {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DeviceSession>, SessionError> {
        self.switch
            .perform(FaultStage::Connect, |_state| Ok(()))
            .await?;
        debug!(%endpoint, "fake switch connected");
        Ok(Box::new(FakeSession {
            switch: self.switch.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeSession {
    switch: FakeSwitch,
}

#[async_trait]
impl DeviceSession for FakeSession {
    async fn update(&mut self) -> Result<SwitchProperties, SessionError> {
        self.switch
            .perform(FaultStage::Update, |state| {
                let reply = protocol::encode_active_input_reply(state.selected_source);
                match protocol::decode_reply(&reply)? {
                    protocol::SwitchReply::ActiveInput(active) => Ok(SwitchProperties::new(
                        state.input_count,
                        state.output_count,
                        active,
                    )),
                    protocol::SwitchReply::Other { .. } => Err(SessionError::MalformedResponse {
                        payload: format_hex(&reply),
                    }),
                }
            })
            .await
    }

    async fn select_source(&mut self, source: u8) -> Result<(), SessionError> {
        self.switch
            .perform(FaultStage::Command, |state| {
                if source == 0 || source > state.input_count {
                    return Err(SessionError::InvalidArgument {
                        argument: "source",
                        value: source.to_string(),
                    });
                }
                state.selected_source = source;
                Ok(())
            })
            .await
    }

    async fn set_buzzer_muting(&mut self, muted: bool) -> Result<(), SessionError> {
        self.switch
            .perform(FaultStage::Command, |state| {
                state.buzzer_muted = muted;
                Ok(())
            })
            .await
    }

    async fn set_led_timeout_seconds(&mut self, seconds: u32) -> Result<(), SessionError> {
        self.switch
            .perform(FaultStage::Command, |state| {
                state.led_timeout = LedTimeout::from_seconds(seconds).ok_or_else(|| {
                    SessionError::InvalidArgument {
                        argument: "LED timeout",
                        value: seconds.to_string(),
                    }
                })?;
                Ok(())
            })
            .await
    }

    async fn set_auto_input_detection(&mut self, enabled: bool) -> Result<(), SessionError> {
        self.switch
            .perform(FaultStage::Command, |state| {
                state.auto_input_detection = enabled;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("fake", None)
    }

    #[rstest]
    #[case("update:timeout", Fault::new(FaultStage::Update, FaultKind::Timeout))]
    #[case("connect:refused", Fault::new(FaultStage::Connect, FaultKind::Refused))]
    #[case(" command : closed ", Fault::new(FaultStage::Command, FaultKind::Closed))]
    fn fault_parses_stage_and_kind(#[case] raw: &str, #[case] expected: Fault) {
        assert_eq!(Ok(expected), raw.parse::<Fault>());
    }

    #[rstest]
    #[case("update", FixtureError::InvalidFaultRecord { value: "update".into() })]
    #[case("reboot:timeout", FixtureError::UnknownFaultStage { value: "reboot".into() })]
    #[case("update:fire", FixtureError::UnknownFaultKind { value: "fire".into() })]
    fn fault_rejects_invalid_records(#[case] raw: &str, #[case] expected: FixtureError) {
        assert_eq!(Err(expected), raw.parse::<Fault>());
    }

    #[tokio::test]
    async fn faults_apply_only_to_their_stage() {
        let switch = FakeSwitch::builder()
            .faults(vec![Fault::new(FaultStage::Update, FaultKind::Timeout)])
            .build();
        let mut session = switch
            .connector()
            .connect(&endpoint())
            .await
            .expect("connect has no scripted fault");

        assert_matches!(session.update().await, Err(SessionError::Timeout { .. }));
        let properties = session.update().await.expect("fault is consumed once");
        assert_eq!(SwitchProperties::new(4, 1, 1), properties);
        assert_eq!(1, switch.counters().connects());
        assert_eq!(2, switch.counters().updates());
    }

    #[tokio::test]
    async fn commands_mutate_device_state() {
        let switch = FakeSwitch::builder().build();
        let mut session = switch
            .connector()
            .connect(&endpoint())
            .await
            .expect("fake connect should succeed");

        session.select_source(3).await.expect("source 3 exists");
        session.set_buzzer_muting(true).await.expect("buzzer accepts mute");
        session
            .set_led_timeout_seconds(10)
            .await
            .expect("10s is supported");
        session
            .set_auto_input_detection(true)
            .await
            .expect("auto detection accepts enable");

        assert_eq!(3, switch.selected_source());
        assert!(switch.buzzer_muted());
        assert_eq!(LedTimeout::TenSeconds, switch.led_timeout());
        assert!(switch.auto_input_detection());
        assert_eq!(4, switch.counters().commands());
    }

    #[tokio::test]
    async fn unsupported_led_timeout_is_invalid_argument() {
        let switch = FakeSwitch::builder().build();
        let mut session = switch
            .connector()
            .connect(&endpoint())
            .await
            .expect("fake connect should succeed");

        assert_matches!(
            session.set_led_timeout_seconds(15).await,
            Err(SessionError::InvalidArgument { argument: "LED timeout", .. })
        );
    }
}
