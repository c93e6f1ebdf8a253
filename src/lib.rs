//! Client library and CLI for TESmart HDMI media switches.
//!
//! [`DeviceClient`] owns the connection to one switch and classifies every
//! failure; [`StateCoordinator`] keeps a cached [`DeviceSnapshot`] fresh on an
//! interval and on demand.

mod app;
mod cli;
mod client;
mod coordinator;
mod error;
mod hw;
mod protocol;
mod snapshot;
mod telemetry;
mod terminal;
mod utils;

pub use app::{
    fake_device_client, real_device_client, run, run_with_clients_and_log_level,
    run_with_log_level,
};
pub use cli::{
    Args, AutoInputArgs, AutoInputState, BuzzerArgs, BuzzerState, Command, ConnectionArgs,
    FakeArgs, LedTimeoutArgs, LogLevel, OutputFormat, SelectArgs, WatchArgs,
};
pub use client::DeviceClient;
pub use coordinator::{
    CoordinatorEvent, CoordinatorPhase, DEFAULT_UPDATE_INTERVAL, RefreshOutcome, StateCoordinator,
};
pub use error::{ClientError, ClientErrorKind, FixtureError, SessionError};
pub use hw::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, DEFAULT_PORT, DeviceSession, Endpoint,
    FakeCounters, FakeSwitch, Fault, FaultKind, FaultStage, SessionConnector, SwitchLayout,
    SwitchProperties, TcpConnector,
};
pub use protocol::{FrameCodecError, LedTimeout};
pub use snapshot::{DeviceSnapshot, PowerStatus};
pub use terminal::TerminalClient;
