use std::io;

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::{instrument, warn};

use crate::cli::OutputFormat;
use crate::coordinator::{RefreshOutcome, StateCoordinator};
use crate::snapshot::DeviceSnapshot;
use crate::terminal::TerminalClient;
use crate::utils::format_error_chain;

use super::ui::{Painter, SnapshotView, Spinner};

/// Arguments for `select`.
#[derive(Debug, Args)]
pub struct SelectArgs {
    /// Input to route, counting from 1.
    source: String,
}

impl SelectArgs {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Arguments for `buzzer`.
#[derive(Debug, Args)]
pub struct BuzzerArgs {
    #[arg(value_enum)]
    state: BuzzerState,
}

impl BuzzerArgs {
    #[must_use]
    pub fn new(state: BuzzerState) -> Self {
        Self { state }
    }
}

/// Requested buzzer state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, derive_more::Display)]
pub enum BuzzerState {
    #[display("muted")]
    Mute,
    #[display("audible")]
    Unmute,
}

/// Arguments for `led-timeout`.
#[derive(Debug, Args)]
pub struct LedTimeoutArgs {
    /// Seconds before the LEDs switch off; 0 keeps them lit.
    seconds: u32,
}

impl LedTimeoutArgs {
    #[must_use]
    pub fn new(seconds: u32) -> Self {
        Self { seconds }
    }
}

/// Arguments for `auto-input`.
#[derive(Debug, Args)]
pub struct AutoInputArgs {
    #[arg(value_enum)]
    state: AutoInputState,
}

impl AutoInputArgs {
    #[must_use]
    pub fn new(state: AutoInputState) -> Self {
        Self { state }
    }
}

/// Requested automatic input detection state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum, derive_more::Display)]
pub enum AutoInputState {
    #[display("on")]
    On,
    #[display("off")]
    Off,
}

/// One device command issued from the CLI.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) enum ControlRequest {
    Select(String),
    Buzzer(BuzzerState),
    LedTimeout(u32),
    AutoInput(AutoInputState),
}

impl From<&SelectArgs> for ControlRequest {
    fn from(args: &SelectArgs) -> Self {
        Self::Select(args.source.clone())
    }
}

impl From<&BuzzerArgs> for ControlRequest {
    fn from(args: &BuzzerArgs) -> Self {
        Self::Buzzer(args.state)
    }
}

impl From<&LedTimeoutArgs> for ControlRequest {
    fn from(args: &LedTimeoutArgs) -> Self {
        Self::LedTimeout(args.seconds)
    }
}

impl From<&AutoInputArgs> for ControlRequest {
    fn from(args: &AutoInputArgs) -> Self {
        Self::AutoInput(args.state)
    }
}

impl ControlRequest {
    fn action(&self) -> &'static str {
        match self {
            Self::Select(_source) => "select",
            Self::Buzzer(_state) => "buzzer",
            Self::LedTimeout(_seconds) => "led_timeout",
            Self::AutoInput(_state) => "auto_input",
        }
    }

    fn applied_value(&self) -> String {
        match self {
            Self::Select(source) => source.trim().to_string(),
            Self::Buzzer(state) => state.to_string(),
            Self::LedTimeout(0) => "never".to_string(),
            Self::LedTimeout(seconds) => format!("{seconds}s"),
            Self::AutoInput(state) => state.to_string(),
        }
    }
}

/// JSON result emitted by a control command.
#[derive(Debug, Serialize)]
struct ControlReport<'a> {
    action: &'static str,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a DeviceSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_error: Option<String>,
}

/// Executes one device command, then refreshes so the printed state reflects it.
///
/// A failed follow-up refresh is reported but does not fail the command.
#[instrument(skip(coordinator, out, terminal_client), level = "info", fields(action = request.action(), ?output_format))]
pub(crate) async fn run<W>(
    coordinator: &StateCoordinator,
    request: ControlRequest,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let spinner = Spinner::new(terminal_client.stderr_is_terminal());
    let client = coordinator.client();
    spinner
        .with_spinner("Sending command to switch", async {
            match &request {
                ControlRequest::Select(source) => client.select_source(source).await,
                ControlRequest::Buzzer(state) => {
                    client
                        .set_buzzer_muting(*state == BuzzerState::Mute)
                        .await
                }
                ControlRequest::LedTimeout(seconds) => {
                    client.set_led_timeout_seconds(*seconds).await
                }
                ControlRequest::AutoInput(state) => {
                    client
                        .set_auto_input_detection(*state == AutoInputState::On)
                        .await
                }
            }
        })
        .await?;

    let (snapshot, refresh_error) = match coordinator.request_refresh().await {
        RefreshOutcome::Updated(snapshot) => (Some(snapshot), None),
        RefreshOutcome::Failed(error) => {
            warn!(%error, "command applied but the follow-up refresh failed");
            (None, Some(format_error_chain(error.as_ref())))
        }
    };

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(
                out,
                "{} {}: {}",
                painter.success("✓"),
                request.action().replace('_', " "),
                painter.value(request.applied_value())
            )?;
            match (&snapshot, &refresh_error) {
                (Some(snapshot), _) => {
                    writeln!(
                        out,
                        "{}",
                        SnapshotView::new(coordinator.client(), snapshot, &painter)
                    )?;
                }
                (None, Some(error)) => {
                    writeln!(
                        out,
                        "{} {error}",
                        painter.warning("state refresh failed:")
                    )?;
                }
                (None, None) => {}
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer(
                &mut *out,
                &ControlReport {
                    action: request.action(),
                    value: request.applied_value(),
                    state: snapshot.as_ref(),
                    refresh_error,
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}
