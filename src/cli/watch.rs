use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use time::OffsetDateTime;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::{info, instrument, warn};

use crate::cli::OutputFormat;
use crate::cli::command::parse_duration;
use crate::coordinator::{CoordinatorEvent, StateCoordinator};
use crate::snapshot::DeviceSnapshot;
use crate::terminal::TerminalClient;
use crate::utils::format_error_chain;

use super::ui::{EventView, Painter};

/// Arguments for the `watch` command.
#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Time between refreshes (e.g. `30s`, `5m`).
    #[arg(long, default_value = "5m", value_parser = parse_duration)]
    interval: Duration,
    /// Stop after this many updates. If omitted, watch until Ctrl+C.
    #[arg(long)]
    max_updates: Option<usize>,
}

impl WatchArgs {
    /// Creates watch arguments.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// let args = tesmart::WatchArgs::new(Duration::from_secs(30), Some(3));
    /// assert_eq!(Duration::from_secs(30), args.interval());
    /// ```
    #[must_use]
    pub fn new(interval: Duration, max_updates: Option<usize>) -> Self {
        Self {
            interval,
            max_updates,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// JSON line emitted for every coordinator event.
#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchRecord<'a> {
    Updated {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        state: &'a DeviceSnapshot,
    },
    UpdateFailed {
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
        kind: String,
        error: String,
        consecutive_failures: u32,
    },
}

impl<'a> From<&'a CoordinatorEvent> for WatchRecord<'a> {
    fn from(event: &'a CoordinatorEvent) -> Self {
        match event {
            CoordinatorEvent::Updated { snapshot, at } => Self::Updated {
                at: *at,
                state: snapshot,
            },
            CoordinatorEvent::UpdateFailed {
                error,
                consecutive_failures,
                at,
            } => Self::UpdateFailed {
                at: *at,
                kind: error.kind().to_string(),
                error: format_error_chain(error.as_ref()),
                consecutive_failures: *consecutive_failures,
            },
        }
    }
}

/// Executes the `watch` command: one refresh right away, then one per
/// interval, printing every event until Ctrl+C or the update limit.
#[instrument(skip(coordinator, out, terminal_client), level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    coordinator: &StateCoordinator,
    args: &WatchArgs,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let painter = Painter::new(terminal_client.stdout_is_terminal());
    let mut events = BroadcastStream::new(coordinator.events());
    let mut seen = 0usize;

    coordinator.request_refresh().await;
    coordinator.start();

    let watch_result = loop {
        if args.max_updates.is_some_and(|limit| seen >= limit) {
            break Ok(());
        }

        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping watch");
                break signal.map_err(anyhow::Error::from);
            }
            maybe_event = events.next() => {
                let Some(event) = maybe_event else {
                    break Ok(());
                };
                match event {
                    Ok(event) => {
                        if let Err(error) = write_event(out, &event, &painter, output_format) {
                            break Err(error);
                        }
                        seen += 1;
                    }
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        warn!(skipped, "watch output fell behind, events were dropped");
                    }
                }
            }
        }
    };

    coordinator.shutdown().await;
    watch_result
}

fn write_event<W>(
    out: &mut W,
    event: &CoordinatorEvent,
    painter: &Painter,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    match output_format {
        OutputFormat::Pretty => writeln!(out, "{}", EventView::new(event, painter))?,
        OutputFormat::Json => {
            serde_json::to_writer(&mut *out, &WatchRecord::from(event))?;
            writeln!(out)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use insta::assert_snapshot;

    use super::*;
    use crate::error::ClientError;

    #[test]
    fn failed_update_record_carries_kind_and_message() {
        let event = CoordinatorEvent::UpdateFailed {
            error: Arc::new(ClientError::InvalidSource {
                value: "abc".into(),
            }),
            consecutive_failures: 1,
            at: OffsetDateTime::from_unix_timestamp(1_700_000_000)
                .expect("timestamp should be valid"),
        };

        let json = serde_json::to_string(&WatchRecord::from(&event)).expect("record should serialize");
        assert_snapshot!(json, @r#"{"event":"update_failed","at":"2023-11-14T22:13:20Z","kind":"unknown","error":"invalid source identifier `abc`","consecutive_failures":1}"#);
    }
}
