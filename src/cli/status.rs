use std::io;

use anyhow::Result;
use serde::Serialize;
use tracing::instrument;

use crate::cli::OutputFormat;
use crate::coordinator::StateCoordinator;
use crate::error::ClientErrorKind;
use crate::hw::Endpoint;
use crate::snapshot::DeviceSnapshot;
use crate::terminal::TerminalClient;
use crate::utils::format_error_chain;

use super::ui::{Painter, SnapshotView, Spinner};

/// JSON document emitted by `status`.
#[derive(Debug, Serialize)]
struct StatusReport<'a> {
    name: &'a str,
    endpoint: &'a Endpoint,
    model: String,
    #[serde(flatten)]
    snapshot: &'a DeviceSnapshot,
}

/// JSON document emitted by `check`.
#[derive(Debug, Serialize)]
struct CheckReport<'a> {
    name: &'a str,
    endpoint: &'a Endpoint,
    connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

/// Executes the `status` command.
#[instrument(skip(coordinator, out, terminal_client), level = "info", fields(?output_format))]
pub(crate) async fn run<W>(
    coordinator: &StateCoordinator,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let snapshot = Spinner::new(terminal_client.stderr_is_terminal())
        .with_spinner("Reading switch state", coordinator.first_refresh())
        .await?;
    let client = coordinator.client();

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", SnapshotView::new(client, &snapshot, &painter))?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(
                &mut *out,
                &StatusReport {
                    name: client.name(),
                    endpoint: client.endpoint(),
                    model: snapshot.model_name(),
                    snapshot: &snapshot,
                },
            )?;
            writeln!(out)?;
        }
    }

    Ok(())
}

/// Executes the `check` command. A failed check is printed and then returned
/// as the command error.
#[instrument(skip(coordinator, out, terminal_client), level = "info", fields(?output_format))]
pub(crate) async fn check<W>(
    coordinator: &StateCoordinator,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let client = coordinator.client();
    let result = Spinner::new(terminal_client.stderr_is_terminal())
        .with_spinner("Testing connection", client.check_connection())
        .await;
    let connected = matches!(result, Ok(true));
    let error_kind: Option<ClientErrorKind> = result.as_ref().err().map(|error| error.kind());

    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            match error_kind {
                None => writeln!(
                    out,
                    "{} connected to {} at {}",
                    painter.success("✓"),
                    painter.value(client.name()),
                    client.endpoint()
                )?,
                Some(kind) => writeln!(
                    out,
                    "{} {} error reaching {} at {}",
                    painter.failure("✗"),
                    kind,
                    painter.value(client.name()),
                    client.endpoint()
                )?,
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer(
                &mut *out,
                &CheckReport {
                    name: client.name(),
                    endpoint: client.endpoint(),
                    connected,
                    error: error_kind.map(|kind| kind.to_string()),
                    message: result.as_ref().err().map(|error| format_error_chain(error)),
                },
            )?;
            writeln!(out)?;
        }
    }

    result?;
    Ok(())
}
