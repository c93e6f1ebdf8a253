use std::io;
use std::sync::Arc;

use anyhow::Result;
use tracing::instrument;

use crate::cli::{Command, ConnectionArgs, FakeArgs, LogLevel, OutputFormat};
use crate::client::DeviceClient;
use crate::coordinator::StateCoordinator;
use crate::hw::TcpConnector;
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a device client that talks to a real switch over TCP.
#[must_use]
pub fn real_device_client(connection: ConnectionArgs) -> DeviceClient {
    let connector = TcpConnector::builder()
        .layout(connection.layout())
        .connect_timeout(connection.connect_timeout())
        .io_timeout(connection.io_timeout())
        .build();

    DeviceClient::builder()
        .name(connection.name())
        .host(connection.host())
        .maybe_port(connection.port())
        .connector(Box::new(connector))
        .build()
}

/// Creates a device client backed by an in-memory fake switch.
#[must_use]
pub fn fake_device_client(connection: ConnectionArgs, fake_args: FakeArgs) -> DeviceClient {
    let switch = fake_args.into_switch(connection.layout());

    DeviceClient::builder()
        .name(connection.name())
        .host(connection.host())
        .maybe_port(connection.port())
        .connector(switch.connector())
        .build()
}

/// Runs the CLI command against the given client.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = tesmart::Args::try_parse_from(["tesmart", "--fake", "status"])?;
/// let (command, connection, maybe_fake_args) = args.into_command_and_connection()?;
/// let client = match maybe_fake_args {
///     Some(fake_args) => tesmart::fake_device_client(connection, fake_args),
///     None => tesmart::real_device_client(connection),
/// };
/// let mut out = Vec::new();
/// tesmart::run(command, &mut out, client, tesmart::OutputFormat::Json).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device operation
/// fails, or output writing fails.
pub async fn run<W>(
    command: Command,
    out: &mut W,
    client: DeviceClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(command, out, client, None, output_format).await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device operation
/// fails, or output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    out: &mut W,
    client: DeviceClient,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        out,
        &SystemTerminalClient,
        client,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl tesmart::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = tesmart::Args::try_parse_from([
///     "tesmart",
///     "--log-level",
///     "debug",
///     "--fake",
///     "select",
///     "2",
/// ])?;
/// let log_level = args.log_level();
/// let (command, connection, maybe_fake_args) = args.into_command_and_connection()?;
/// let client = match maybe_fake_args {
///     Some(fake_args) => tesmart::fake_device_client(connection, fake_args),
///     None => tesmart::real_device_client(connection),
/// };
/// let mut out = Vec::new();
/// tesmart::run_with_clients_and_log_level(
///     command,
///     &mut out,
///     &FakeTerminal,
///     client,
///     log_level,
///     tesmart::OutputFormat::Pretty,
/// ).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, the device operation
/// fails, or output writing fails.
#[instrument(
    skip(out, terminal_client, client),
    level = "info",
    fields(command = command.name(), name = %client.name(), ?log_level)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    client: DeviceClient,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "tesmart",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let coordinator = StateCoordinator::builder()
        .client(Arc::new(client))
        .maybe_update_interval(match &command {
            Command::Watch(args) => Some(args.interval()),
            _ => None,
        })
        .build();

    match command {
        Command::Status => {
            crate::cli::status::run(&coordinator, out, terminal_client, output_format).await
        }
        Command::Check => {
            crate::cli::status::check(&coordinator, out, terminal_client, output_format).await
        }
        Command::Select(args) => {
            crate::cli::control::run(
                &coordinator,
                (&args).into(),
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Buzzer(args) => {
            crate::cli::control::run(
                &coordinator,
                (&args).into(),
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::LedTimeout(args) => {
            crate::cli::control::run(
                &coordinator,
                (&args).into(),
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::AutoInput(args) => {
            crate::cli::control::run(
                &coordinator,
                (&args).into(),
                out,
                terminal_client,
                output_format,
            )
            .await
        }
        Command::Watch(args) => {
            crate::cli::watch::run(&coordinator, &args, out, terminal_client, output_format).await
        }
    }
}
