use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::control::{AutoInputArgs, BuzzerArgs, LedTimeoutArgs, SelectArgs};
use crate::cli::watch::WatchArgs;
use crate::error::CliConfigError;
use crate::hw::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, FakeSwitch, Fault, SwitchLayout};

pub(crate) const DEFAULT_DEVICE_NAME: &str = "TESmart";
const FAKE_HOST: &str = "fake.switch";

/// Command-line options for the TESmart switch tool.
#[derive(Debug, Parser)]
#[command(name = "tesmart", about = "Control TESmart media switches over the network.")]
pub struct Args {
    /// Label used for the switch in logs and errors.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_NAME)]
    name: String,
    /// Switch host name or IP address.
    #[arg(long, global = true)]
    host: Option<String>,
    /// Switch TCP port (the switch listens on 5000 by default).
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Number of inputs on the switch model.
    #[arg(long, global = true, default_value_t = 4)]
    inputs: u8,
    /// Number of outputs on the switch model.
    #[arg(long, global = true, default_value_t = 1)]
    outputs: u8,
    /// Limit for establishing the connection (e.g. `500ms`, `3s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    connect_timeout: Option<Duration>,
    /// Limit for one command or query exchange.
    #[arg(long, global = true, value_parser = parse_duration)]
    io_timeout: Option<Duration>,
    /// Log level; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format. Defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output_format: Option<OutputFormat>,
    /// Uses an in-memory fake switch instead of the network.
    #[arg(long, global = true, conflicts_with = "host")]
    fake: bool,
    /// Input the fake switch starts on.
    #[arg(long, global = true, requires = "fake")]
    fake_selected: Option<u8>,
    /// Artificial fake I/O latency (e.g. `250ms`).
    #[arg(long, global = true, requires = "fake", value_parser = parse_duration)]
    fake_latency: Option<Duration>,
    /// Scripted fake failures as `stage:kind`, comma separated
    /// (stages: connect, update, command; kinds: timeout, refused, malformed, closed).
    #[arg(long, global = true, requires = "fake", value_delimiter = ',')]
    fake_fault: Vec<Fault>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output_format
    }

    /// Splits parsed CLI arguments into the command, connection settings and
    /// optional fake-switch settings.
    ///
    /// # Errors
    ///
    /// Returns an error when `--host` is missing outside fake mode.
    pub fn into_command_and_connection(
        self,
    ) -> anyhow::Result<(Command, ConnectionArgs, Option<FakeArgs>)> {
        let Args {
            name,
            host,
            port,
            inputs,
            outputs,
            connect_timeout,
            io_timeout,
            log_level: _,
            output_format: _,
            fake,
            fake_selected,
            fake_latency,
            fake_fault,
            command,
        } = self;

        let host = match (host, fake) {
            (Some(host), _) => host,
            (None, true) => FAKE_HOST.to_string(),
            (None, false) => return Err(CliConfigError::MissingHost.into()),
        };
        let connection = ConnectionArgs::builder()
            .name(name)
            .host(host)
            .maybe_port(port)
            .layout(SwitchLayout::new(inputs, outputs))
            .maybe_connect_timeout(connect_timeout)
            .maybe_io_timeout(io_timeout)
            .build();
        let fake_args = fake.then(|| {
            FakeArgs::builder()
                .maybe_selected(fake_selected)
                .maybe_latency(fake_latency)
                .faults(fake_fault)
                .build()
        });

        Ok((command, connection, fake_args))
    }
}

/// How to reach one switch.
#[derive(Debug, Clone, Builder)]
pub struct ConnectionArgs {
    #[builder(into, default = DEFAULT_DEVICE_NAME.to_string())]
    name: String,
    #[builder(into)]
    host: String,
    port: Option<u16>,
    #[builder(default)]
    layout: SwitchLayout,
    #[builder(default = DEFAULT_CONNECT_TIMEOUT)]
    connect_timeout: Duration,
    #[builder(default = DEFAULT_IO_TIMEOUT)]
    io_timeout: Duration,
}

impl ConnectionArgs {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.port
    }

    pub(crate) fn layout(&self) -> SwitchLayout {
        self.layout
    }

    pub(crate) fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub(crate) fn io_timeout(&self) -> Duration {
        self.io_timeout
    }
}

/// Fake switch settings for programmatic runs.
#[derive(Debug, Clone, Builder)]
pub struct FakeArgs {
    #[builder(default = 1)]
    selected: u8,
    #[builder(default)]
    latency: Duration,
    #[builder(default)]
    faults: Vec<Fault>,
}

impl FakeArgs {
    pub(crate) fn into_switch(self, layout: SwitchLayout) -> FakeSwitch {
        FakeSwitch::builder()
            .input_count(layout.inputs())
            .output_count(layout.outputs())
            .selected_source(self.selected)
            .latency(self.latency)
            .faults(self.faults)
            .build()
    }
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read the switch once and print its state.
    Status,
    /// Test the connection settings.
    Check,
    /// Route an input to the output, then print the refreshed state.
    Select(SelectArgs),
    /// Mute or unmute the front-panel buzzer.
    Buzzer(BuzzerArgs),
    /// Set how long the front-panel LEDs stay lit (0, 10 or 30 seconds).
    LedTimeout(LedTimeoutArgs),
    /// Enable or disable automatic input detection.
    AutoInput(AutoInputArgs),
    /// Keep refreshing on an interval and print every update.
    Watch(WatchArgs),
}

impl Command {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Check => "check",
            Self::Select(_args) => "select",
            Self::Buzzer(_args) => "buzzer",
            Self::LedTimeout(_args) => "led-timeout",
            Self::AutoInput(_args) => "auto-input",
            Self::Watch(_args) => "watch",
        }
    }
}

/// Output rendering mode.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Tables and colour for people.
    Pretty,
    /// One JSON document per result.
    Json,
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Off => LevelFilter::OFF,
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hw::{FaultKind, FaultStage};

    #[test]
    fn host_is_required_outside_fake_mode() {
        let args = Args::try_parse_from(["tesmart", "status"]).expect("status should parse");

        let error = args
            .into_command_and_connection()
            .expect_err("missing --host should be rejected");
        assert_matches!(
            error.downcast_ref::<CliConfigError>(),
            Some(CliConfigError::MissingHost)
        );
    }

    #[test]
    fn fake_flags_require_fake_mode() {
        let result = Args::try_parse_from(["tesmart", "--fake-selected", "2", "status"]);

        let error = result.expect_err("fake flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_mode_conflicts_with_host() {
        let result = Args::try_parse_from(["tesmart", "--fake", "--host", "10.0.0.5", "status"]);

        let error = result.expect_err("--fake and --host are exclusive");
        assert_eq!(ErrorKind::ArgumentConflict, error.kind());
    }

    #[test]
    fn connection_flags_resolve_into_settings() {
        let args = Args::try_parse_from([
            "tesmart",
            "--host",
            "10.0.0.5",
            "--port",
            "5001",
            "--inputs",
            "8",
            "--io-timeout",
            "750ms",
            "select",
            "3",
        ])
        .expect("valid arguments should parse");

        let (command, connection, fake_args) = args
            .into_command_and_connection()
            .expect("host is present");
        assert_matches!(command, Command::Select(_));
        assert_eq!("10.0.0.5", connection.host());
        assert_eq!(Some(5001), connection.port());
        assert_eq!(SwitchLayout::new(8, 1), connection.layout());
        assert_eq!(Duration::from_millis(750), connection.io_timeout());
        assert_eq!(DEFAULT_CONNECT_TIMEOUT, connection.connect_timeout());
        assert_matches!(fake_args, None);
    }

    #[test]
    fn fake_faults_split_on_commas() {
        let args = Args::try_parse_from([
            "tesmart",
            "--fake",
            "--fake-fault",
            "connect:refused,update:timeout",
            "status",
        ])
        .expect("valid fake arguments should parse");

        let (_command, connection, fake_args) = args
            .into_command_and_connection()
            .expect("fake mode needs no host");
        let fake_args = fake_args.expect("--fake should produce fake settings");
        assert_eq!(FAKE_HOST, connection.host());
        assert_eq!(
            vec![
                Fault::new(FaultStage::Connect, FaultKind::Refused),
                Fault::new(FaultStage::Update, FaultKind::Timeout),
            ],
            fake_args.faults
        );
    }

    #[test]
    fn invalid_fault_is_a_value_error() {
        let result = Args::try_parse_from(["tesmart", "--fake", "--fake-fault", "update", "status"]);

        let error = result.expect_err("fault without kind should fail");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }
}
