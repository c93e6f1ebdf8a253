pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod status;
pub(crate) mod ui;
pub(crate) mod watch;

pub use self::command::{Args, Command, ConnectionArgs, FakeArgs, LogLevel, OutputFormat};
pub use self::control::{
    AutoInputArgs, AutoInputState, BuzzerArgs, BuzzerState, LedTimeoutArgs, SelectArgs,
};
pub use self::watch::WatchArgs;
