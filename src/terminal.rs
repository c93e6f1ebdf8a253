use std::io::{self, IsTerminal};

/// Reports whether the standard streams are attached to a terminal.
///
/// Injected into the app so tests can force plain output.
pub trait TerminalClient: Send + Sync {
    fn stdout_is_terminal(&self) -> bool;
    fn stderr_is_terminal(&self) -> bool;
}

/// Terminal detection backed by the process's real streams.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
