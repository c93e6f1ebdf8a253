use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Progress spinner shown on stderr while the switch is being talked to.
#[derive(Debug)]
pub(crate) struct Spinner {
    enabled: bool,
}

impl Spinner {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Awaits `operation` while rendering a spinner when enabled. The spinner
    /// is cleared on success and left with a failure mark otherwise.
    pub(crate) async fn with_spinner<Fut, T, E>(&self, message: &str, operation: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            return operation.await;
        }

        let spinner = new_spinner(message);
        let result = operation.await;
        match &result {
            Ok(_value) => spinner.finish_and_clear(),
            Err(_error) => spinner.finish_with_message(format!("{} {message}", "✗".red())),
        }
        result
    }
}

fn new_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(spinner_style());
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(90));
    spinner
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan.bold} {msg}")
        .unwrap_or_else(|_error| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}
