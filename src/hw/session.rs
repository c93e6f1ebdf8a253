use std::fmt::Debug;

use async_trait::async_trait;

use super::Endpoint;
use crate::error::SessionError;

/// Property values read from the switch by one [`DeviceSession::update`] call.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SwitchProperties {
    input_count: u8,
    output_count: u8,
    selected_source: u8,
}

impl SwitchProperties {
    /// Creates a property read.
    #[must_use]
    pub fn new(input_count: u8, output_count: u8, selected_source: u8) -> Self {
        Self {
            input_count,
            output_count,
            selected_source,
        }
    }

    #[must_use]
    pub fn input_count(&self) -> u8 {
        self.input_count
    }

    #[must_use]
    pub fn output_count(&self) -> u8 {
        self.output_count
    }

    /// Returns the routed input, 1-based.
    #[must_use]
    pub fn selected_source(&self) -> u8 {
        self.selected_source
    }
}

/// Port counts of a switch model. The device does not report them itself.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct SwitchLayout {
    inputs: u8,
    outputs: u8,
}

impl SwitchLayout {
    /// Creates a layout with the given port counts.
    ///
    /// ```
    /// let layout = tesmart::SwitchLayout::new(8, 1);
    /// assert_eq!(8, layout.inputs());
    /// ```
    #[must_use]
    pub fn new(inputs: u8, outputs: u8) -> Self {
        Self { inputs, outputs }
    }

    #[must_use]
    pub fn inputs(&self) -> u8 {
        self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> u8 {
        self.outputs
    }
}

impl Default for SwitchLayout {
    /// The smallest TESmart matrix: four inputs routed to one output.
    fn default() -> Self {
        Self::new(4, 1)
    }
}

/// A live connection to one switch.
///
/// Sessions are not safe for concurrent use and perform no retries. Any error
/// leaves the session in an unknown state, so owners drop it and connect again.
#[async_trait]
pub trait DeviceSession: Send + Debug {
    /// Reads the current property values from the device.
    async fn update(&mut self) -> Result<SwitchProperties, SessionError>;

    /// Routes the given 1-based input to the output.
    async fn select_source(&mut self, source: u8) -> Result<(), SessionError>;

    async fn set_buzzer_muting(&mut self, muted: bool) -> Result<(), SessionError>;

    /// Sets the LED timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidArgument`] when `seconds` is not one of
    /// `0`, `10` or `30`, in addition to transport failures.
    async fn set_led_timeout_seconds(&mut self, seconds: u32) -> Result<(), SessionError>;

    async fn set_auto_input_detection(&mut self, enabled: bool) -> Result<(), SessionError>;
}

/// Opens sessions to a switch. One call is one connection attempt.
#[async_trait]
pub trait SessionConnector: Send + Sync + Debug {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn DeviceSession>, SessionError>;
}
