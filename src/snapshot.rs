use std::sync::Arc;

use serde::Serialize;

/// Coarse device status. `Off` means "no connection", not a real power state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum PowerStatus {
    #[display("on")]
    On,
    #[display("off")]
    Off,
}

/// Externally visible switch state at one point in time.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    input_count: u8,
    output_count: u8,
    source_list: Arc<[String]>,
    selected_source: String,
    status: PowerStatus,
}

impl DeviceSnapshot {
    pub(crate) fn connected(
        input_count: u8,
        output_count: u8,
        source_list: Arc<[String]>,
        selected_source: String,
    ) -> Self {
        Self {
            input_count,
            output_count,
            source_list,
            selected_source,
            status: PowerStatus::On,
        }
    }

    /// Returns the fixed state reported while no session is held.
    ///
    /// ```
    /// use tesmart::{DeviceSnapshot, PowerStatus};
    ///
    /// let snapshot = DeviceSnapshot::disconnected();
    /// assert_eq!(PowerStatus::Off, snapshot.status());
    /// assert!(snapshot.source_list().is_empty());
    /// assert_eq!("0", snapshot.selected_source());
    /// ```
    #[must_use]
    pub fn disconnected() -> Self {
        Self {
            input_count: 0,
            output_count: 0,
            source_list: Arc::from(Vec::<String>::new()),
            selected_source: "0".to_string(),
            status: PowerStatus::Off,
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

    /// Returns the selectable sources, `"1"` through `"N"`.
    #[must_use]
    pub fn source_list(&self) -> &[String] {
        &self.source_list
    }

    #[must_use]
    pub fn selected_source(&self) -> &str {
        &self.selected_source
    }

    #[must_use]
    pub fn status(&self) -> PowerStatus {
        self.status
    }

    /// Returns a model label such as `4x1 Media Switch`.
    #[must_use]
    pub fn model_name(&self) -> String {
        format!("{}x{} Media Switch", self.input_count, self.output_count)
    }

    /// Returns whether both snapshots hold the same source list allocation.
    ///
    /// The client keeps one list until the input count changes, so consumers
    /// can skip diffing the list when this holds.
    #[must_use]
    pub fn shares_source_list_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.source_list, &other.source_list)
    }
}
