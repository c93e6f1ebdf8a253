use std::fmt::{self, Display, Formatter};

use time::format_description::well_known::Rfc3339;

use crate::coordinator::CoordinatorEvent;

use super::painter::Painter;

/// Renders one coordinator event as a single line.
pub(crate) struct EventView<'a> {
    event: &'a CoordinatorEvent,
    painter: &'a Painter,
}

impl<'a> EventView<'a> {
    pub(crate) fn new(event: &'a CoordinatorEvent, painter: &'a Painter) -> Self {
        Self { event, painter }
    }
}

impl Display for EventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.event {
            CoordinatorEvent::Updated { snapshot, at } => write!(
                f,
                "{} {} source {} of {} ({})",
                self.painter.muted(at.format(&Rfc3339).map_err(|_error| fmt::Error)?),
                self.painter.success("updated"),
                self.painter.value(snapshot.selected_source()),
                snapshot.input_count(),
                snapshot.model_name(),
            ),
            CoordinatorEvent::UpdateFailed {
                error,
                consecutive_failures,
                at,
            } => write!(
                f,
                "{} {} ({} in a row, {}): {error}",
                self.painter.muted(at.format(&Rfc3339).map_err(|_error| fmt::Error)?),
                self.painter.failure("update failed"),
                consecutive_failures,
                error.kind(),
            ),
        }
    }
}
