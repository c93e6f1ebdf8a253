mod event_view;
mod painter;
mod snapshot_view;
mod spinner;
mod table;

pub(crate) use self::event_view::EventView;
pub(crate) use self::painter::Painter;
pub(crate) use self::snapshot_view::SnapshotView;
pub(crate) use self::spinner::Spinner;
