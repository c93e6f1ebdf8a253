use std::fmt::{self, Display, Formatter};

use crate::client::DeviceClient;
use crate::snapshot::{DeviceSnapshot, PowerStatus};
use crate::utils::format_sources;

use super::painter::Painter;
use super::table::KeyValueTable;

/// Renders a switch snapshot as a key-value table.
pub(crate) struct SnapshotView<'a> {
    client: &'a DeviceClient,
    snapshot: &'a DeviceSnapshot,
    painter: &'a Painter,
}

impl<'a> SnapshotView<'a> {
    pub(crate) fn new(
        client: &'a DeviceClient,
        snapshot: &'a DeviceSnapshot,
        painter: &'a Painter,
    ) -> Self {
        Self {
            client,
            snapshot,
            painter,
        }
    }
}

impl Display for SnapshotView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let snapshot = self.snapshot;
        let table = KeyValueTable::new(
            painter,
            vec![
                ("name", painter.value(self.client.name())),
                ("endpoint", self.client.endpoint().to_string()),
                ("model", snapshot.model_name()),
                (
                    "status",
                    painter.status(
                        snapshot.status().to_string(),
                        snapshot.status() == PowerStatus::On,
                    ),
                ),
                ("inputs", snapshot.input_count().to_string()),
                ("outputs", snapshot.output_count().to_string()),
                ("selected", painter.value(snapshot.selected_source())),
                ("sources", format_sources(snapshot.source_list())),
            ],
        );
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::hw::FakeSwitch;

    fn client() -> DeviceClient {
        DeviceClient::builder()
            .name("Rack")
            .host("10.0.0.5")
            .connector(FakeSwitch::builder().build().connector())
            .build()
    }

    #[test]
    fn disconnected_snapshot_renders_sentinel_values() {
        let client = client();
        let painter = Painter::new(false);
        let snapshot = client.state();

        assert_snapshot!(SnapshotView::new(&client, &snapshot, &painter).to_string(), @r"
        ╭──────────┬──────────────────╮
        │ field    │ value            │
        ├──────────┼──────────────────┤
        │ name     │ Rack             │
        │ endpoint │ tcp://10.0.0.5   │
        │ model    │ 0x0 Media Switch │
        │ status   │ off              │
        │ inputs   │ 0                │
        │ outputs  │ 0                │
        │ selected │ 0                │
        │ sources  │ -                │
        ╰──────────┴──────────────────╯
        ");
    }

    #[tokio::test]
    async fn connected_snapshot_lists_sources() {
        let client = client();
        client
            .refresh_state()
            .await
            .expect("fake switch should refresh");
        let painter = Painter::new(false);
        let snapshot = client.state();

        let rendered = SnapshotView::new(&client, &snapshot, &painter).to_string();
        assert!(rendered.contains("│ status   │ on "));
        assert!(rendered.contains("1, 2, 3, 4"));
        assert!(rendered.contains("4x1 Media Switch"));
    }
}
