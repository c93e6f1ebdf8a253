use std::fmt::{self, Display, Formatter};

use tabled::{builder::Builder, settings::Style as TableStyle};

use super::painter::Painter;

/// Two-column field/value table that renders via `Display`.
#[derive(Debug)]
pub(crate) struct KeyValueTable {
    rows: Vec<[String; 2]>,
}

impl KeyValueTable {
    /// Creates the table with muted field names.
    pub(crate) fn new(painter: &Painter, rows: Vec<(&str, String)>) -> Self {
        Self {
            rows: rows
                .into_iter()
                .map(|(field, value)| [painter.muted(field), value])
                .collect(),
        }
    }
}

impl Display for KeyValueTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(["field", "value"]);
        for row in &self.rows {
            builder.push_record(row);
        }
        let mut table = builder.build();
        table.with(TableStyle::rounded());
        write!(f, "{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    #[test]
    fn renders_field_value_pairs() {
        let painter = Painter::new(false);
        let table = KeyValueTable::new(
            &painter,
            vec![("host", "10.0.0.5".into()), ("port", "5000".into())],
        );
        assert_snapshot!(table.to_string(), @r"
        ╭───────┬──────────╮
        │ field │ value    │
        ├───────┼──────────┤
        │ host  │ 10.0.0.5 │
        │ port  │ 5000     │
        ╰───────┴──────────╯
        ");
    }
}
