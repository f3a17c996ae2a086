//! Common type definitions

pub use serde_json::Value;

/// A column-name to value mapping (a row, a change set or a parameter set)
pub type Row = serde_json::Map<String, Value>;

/// Bound parameter values supplied alongside a statement execution
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Parameters {
    /// No execution parameters
    #[default]
    None,
    /// A single key-value mapping
    Keyed(Row),
    /// An executemany-style list of mappings
    Positional(Vec<Row>),
}

impl Parameters {
    /// Look up a bind key
    ///
    /// A positional list yields the value from the first mapping that
    /// contains the key.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        match self {
            Parameters::None => None,
            Parameters::Keyed(row) => row.get(key),
            Parameters::Positional(rows) => rows.iter().find_map(|row| row.get(key)),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Parameters::None => true,
            Parameters::Keyed(row) => row.is_empty(),
            Parameters::Positional(rows) => rows.iter().all(serde_json::Map::is_empty),
        }
    }
}

impl From<Row> for Parameters {
    fn from(row: Row) -> Self {
        Parameters::Keyed(row)
    }
}

impl From<Vec<Row>> for Parameters {
    fn from(rows: Vec<Row>) -> Self {
        Parameters::Positional(rows)
    }
}

/// Build a [`Row`] from column/value pairs
pub fn row<K, V, I>(pairs: I) -> Row
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
