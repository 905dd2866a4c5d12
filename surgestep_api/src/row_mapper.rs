use hashbrown::HashMap;

/// String parameters handed to a `RowMapper` before it sees any row.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobParameters {
    values: HashMap<String, String>,
}

impl JobParameters {
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Collects the rows a `RowMapper` emits for one input row.
#[derive(Debug)]
pub struct RowCollector<K, V> {
    rows: Vec<(K, V)>,
}

impl<K, V> RowCollector<K, V> {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn collect(&mut self, key: K, value: V) {
        self.rows.push((key, value));
    }

    pub fn into_rows(self) -> Vec<(K, V)> {
        self.rows
    }
}

impl<K, V> Default for RowCollector<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A keyed flat-map: every input row produces zero or more output rows of the same types.
pub trait RowMapper<K, V>: Clone + Send + Sync + 'static {
    /// Called once before any row is mapped.
    fn configure(&mut self, _parameters: &JobParameters) {}

    fn map(&self, key: &K, value: &V, out: &mut RowCollector<K, V>);
}
