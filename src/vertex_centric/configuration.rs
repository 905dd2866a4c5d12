use surgestep_api::{
    configuration_error, Aggregator, AggregatorRegistry, BroadcastSets, BspError, EdgeDirection,
};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Options of one vertex-centric run.
///
/// Aggregators and broadcast sets are registered by name once, before the first superstep, and
/// reached from compute code through the invocation context.
#[derive(new)]
pub struct VertexCentricConfiguration {
    pub max_iterations: usize,
    #[new(default)]
    pub edge_direction: EdgeDirection,
    /// Number of worker partitions the vertices are spread over.
    #[new(value = "1")]
    pub threads: usize,
    #[new(default)]
    pub(crate) aggregators: AggregatorRegistry,
    #[new(default)]
    pub(crate) broadcast_sets: BroadcastSets,
    #[new(default)]
    invalid: Option<BspError>,
}

impl Default for VertexCentricConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl VertexCentricConfiguration {
    pub fn with_edge_direction(mut self, edge_direction: EdgeDirection) -> Self {
        self.edge_direction = edge_direction;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn register_aggregator<A: Aggregator>(mut self, name: &str, aggregator: A) -> Self {
        if let Err(e) = self.aggregators.register(name, aggregator) {
            self.invalid.get_or_insert(e);
        }
        self
    }

    pub fn add_broadcast_set<T: Send + Sync + 'static>(mut self, name: &str, set: Vec<T>) -> Self {
        if let Err(e) = self.broadcast_sets.insert(name, set) {
            self.invalid.get_or_insert(e);
        }
        self
    }

    pub(crate) fn validate(&self) -> Result<(), BspError> {
        if let Some(e) = &self.invalid {
            return Err(e.clone());
        }
        if self.max_iterations == 0 {
            return Err(configuration_error("'max_iterations' should be at least 1"));
        }
        if self.threads == 0 {
            return Err(configuration_error("'threads' should be at least 1"));
        }
        Ok(())
    }
}
