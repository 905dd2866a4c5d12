//! Client-facing contracts of the surgestep engine: the graph data model, the vertex-centric
//! `ComputeFunction` protocol with its per-invocation `ComputeContext`, aggregators, broadcast
//! sets, and the `StepFunction` transition used by fixed-point iterations.

mod aggregator;
mod broadcast;
mod compute_function;
mod error;
mod message_iterator;
mod row_mapper;
mod score;
mod step_function;
mod types;

// Public exports from root of the crate.
pub use aggregator::*;
pub use broadcast::BroadcastSets;
pub use compute_function::{ComputeContext, ComputeFunction, SuperstepContext};
pub use error::{configuration_error, user_fault, BspError};
pub use message_iterator::MessageIterator;
pub use row_mapper::{JobParameters, RowCollector, RowMapper};
pub use score::Score;
pub use step_function::{select_max_by_score, Neighbor, StepFunction};
pub use types::*;

// Universally used types.
pub type VertexId = u32;
pub type DiffCount = isize;
pub type Superstep = usize;
