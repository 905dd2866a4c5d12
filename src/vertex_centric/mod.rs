use crate::util::memory_usage::print_memory_usage;
use crate::util::partition_of;
use crate::util::timer::RunTimer;
use crate::vertex_centric::partition::{MessageBatch, Partition, WorkerOutput};
use crossbeam_channel::{Receiver, Sender};
use crossbeam_utils::thread;
use itertools::Itertools;
use log::{debug, info, warn};
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;
use surgestep_api::{
    user_fault, AdjacentEdge, BspError, ComputeFunction, Edge, EdgeDirection, GlobalAggregates,
    SuperstepContext, Vertex,
};

pub mod configuration;
mod partition;
pub mod summary;

pub use configuration::VertexCentricConfiguration;
pub use summary::{RoundStatistics, RunSummary};

/// A vertex-centric (Pregel-style) iteration over a fixed vertex and edge set.
///
/// Each superstep runs `F::compute` for every active vertex, spread over
/// `configuration.threads` workers. Messages sent in a superstep are delivered at the barrier
/// that ends it and activate their targets for the next superstep. The run stops once no vertex
/// is active or after `configuration.max_iterations` supersteps.
pub struct VertexCentricIteration<K, VV, EV, M, F> {
    vertices: Vec<Vertex<K, VV>>,
    edges: Vec<Edge<K, EV>>,
    function: F,
    configuration: VertexCentricConfiguration,
    _message: PhantomData<fn() -> M>,
}

/// Final vertex values of a run together with its statistics and the aggregates of its last
/// superstep.
pub struct VertexCentricResult<K, VV> {
    pub vertices: Vec<Vertex<K, VV>>,
    pub summary: RunSummary,
    aggregates: GlobalAggregates,
}

impl<K, VV> VertexCentricResult<K, VV> {
    pub fn aggregate<T: 'static>(&self, name: &str) -> Option<&T> {
        self.aggregates.get(name)
    }
}

impl<K, VV, EV, M, F> VertexCentricIteration<K, VV, EV, M, F>
where
    K: Clone + Eq + Hash + Debug + Send + Sync,
    VV: Send,
    EV: Send + Sync,
    M: Clone + Send,
    F: ComputeFunction<K, VV, EV, M>,
{
    pub fn new(
        vertices: Vec<Vertex<K, VV>>,
        edges: Vec<Edge<K, EV>>,
        function: F,
        configuration: VertexCentricConfiguration,
    ) -> Self {
        Self { vertices, edges, function, configuration, _message: PhantomData }
    }

    pub fn run(self) -> Result<VertexCentricResult<K, VV>, BspError> {
        let VertexCentricIteration { vertices, edges, mut function, configuration, .. } = self;
        configuration.validate()?;
        let mut timer = RunTimer::start();
        let threads = configuration.threads;
        let registry = &configuration.aggregators;
        let broadcast_sets = &configuration.broadcast_sets;

        let mut partitions = load_partitions(vertices, &edges, configuration.edge_direction, threads)?;
        let vertex_count: usize = partitions.iter().map(Partition::vertex_count).sum();
        info!(
            "Loaded {} vertices and {} edges ({}) into {} partitions in {}, running at most {} supersteps",
            vertex_count,
            edges.len(),
            configuration.edge_direction,
            threads,
            timer.lap().to_seconds_string(),
            configuration.max_iterations
        );
        debug!(
            "Aggregators: [{}], broadcast sets: [{}]",
            registry.names().sorted().join(", "),
            broadcast_sets.names().sorted().join(", ")
        );
        print_memory_usage(format_args!("loaded vertex-centric partitions"));

        let mut summary = RunSummary::default();
        let mut previous_aggregates = GlobalAggregates::default();
        for superstep_number in 1..=configuration.max_iterations {
            let superstep =
                SuperstepContext::new(superstep_number, &previous_aggregates, broadcast_sets);

            function.pre_superstep(&superstep).map_err(|e| {
                e.with_origin(|| format!("pre_superstep of superstep {}", superstep_number))
            })?;

            let (senders, receivers): (
                Vec<Sender<MessageBatch<K, M>>>,
                Vec<Receiver<MessageBatch<K, M>>>,
            ) = (0..threads).map(|_| crossbeam_channel::unbounded()).unzip();
            let compute_function = &function;
            let edges = &edges;
            let senders = &senders;
            let worker_results = thread::scope(|s| {
                let handles = partitions
                    .iter_mut()
                    .map(|partition| {
                        s.spawn(move |_| {
                            partition.compute_superstep(
                                compute_function,
                                superstep,
                                edges,
                                registry,
                                senders.as_slice(),
                            )
                        })
                    })
                    .collect_vec();
                handles
                    .into_iter()
                    .enumerate()
                    .map(|(worker_index, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            Err(user_fault(format!(
                                "Worker {} panicked in superstep {}",
                                worker_index, superstep_number
                            )))
                        })
                    })
                    .collect_vec()
            })
            .map_err(|_| BspError::Generic("Could not end the superstep scope".to_string()))?;
            // Barrier: every worker of this superstep has finished.
            let outputs: Vec<WorkerOutput<K, VV>> =
                worker_results.into_iter().collect::<Result<_, _>>()?;

            function.post_superstep(&superstep).map_err(|e| {
                e.with_origin(|| format!("post_superstep of superstep {}", superstep_number))
            })?;

            let mut active_vertices = 0;
            let mut messages_sent = 0;
            let mut updated_vertices = 0;
            let mut partials = Vec::with_capacity(outputs.len());
            for (worker_index, (partition, output)) in
                partitions.iter_mut().zip(outputs).enumerate()
            {
                debug!(
                    "[worker {:>2}] superstep {}: {} invocations, {} messages, {} updates",
                    worker_index,
                    superstep_number,
                    output.invocations,
                    output.messages_sent,
                    output.new_values.len()
                );
                active_vertices += output.invocations;
                messages_sent += output.messages_sent;
                updated_vertices += output.new_values.len();
                partition.commit(output.new_values);
                partials.push(output.aggregates);
            }
            let aggregates = registry.merge_partials(partials);
            for (partition, receiver) in partitions.iter_mut().zip(&receivers) {
                partition.deliver(receiver.try_iter(), superstep_number)?;
            }
            previous_aggregates = aggregates;

            let duration = timer.lap();
            info!(
                "Superstep {} done: {} active vertices, {} messages, {} updates in {}",
                superstep_number,
                active_vertices,
                messages_sent,
                updated_vertices,
                duration.to_seconds_string()
            );
            summary.record(RoundStatistics::new(
                superstep_number,
                active_vertices,
                messages_sent,
                updated_vertices,
                duration,
            ));

            if partitions.iter().all(|partition| partition.pending_vertices() == 0) {
                summary.converged = true;
                break;
            }
        }

        summary.duration = timer.total();
        info!(
            "Vertex-centric iteration finished after {} supersteps ({}) in {}",
            summary.supersteps,
            if summary.converged { "converged" } else { "iteration limit reached" },
            summary.duration.to_seconds_string()
        );

        let vertices = partitions.into_iter().flat_map(Partition::into_vertices).collect();
        Ok(VertexCentricResult { vertices, summary, aggregates: previous_aggregates })
    }
}

/// Hash-partitions the vertices and builds each vertex's adjacency list for `edge_direction`.
fn load_partitions<K, VV, EV, M>(
    vertices: Vec<Vertex<K, VV>>,
    edges: &[Edge<K, EV>],
    edge_direction: EdgeDirection,
    partition_count: usize,
) -> Result<Vec<Partition<K, VV, M>>, BspError>
where
    K: Clone + Eq + Hash + Debug,
{
    let mut partitions = (0..partition_count).map(Partition::new).collect_vec();
    for vertex in vertices {
        let index = partition_of(&vertex.id, partition_count);
        partitions[index].insert_vertex(vertex)?;
    }

    // Edges with an endpoint outside the vertex set are left out in every direction.
    let mut dangling = 0_usize;
    for (edge_index, edge) in edges.iter().enumerate() {
        let known = |id: &K| partitions[partition_of(id, partition_count)].contains_vertex(id);
        if !known(&edge.source) || !known(&edge.target) {
            dangling += 1;
            continue;
        }
        let entries = match edge_direction {
            EdgeDirection::Out => vec![(&edge.source, &edge.target)],
            EdgeDirection::In => vec![(&edge.target, &edge.source)],
            EdgeDirection::All => vec![(&edge.source, &edge.target), (&edge.target, &edge.source)],
        };
        for (owner, neighbor) in entries {
            let adjacent = AdjacentEdge::new(neighbor.clone(), edge_index);
            partitions[partition_of(owner, partition_count)].insert_adjacent(owner.clone(), adjacent);
        }
    }
    if dangling > 0 {
        warn!("Ignored {} edges with an endpoint that is not a vertex", dangling);
    }
    Ok(partitions)
}
