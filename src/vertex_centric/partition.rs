use crate::util::partition_of;
use crossbeam_channel::Sender;
use hashbrown::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use surgestep_api::{
    AdjacentEdge, AggregatorRegistry, BspError, ComputeContext, ComputeFunction, Edge, Envelope,
    LocalAggregates, MessageIterator, SuperstepContext, Vertex,
};

pub type MessageBatch<K, M> = Vec<Envelope<K, M>>;

/// Everything one worker produced during a superstep. Nothing in here is visible to other
/// vertices until the coordinator commits it after the barrier.
pub struct WorkerOutput<K, VV> {
    pub new_values: Vec<(K, VV)>,
    pub aggregates: LocalAggregates,
    pub invocations: usize,
    pub messages_sent: usize,
}

/// The share of the graph owned by one worker: its vertices, their adjacency lists and the
/// messages waiting for them.
pub struct Partition<K, VV, M> {
    index: usize,
    vertices: HashMap<K, Vertex<K, VV>>,
    adjacency: HashMap<K, Vec<AdjacentEdge<K>>>,
    inbox: HashMap<K, Vec<M>>,
}

impl<K, VV, M> Partition<K, VV, M>
where
    K: Clone + Eq + Hash + Debug,
{
    pub fn new(index: usize) -> Self {
        Self { index, vertices: HashMap::new(), adjacency: HashMap::new(), inbox: HashMap::new() }
    }

    pub fn insert_vertex(&mut self, vertex: Vertex<K, VV>) -> Result<(), BspError> {
        if self.vertices.contains_key(&vertex.id) {
            return Err(BspError::DuplicateVertex(format!("{:?}", vertex.id)));
        }
        self.vertices.insert(vertex.id.clone(), vertex);
        Ok(())
    }

    pub fn contains_vertex(&self, id: &K) -> bool {
        self.vertices.contains_key(id)
    }

    /// Returns `false` (and keeps nothing) if `owner` is not a vertex of this partition.
    pub fn insert_adjacent(&mut self, owner: K, adjacent: AdjacentEdge<K>) -> bool {
        if !self.vertices.contains_key(&owner) {
            return false;
        }
        self.adjacency.entry(owner).or_insert_with(Vec::new).push(adjacent);
        true
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Vertices that have at least one message waiting, i.e. the active set of the next
    /// superstep.
    pub fn pending_vertices(&self) -> usize {
        self.inbox.len()
    }

    /// Runs one compute invocation per active vertex and sends the produced messages, batched
    /// per destination partition, over `senders`.
    pub fn compute_superstep<EV, F>(
        &mut self,
        function: &F,
        superstep: SuperstepContext<'_>,
        edges: &[Edge<K, EV>],
        registry: &AggregatorRegistry,
        senders: &[Sender<MessageBatch<K, M>>],
    ) -> Result<WorkerOutput<K, VV>, BspError>
    where
        M: Clone,
        F: ComputeFunction<K, VV, EV, M>,
    {
        let superstep_number = superstep.superstep_number();
        let mut inbox = std::mem::take(&mut self.inbox);
        let active: Vec<K> = if superstep_number == 1 {
            self.vertices.keys().cloned().collect()
        } else {
            inbox.keys().cloned().collect()
        };

        let mut aggregates = registry.local_aggregates();
        let mut outbox = Vec::new();
        let mut new_values = Vec::new();
        for id in &active {
            let vertex = match self.vertices.get(id) {
                Some(vertex) => vertex,
                // Delivery only accepts messages for local vertices.
                None => continue,
            };
            let messages = MessageIterator::new(inbox.remove(id).unwrap_or_default());
            let adjacent = self.adjacency.get(id).map_or(&[][..], Vec::as_slice);
            let mut ctx = ComputeContext::new(
                superstep,
                edges,
                adjacent,
                registry,
                &mut aggregates,
                &mut outbox,
            );
            let result = function.compute(vertex, messages, &mut ctx);
            let outcome = ctx.finish();
            let origin = || format!("vertex {:?} in superstep {}", id, superstep_number);
            result.map_err(|e| e.with_origin(origin))?;
            if let Some(value) = outcome.map_err(|e| e.with_origin(origin))? {
                new_values.push((id.clone(), value));
            }
        }

        let messages_sent = outbox.len();
        let mut batches: Vec<MessageBatch<K, M>> = senders.iter().map(|_| Vec::new()).collect();
        for envelope in outbox {
            batches[partition_of(&envelope.target, senders.len())].push(envelope);
        }
        for (sender, batch) in senders.iter().zip(batches) {
            if !batch.is_empty() {
                sender.send(batch).map_err(|e| {
                    BspError::Generic(format!(
                        "Worker {} could not exchange messages: {}",
                        self.index, e
                    ))
                })?;
            }
        }

        Ok(WorkerOutput { new_values, aggregates, invocations: active.len(), messages_sent })
    }

    /// Replaces the values of the vertices updated in the last superstep.
    pub fn commit(&mut self, new_values: Vec<(K, VV)>) {
        for (id, value) in new_values {
            if let Some(vertex) = self.vertices.get_mut(&id) {
                vertex.value = value;
            }
        }
    }

    /// Queues the messages of the last superstep for the next one. Fails on the first message
    /// whose target is not a vertex.
    pub fn deliver<I: IntoIterator<Item = MessageBatch<K, M>>>(
        &mut self,
        batches: I,
        sent_in: usize,
    ) -> Result<usize, BspError> {
        let mut delivered = 0;
        for envelope in batches.into_iter().flatten() {
            if !self.vertices.contains_key(&envelope.target) {
                return Err(BspError::UnroutableMessage {
                    superstep: sent_in,
                    target: format!("{:?}", envelope.target),
                });
            }
            self.inbox.entry(envelope.target).or_insert_with(Vec::new).push(envelope.payload);
            delivered += 1;
        }
        Ok(delivered)
    }

    pub fn into_vertices(self) -> impl Iterator<Item = Vertex<K, VV>> {
        self.vertices.into_iter().map(|(_, vertex)| vertex)
    }
}

#[cfg(test)]
mod tests {
    use crate::vertex_centric::partition::Partition;
    use surgestep_api::{AdjacentEdge, BspError, Envelope, Vertex};

    #[test]
    fn delivery_rejects_unknown_targets() {
        let mut partition: Partition<u32, (), &str> = Partition::new(0);
        partition.insert_vertex(Vertex::new(1, ())).expect("New vertex");
        partition.insert_vertex(Vertex::new(2, ())).expect("New vertex");
        assert!(partition.insert_vertex(Vertex::new(2, ())).is_err());

        let delivered = partition
            .deliver(vec![vec![Envelope::new(1, "a"), Envelope::new(1, "b")]], 1)
            .expect("Known targets");
        assert_eq!(delivered, 2);
        assert_eq!(partition.pending_vertices(), 1);

        assert_eq!(
            partition.deliver(vec![vec![Envelope::new(9, "c")]], 2),
            Err(BspError::UnroutableMessage { superstep: 2, target: "9".to_string() })
        );
    }

    #[test]
    fn adjacency_needs_a_local_owner() {
        let mut partition: Partition<u32, (), ()> = Partition::new(0);
        partition.insert_vertex(Vertex::new(1, ())).expect("New vertex");
        assert!(partition.insert_adjacent(1, AdjacentEdge::new(5, 0)));
        assert!(!partition.insert_adjacent(5, AdjacentEdge::new(1, 0)));
        assert!(partition.contains_vertex(&1));
        assert!(!partition.contains_vertex(&5));
        partition.commit(vec![(1, ()), (7, ())]);
        assert_eq!(partition.vertex_count(), 1);
        assert_eq!(partition.into_vertices().count(), 1);
    }
}
