use crate::aggregator::{AggregatorHandle, AggregatorRegistry, GlobalAggregates, LocalAggregates};
use crate::broadcast::BroadcastSets;
use crate::error::{protocol_violation, BspError};
use crate::message_iterator::MessageIterator;
use crate::types::{AdjacentEdge, Edge, Edges, Envelope, Vertex};

const EDGES_USED: &str =
    "Can use either 'edges()' or 'send_message_to_all_neighbors()' exactly once per compute call";
const VALUE_ALREADY_SET: &str = "'set_new_vertex_value()' can be called at most once per compute call";

/// The primary trait for vertex-centric computations.
///
/// `compute` is invoked once per active vertex in every superstep. A vertex is active if at
/// least one message was sent to it in the previous superstep; in the first superstep all
/// vertices are active. Invocations of the same superstep may run concurrently and never observe
/// each other's messages or value updates.
///
/// The hooks run once per superstep on the coordinating thread, before and after all compute
/// invocations of that superstep. A fault from any of the three methods aborts the run.
///
/// # Examples
/// ```ignore
/// impl ComputeFunction<VertexId, VertexId, (), VertexId> for MinLabel {
///     fn compute(&self, vertex, messages, ctx) -> Result<(), BspError> {
///         let min = messages.min().unwrap_or(vertex.value);
///         if ctx.superstep_number() == 1 || min < vertex.value {
///             ctx.set_new_vertex_value(min)?;
///             ctx.send_message_to_all_neighbors(min)?;
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait ComputeFunction<K, VV, EV, M>: Sync {
    fn compute(
        &self,
        vertex: &Vertex<K, VV>,
        messages: MessageIterator<M>,
        ctx: &mut ComputeContext<'_, K, VV, EV, M>,
    ) -> Result<(), BspError>;

    fn pre_superstep(&mut self, _ctx: &SuperstepContext) -> Result<(), BspError> {
        Ok(())
    }

    fn post_superstep(&mut self, _ctx: &SuperstepContext) -> Result<(), BspError> {
        Ok(())
    }
}

/// Run-wide state visible during one superstep.
#[derive(Clone, Copy)]
pub struct SuperstepContext<'a> {
    superstep: usize,
    previous_aggregates: &'a GlobalAggregates,
    broadcast_sets: &'a BroadcastSets,
}

impl<'a> SuperstepContext<'a> {
    pub fn new(
        superstep: usize,
        previous_aggregates: &'a GlobalAggregates,
        broadcast_sets: &'a BroadcastSets,
    ) -> Self {
        Self { superstep, previous_aggregates, broadcast_sets }
    }

    /// The current superstep, starting at 1.
    pub fn superstep_number(&self) -> usize {
        self.superstep
    }

    /// The merged value of the aggregator as of the end of the previous superstep. Always `None`
    /// in the first superstep, and for names that were never registered.
    pub fn previous_iteration_aggregate<T: 'static>(&self, name: &str) -> Option<&'a T> {
        self.previous_aggregates.get(name)
    }

    pub fn broadcast_set<T: 'static>(&self, name: &str) -> Option<&'a [T]> {
        self.broadcast_sets.get(name)
    }
}

/// Per-invocation handle given to `ComputeFunction::compute`.
///
/// A new context is created for every invocation, so the single-use guards start fresh for each
/// vertex. Guard violations are returned to the caller and also remembered by the context, making
/// them fatal even when the returned error is discarded.
pub struct ComputeContext<'a, K, VV, EV, M> {
    superstep: SuperstepContext<'a>,
    edges: &'a [Edge<K, EV>],
    adjacent: &'a [AdjacentEdge<K>],
    registry: &'a AggregatorRegistry,
    local_aggregates: &'a mut LocalAggregates,
    outbox: &'a mut Vec<Envelope<K, M>>,
    new_value: Option<VV>,
    edges_used: bool,
    violation: Option<BspError>,
}

impl<'a, K: Clone, VV, EV, M: Clone> ComputeContext<'a, K, VV, EV, M> {
    /// Used by the engine to set up one invocation. `adjacent` holds the vertex's edges in the
    /// configured direction, as indices into `edges`.
    pub fn new(
        superstep: SuperstepContext<'a>,
        edges: &'a [Edge<K, EV>],
        adjacent: &'a [AdjacentEdge<K>],
        registry: &'a AggregatorRegistry,
        local_aggregates: &'a mut LocalAggregates,
        outbox: &'a mut Vec<Envelope<K, M>>,
    ) -> Self {
        Self {
            superstep,
            edges,
            adjacent,
            registry,
            local_aggregates,
            outbox,
            new_value: None,
            edges_used: false,
            violation: None,
        }
    }

    /// Lazily iterates the edges of this vertex. Mutually exclusive with
    /// `send_message_to_all_neighbors` and usable once.
    pub fn edges(&mut self) -> Result<Edges<'a, K, EV>, BspError> {
        if self.edges_used {
            return Err(self.violate(EDGES_USED));
        }
        self.edges_used = true;
        Ok(Edges::new(self.edges, self.adjacent))
    }

    /// Sends `message` over every edge of this vertex, one message per edge even if several
    /// edges lead to the same neighbor. Mutually exclusive with `edges` and usable once.
    pub fn send_message_to_all_neighbors(&mut self, message: M) -> Result<(), BspError> {
        if self.edges_used {
            return Err(self.violate(EDGES_USED));
        }
        self.edges_used = true;
        let adjacent = self.adjacent;
        self.outbox.extend(
            adjacent.iter().map(|edge| Envelope::new(edge.neighbor.clone(), message.clone())),
        );
        Ok(())
    }

    /// Sends `message` to any vertex. A target that does not exist fails the run when the
    /// message is delivered at the end of the superstep.
    pub fn send_message_to(&mut self, target: K, message: M) {
        self.outbox.push(Envelope::new(target, message));
    }

    /// Replaces the value of this vertex for the next superstep. If never called, the current
    /// value carries over.
    pub fn set_new_vertex_value(&mut self, value: VV) -> Result<(), BspError> {
        if self.new_value.is_some() {
            return Err(self.violate(VALUE_ALREADY_SET));
        }
        self.new_value = Some(value);
        Ok(())
    }

    pub fn superstep_number(&self) -> usize {
        self.superstep.superstep_number()
    }

    pub fn superstep(&self) -> SuperstepContext<'a> {
        self.superstep
    }

    /// Handle to contribute to the aggregator registered as `name` in this superstep. `None` if
    /// no such aggregator exists or its value type is not `T`.
    pub fn iteration_aggregator<T: Send + Sync + 'static>(
        &mut self,
        name: &str,
    ) -> Option<AggregatorHandle<'_, T>> {
        self.local_aggregates.handle(self.registry, name)
    }

    pub fn previous_iteration_aggregate<T: 'static>(&self, name: &str) -> Option<&'a T> {
        self.superstep.previous_iteration_aggregate(name)
    }

    pub fn broadcast_set<T: 'static>(&self, name: &str) -> Option<&'a [T]> {
        self.superstep.broadcast_set(name)
    }

    /// Ends the invocation, yielding the new vertex value (if any) or the first protocol
    /// violation seen.
    pub fn finish(self) -> Result<Option<VV>, BspError> {
        match self.violation {
            Some(violation) => Err(violation),
            None => Ok(self.new_value),
        }
    }

    fn violate(&mut self, message: &'static str) -> BspError {
        let violation = protocol_violation(message);
        if self.violation.is_none() {
            self.violation = Some(violation.clone());
        }
        violation
    }
}

#[cfg(test)]
mod tests {
    use crate::aggregator::{AggregatorRegistry, GlobalAggregates, LongSumAggregator};
    use crate::broadcast::BroadcastSets;
    use crate::compute_function::{ComputeContext, SuperstepContext};
    use crate::types::{AdjacentEdge, Edge, Envelope};

    struct Fixture {
        edges: Vec<Edge<u32, ()>>,
        adjacent: Vec<AdjacentEdge<u32>>,
        registry: AggregatorRegistry,
        previous: GlobalAggregates,
        broadcast_sets: BroadcastSets,
    }

    impl Fixture {
        fn new() -> Self {
            let edges = vec![Edge::new(1, 2, ()), Edge::new(1, 3, ()), Edge::new(1, 2, ())];
            let adjacent = (0..edges.len())
                .map(|index| AdjacentEdge::new(edges[index].target, index))
                .collect();
            let mut registry = AggregatorRegistry::default();
            registry.register("count", LongSumAggregator).expect("Registering 'count'");
            Self {
                edges,
                adjacent,
                registry,
                previous: GlobalAggregates::default(),
                broadcast_sets: BroadcastSets::default(),
            }
        }
    }

    #[test]
    fn send_to_all_neighbors_emits_one_message_per_edge() {
        let fixture = Fixture::new();
        let mut local = fixture.registry.local_aggregates();
        let mut outbox = Vec::new();
        let superstep = SuperstepContext::new(1, &fixture.previous, &fixture.broadcast_sets);
        let mut ctx: ComputeContext<u32, u32, (), &str> = ComputeContext::new(
            superstep,
            &fixture.edges,
            &fixture.adjacent,
            &fixture.registry,
            &mut local,
            &mut outbox,
        );
        ctx.send_message_to_all_neighbors("hi").expect("First use is allowed");
        assert!(ctx.edges().is_err());
        assert!(ctx.finish().expect_err("Violation is remembered").is_protocol_violation());
        assert_eq!(
            outbox,
            vec![Envelope::new(2, "hi"), Envelope::new(3, "hi"), Envelope::new(2, "hi")]
        );
    }

    #[test]
    fn edges_then_send_to_all_fails() {
        let fixture = Fixture::new();
        let mut local = fixture.registry.local_aggregates();
        let mut outbox = Vec::new();
        let superstep = SuperstepContext::new(2, &fixture.previous, &fixture.broadcast_sets);
        let mut ctx: ComputeContext<u32, u32, (), u32> = ComputeContext::new(
            superstep,
            &fixture.edges,
            &fixture.adjacent,
            &fixture.registry,
            &mut local,
            &mut outbox,
        );
        let edges = ctx.edges().expect("First use is allowed");
        for edge in edges {
            ctx.send_message_to(edge.target, edge.source);
        }
        let error = ctx.send_message_to_all_neighbors(0).expect_err("Second use must fail");
        assert!(error.is_protocol_violation());
        assert!(ctx.finish().is_err());
        assert_eq!(outbox.len(), 3);
    }

    #[test]
    fn edge_access_is_single_use() {
        let fixture = Fixture::new();
        let mut outbox = Vec::new();
        let superstep = SuperstepContext::new(1, &fixture.previous, &fixture.broadcast_sets);

        let mut local = fixture.registry.local_aggregates();
        let mut ctx = ComputeContext::<u32, u32, (), u32>::new(
            superstep,
            &fixture.edges,
            &fixture.adjacent,
            &fixture.registry,
            &mut local,
            &mut outbox,
        );
        assert_eq!(ctx.edges().expect("First use is allowed").count(), 3);
        assert!(ctx.edges().expect_err("Second use must fail").is_protocol_violation());
        assert!(ctx.finish().is_err());

        let mut local = fixture.registry.local_aggregates();
        let mut ctx = ComputeContext::<u32, u32, (), u32>::new(
            superstep,
            &fixture.edges,
            &fixture.adjacent,
            &fixture.registry,
            &mut local,
            &mut outbox,
        );
        ctx.send_message_to_all_neighbors(1).expect("First use is allowed");
        let error = ctx.send_message_to_all_neighbors(2).expect_err("Second use must fail");
        assert!(error.is_protocol_violation());
        assert!(ctx.finish().is_err());
        // Only the first broadcast went out.
        assert_eq!(outbox.iter().map(|envelope| envelope.payload).collect::<Vec<_>>(), vec![1; 3]);
    }

    #[test]
    fn value_can_be_set_once() {
        let fixture = Fixture::new();
        let mut local = fixture.registry.local_aggregates();
        let mut outbox: Vec<Envelope<u32, u32>> = Vec::new();
        let superstep = SuperstepContext::new(1, &fixture.previous, &fixture.broadcast_sets);
        let mut ctx = ComputeContext::new(
            superstep,
            &fixture.edges,
            &fixture.adjacent,
            &fixture.registry,
            &mut local,
            &mut outbox,
        );
        ctx.set_new_vertex_value(7_u32).expect("First update is allowed");
        assert_eq!(ctx.finish(), Ok(Some(7)));

        let mut local = fixture.registry.local_aggregates();
        let mut ctx = ComputeContext::<u32, u32, (), u32>::new(
            superstep,
            &fixture.edges,
            &fixture.adjacent,
            &fixture.registry,
            &mut local,
            &mut outbox,
        );
        ctx.set_new_vertex_value(7).expect("First update is allowed");
        assert!(ctx.set_new_vertex_value(8).is_err());
        assert!(ctx.finish().is_err());
    }

    #[test]
    fn aggregates_go_to_the_local_partial() {
        let fixture = Fixture::new();
        let mut local = fixture.registry.local_aggregates();
        let mut outbox: Vec<Envelope<u32, u32>> = Vec::new();
        {
            let superstep = SuperstepContext::new(1, &fixture.previous, &fixture.broadcast_sets);
            let mut ctx = ComputeContext::<u32, u32, (), u32>::new(
                superstep,
                &fixture.edges,
                &fixture.adjacent,
                &fixture.registry,
                &mut local,
                &mut outbox,
            );
            assert_eq!(ctx.previous_iteration_aggregate::<i64>("count"), None);
            ctx.iteration_aggregator::<i64>("count").expect("Registered").aggregate(5);
            assert!(ctx.iteration_aggregator::<i64>("unknown").is_none());
            assert_eq!(ctx.finish(), Ok(None));
        }
        assert_eq!(local.current::<i64>("count"), Some(&5));
    }
}
