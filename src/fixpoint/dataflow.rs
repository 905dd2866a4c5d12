use differential_dataflow::hashable::Hashable;
use differential_dataflow::lattice::Lattice;
use differential_dataflow::operators::iterate::Variable;
use differential_dataflow::operators::join::Join;
use differential_dataflow::operators::reduce::Reduce;
use differential_dataflow::{Collection, ExchangeData};
use itertools::Itertools;
use std::cell::RefCell;
use std::rc::Rc;
use surgestep_api::{BspError, DiffCount, Neighbor, StepFunction};
use timely::communication::Allocate;
use timely::dataflow::operators::broadcast::Broadcast;
use timely::dataflow::operators::capture::event::Event::Messages;
use timely::dataflow::operators::capture::Capture;
use timely::dataflow::operators::probe::Handle;
use timely::dataflow::operators::{Input, Probe};
use timely::dataflow::Scope;
use timely::order::Product;
use timely::worker::Worker;

/// A state together with the number of rounds that produced it.
type Staged<S> = (usize, S);

/// A key's own state is tagged `None`; the state of a key it depends on is tagged with that key
/// and the dependency weight.
type View<K, S, W> = (Option<(K, W)>, Staged<S>);

pub type FaultCell = Rc<RefCell<Option<BspError>>>;

/// The index of a worker whose step function failed, and the rendered fault.
pub type FaultMarker = (usize, String);

/// Runs `max_iterations` transition rounds inside one iterative scope.
///
/// Every state carries its round, so a round's inputs are exactly the states of the previous
/// round. States that reached `max_iterations` are fed back unchanged, after which the loop
/// stops changing and the scope drains.
pub fn iterate_rounds<G, K, S, W, F>(
    states: &Collection<G, (K, S), DiffCount>,
    dependencies: &Collection<G, (K, (K, W)), DiffCount>,
    step: F,
    max_iterations: usize,
    fault: FaultCell,
) -> Collection<G, (K, S), DiffCount>
where
    G: Scope,
    G::Timestamp: Lattice + Ord,
    K: ExchangeData + Hashable,
    S: ExchangeData,
    W: ExchangeData,
    F: StepFunction<K, S, W>,
{
    states
        .scope()
        .iterative::<usize, _, _>(|inner| {
            let dependencies = dependencies.enter(inner);
            let initial = states.enter(inner).map(|(key, state)| (key, (0, state)));

            let staged = Variable::new_from(initial, Product::new(Default::default(), 1));
            let pending = staged.filter(move |(_, (round, _))| *round < max_iterations);
            let finished = staged.filter(move |(_, (round, _))| *round >= max_iterations);

            let next = transition_round(&pending, &dependencies, step, fault).concat(&finished);
            staged.set(&next);
            next.leave()
        })
        .map(|(key, (_, state))| (key, state))
}

/// One round of the iteration: gathers, per key, its own state and the states of all keys it
/// depends on, and replaces it with whatever `step` produces.
///
/// The first fault of `step` is stored in `fault`. Later groups of the same worker are skipped,
/// so the collection produced after a fault is incomplete and must be discarded.
fn transition_round<G, K, S, W, F>(
    states: &Collection<G, (K, Staged<S>), DiffCount>,
    dependencies: &Collection<G, (K, (K, W)), DiffCount>,
    step: F,
    fault: FaultCell,
) -> Collection<G, (K, Staged<S>), DiffCount>
where
    G: Scope,
    G::Timestamp: Lattice + Ord,
    K: ExchangeData + Hashable,
    S: ExchangeData,
    W: ExchangeData,
    F: StepFunction<K, S, W>,
{
    let own: Collection<G, (K, View<K, S, W>), DiffCount> =
        states.map(|(key, staged)| (key, (None, staged)));
    states
        .join_map(dependencies, |source, staged, dependency| {
            let (target, weight) = dependency;
            (target.clone(), (Some((source.clone(), weight.clone())), staged.clone()))
        })
        .concat(&own)
        .reduce(move |key, input, output| {
            if fault.borrow().is_some() {
                return;
            }
            // `None` sorts first, so the own state (if any) leads the group.
            let mut round = 0;
            let mut current = None;
            let mut neighbors = Vec::with_capacity(input.len());
            for (view, count) in input {
                let (dependency, (previous, state)) = &**view;
                round = previous + 1;
                match dependency {
                    None => current = Some(state),
                    Some((source, weight)) => {
                        for _ in 0..*count {
                            neighbors.push(Neighbor::new(
                                source.clone(),
                                state.clone(),
                                weight.clone(),
                            ));
                        }
                    }
                }
            }
            match step.update(key, current, &neighbors, round) {
                Ok(Some(next)) => output.push(((round, next), 1)),
                Ok(None) => {}
                Err(e) => {
                    let e = e.with_origin(|| format!("key {:?} in round {}", key, round));
                    fault.borrow_mut().get_or_insert(e);
                }
            }
        })
}

/// Broadcasts this worker's fault, if any, and returns the faults of all workers in the
/// computation (of every process), ordered by worker index.
///
/// Must be called by every worker, after the iteration dataflow has drained.
pub fn share_faults<A: Allocate>(
    worker: &mut Worker<A>,
    local: Option<&BspError>,
) -> Vec<FaultMarker> {
    let worker_index = worker.index();
    let mut probe = Handle::new();
    let (mut input, captured) = worker.dataflow::<usize, _, _>(|scope| {
        let (input, stream) = scope.new_input::<FaultMarker>();
        (input, stream.broadcast().probe_with(&mut probe).capture())
    });
    if let Some(fault) = local {
        input.send((worker_index, fault.to_string()));
    }
    input.advance_to(1);
    while probe.less_than(input.time()) {
        worker.step();
    }
    captured
        .try_iter()
        .flat_map(|event| match event {
            Messages(_, markers) => markers,
            _ => Vec::new(),
        })
        .sorted()
        .collect()
}

/// The fault of another worker, as seen by a worker whose own groups all succeeded.
pub fn remote_fault(markers: &[FaultMarker]) -> Option<BspError> {
    markers.first().map(|(worker_index, message)| BspError::UserCodeFault {
        origin: Some(format!("worker {}", worker_index)),
        message: message.clone(),
    })
}
