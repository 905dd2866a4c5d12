use crate::fixpoint::dataflow::{
    iterate_rounds, remote_fault, share_faults, FaultCell, FaultMarker,
};
use crate::util::get_worker_indices;
use crate::util::memory_usage::print_memory_usage;
use crate::util::timer::RunTimer;
use differential_dataflow::hashable::Hashable;
use differential_dataflow::input::Input;
use differential_dataflow::ExchangeData;
use itertools::Itertools;
use log::info;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use surgestep_api::{BspError, DiffCount, Edge, StepFunction};
use timely::dataflow::operators::capture::event::Event::Messages;
use timely::dataflow::operators::capture::Capture;
use timely::dataflow::operators::probe::Handle;

pub mod configuration;
mod dataflow;
#[cfg(test)]
mod tests;

pub use configuration::FixedPointConfiguration;

/// Repeatedly replaces a keyed state dataset with the output of a `StepFunction`.
///
/// A dependency `Edge { source, target, value }` makes the state of `source`, weighted by
/// `value`, part of what `target` sees in every round. The iteration always runs
/// `max_iterations` rounds; there is no convergence check. The rounds run in one iterative
/// differential scope, and inputs are split evenly across the timely workers.
///
/// In a cluster run each process returns the states computed by its own workers. A step fault on
/// any worker fails the run in every process.
pub struct FixedPointIteration<K, S, W, F> {
    states: Vec<(K, S)>,
    dependencies: Vec<Edge<K, W>>,
    step: F,
    configuration: FixedPointConfiguration,
}

type WorkerOutput<K, S> = (Vec<((K, S), DiffCount)>, Option<BspError>, Vec<FaultMarker>);

impl<K, S, W, F> FixedPointIteration<K, S, W, F>
where
    K: ExchangeData + Hashable,
    S: ExchangeData,
    W: ExchangeData,
    F: StepFunction<K, S, W>,
{
    pub fn new(
        states: Vec<(K, S)>,
        dependencies: Vec<Edge<K, W>>,
        step: F,
        configuration: FixedPointConfiguration,
    ) -> Self {
        Self { states, dependencies, step, configuration }
    }

    /// Runs the iteration and returns the final states, sorted by key. The first fault raised by
    /// the step function fails the whole run once the dataflow has drained.
    pub fn run(self) -> Result<Vec<(K, S)>, BspError> {
        let FixedPointIteration { states, dependencies, step, configuration } = self;
        configuration.validate()?;
        if let Some((key, _)) = states
            .iter()
            .map(|(key, _)| key)
            .sorted()
            .tuple_windows()
            .find(|(left, right)| left == right)
        {
            return Err(BspError::DuplicateVertex(format!("{:?}", key)));
        }
        let max_iterations = configuration.max_iterations;
        info!(
            "Starting fixed-point iteration: {} states, {} dependencies, {} rounds",
            states.len(),
            dependencies.len(),
            max_iterations
        );
        let states = Arc::new(states);
        let dependencies = Arc::new(dependencies);
        let timer = RunTimer::start();

        print_memory_usage(format_args!("starting fixed-point workers"));
        let worker_results = timely::execute(configuration.timely_config(), move |worker| {
            let worker_index = worker.index();
            let worker_count = worker.peers();
            let worker_timer = RunTimer::start();
            let fault: FaultCell = Rc::new(RefCell::new(None));

            let mut probe = Handle::new();
            let (mut state_input, mut dependency_input, result_stream) =
                worker.dataflow::<usize, _, _>(|scope| {
                    let (state_input, initial) = scope.new_collection::<(K, S), DiffCount>();
                    let (dependency_input, weighted) =
                        scope.new_collection::<(K, (K, W)), DiffCount>();

                    let current = iterate_rounds(
                        &initial,
                        &weighted,
                        step.clone(),
                        max_iterations,
                        Rc::clone(&fault),
                    );
                    (state_input, dependency_input, current.probe_with(&mut probe).inner.capture())
                });

            let (left_index, right_index) =
                get_worker_indices(states.len(), worker_index, worker_count);
            for (key, state) in &states[left_index..right_index] {
                state_input.insert((key.clone(), state.clone()));
            }
            let loaded_states = right_index - left_index;
            let (left_index, right_index) =
                get_worker_indices(dependencies.len(), worker_index, worker_count);
            for edge in &dependencies[left_index..right_index] {
                dependency_input
                    .insert((edge.source.clone(), (edge.target.clone(), edge.value.clone())));
            }
            info!(
                "[worker {:>2}] loaded {} states and {} dependencies",
                worker_index,
                loaded_states,
                right_index - left_index
            );

            state_input.advance_to(1);
            state_input.flush();
            dependency_input.advance_to(1);
            dependency_input.flush();
            while probe.less_than(state_input.time()) {
                worker.step();
            }

            let mut results = Vec::new();
            for event in result_stream.try_iter() {
                if let Messages(_, entries) = event {
                    results.extend(entries.into_iter().map(|(data, _, change)| (data, change)));
                }
            }
            info!(
                "[worker {:>2}] finished {} rounds in {}",
                worker_index,
                max_iterations,
                worker_timer.total().to_seconds_string()
            );
            let fault = fault.borrow().clone();
            let markers = share_faults(worker, fault.as_ref());
            (results, fault, markers)
        })
        .map_err(BspError::Timely)?
        .join();
        print_memory_usage(format_args!("done with timely"));

        let mut results = Vec::new();
        let mut markers = Vec::new();
        for worker_result in worker_results {
            let (entries, fault, worker_markers): WorkerOutput<K, S> =
                worker_result.map_err(BspError::Timely)?;
            if let Some(fault) = fault {
                return Err(fault);
            }
            results.extend(entries);
            markers = worker_markers;
        }
        // Faults raised only by workers of other processes.
        if let Some(fault) = remote_fault(&markers) {
            return Err(fault);
        }
        results.sort();
        let final_states: Vec<(K, S)> = results
            .into_iter()
            .coalesce(|(left, left_change), (right, right_change)| {
                if left == right {
                    Ok((left, left_change + right_change))
                } else {
                    Err(((left, left_change), (right, right_change)))
                }
            })
            .filter(|(_, change)| *change > 0)
            .map(|(entry, _)| entry)
            .collect();
        info!(
            "Fixed-point iteration produced {} states in {}",
            final_states.len(),
            timer.total().to_seconds_string()
        );
        Ok(final_states)
    }
}
