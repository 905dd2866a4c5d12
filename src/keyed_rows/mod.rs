use crate::util::get_worker_indices;
use crate::util::memory_usage::print_memory_usage;
use crate::util::timer::RunTimer;
use differential_dataflow::input::Input;
use differential_dataflow::operators::consolidate::Consolidate;
use differential_dataflow::ExchangeData;
use log::info;
use std::convert::TryFrom;
use std::hash::Hash;
use std::sync::Arc;
use surgestep_api::{configuration_error, BspError, DiffCount, JobParameters, RowCollector, RowMapper};
use timely::dataflow::operators::capture::event::Event::Messages;
use timely::dataflow::operators::capture::Capture;
use timely::dataflow::operators::probe::Handle;
use timely::Configuration;


/// Maps every row through `mapper` on `threads` timely workers and returns all emitted rows,
/// sorted. `mapper` is configured with `parameters` once, before any row is seen; the workers
/// then share that configured instance.
pub fn run_row_mapper<K, V, M>(
    rows: Vec<(K, V)>,
    mut mapper: M,
    parameters: &JobParameters,
    threads: usize,
) -> Result<Vec<(K, V)>, BspError>
where
    K: ExchangeData + Hash,
    V: ExchangeData + Hash,
    M: RowMapper<K, V>,
{
    if threads == 0 {
        return Err(configuration_error("'threads' should be at least 1"));
    }
    mapper.configure(parameters);
    let rows = Arc::new(rows);
    let timer = RunTimer::start();

    print_memory_usage(format_args!("starting row mapper workers"));
    let worker_results = timely::execute(Configuration::Process(threads), move |worker| {
        let worker_index = worker.index();
        let worker_count = worker.peers();
        let mapper = mapper.clone();

        let mut probe = Handle::new();
        let (mut input, result_stream) = worker.dataflow::<usize, _, _>(|scope| {
            let (input, rows) = scope.new_collection::<(K, V), DiffCount>();
            let mapped = rows
                .flat_map(move |(key, value)| {
                    let mut collector = RowCollector::new();
                    mapper.map(&key, &value, &mut collector);
                    collector.into_rows()
                })
                .consolidate()
                .probe_with(&mut probe);
            (input, mapped.inner.capture())
        });

        let (left_index, right_index) = get_worker_indices(rows.len(), worker_index, worker_count);
        for row in &rows[left_index..right_index] {
            input.insert(row.clone());
        }
        input.advance_to(1);
        input.flush();
        while probe.less_than(input.time()) {
            worker.step();
        }

        let mut results = Vec::new();
        for event in result_stream.try_iter() {
            if let Messages(_, entries) = event {
                results.extend(entries.into_iter().map(|(row, _, change)| (row, change)));
            }
        }
        info!(
            "[worker {:>2}] mapped {} rows into {} distinct rows",
            worker_index,
            right_index - left_index,
            results.len()
        );
        results
    })
    .map_err(BspError::Timely)?
    .join();
    print_memory_usage(format_args!("done with timely"));

    let mut mapped = Vec::new();
    for worker_result in worker_results {
        for (row, change) in worker_result.map_err(BspError::Timely)? {
            let copies = usize::try_from(change).unwrap_or(0);
            mapped.extend(std::iter::repeat(row).take(copies));
        }
    }
    mapped.sort();
    info!("Row mapper emitted {} rows in {}", mapped.len(), timer.total().to_seconds_string());
    Ok(mapped)
}
