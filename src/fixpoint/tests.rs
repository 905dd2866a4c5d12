use crate::fixpoint::dataflow::{remote_fault, share_faults};
use crate::fixpoint::{FixedPointConfiguration, FixedPointIteration};
use hashbrown::HashMap;
use itertools::Itertools;
use surgestep_api::{
    select_max_by_score, user_fault, BspError, Edge, Neighbor, Score, StepFunction, VertexId,
};

const DELTA: f64 = 0.5;

type Community = (VertexId, Score);

/// Label propagation with hop attenuation: a vertex adopts the label whose neighbors have the
/// highest weighted score sum, and takes over the best score of that label decayed by
/// `DELTA / round`.
#[derive(Clone)]
struct CommunityDetection;

impl StepFunction<VertexId, Community, Score> for CommunityDetection {
    fn update(
        &self,
        _key: &VertexId,
        _current: Option<&Community>,
        neighbors: &[Neighbor<VertexId, Community, Score>],
        round: usize,
    ) -> Result<Option<Community>, BspError> {
        let mut label_scores: HashMap<VertexId, f64> = HashMap::new();
        for neighbor in neighbors {
            let (label, score) = neighbor.state;
            *label_scores.entry(label).or_insert(0.0) += score.value() * neighbor.weight.value();
        }
        // The label breaks ties between equal sums.
        let candidates =
            label_scores.into_iter().map(|(label, sum)| (label, (Score(sum), label)));
        let label = match select_max_by_score(candidates) {
            Some((label, _)) => label,
            None => return Ok(None),
        };
        let best = neighbors
            .iter()
            .filter(|neighbor| neighbor.state.0 == label)
            .map(|neighbor| neighbor.state.1)
            .max()
            .unwrap_or_default();
        Ok(Some((label, Score(best.value() - DELTA / round as f64))))
    }
}

fn symmetric(pairs: &[(VertexId, VertexId, f64)]) -> Vec<Edge<VertexId, Score>> {
    pairs
        .iter()
        .flat_map(|&(a, b, weight)| vec![Edge::new(a, b, Score(weight)), Edge::new(b, a, Score(weight))])
        .collect()
}

#[test]
fn two_vertices_swap_labels_in_one_round() {
    let states = vec![(1, (10, Score(1.0))), (2, (20, Score(1.0)))];
    let result = FixedPointIteration::new(
        states,
        symmetric(&[(1, 2, 1.0)]),
        CommunityDetection,
        FixedPointConfiguration::new(1),
    )
    .run()
    .expect("Community detection failed");
    assert_eq!(result, vec![(1, (20, Score(0.5))), (2, (10, Score(0.5)))]);
}

#[test]
fn scores_decay_by_delta_over_round() {
    let states = vec![(1, (10, Score(1.0))), (2, (20, Score(1.0)))];
    let result = FixedPointIteration::new(
        states,
        symmetric(&[(1, 2, 1.0)]),
        CommunityDetection,
        FixedPointConfiguration::new(3),
    )
    .run()
    .expect("Community detection failed");
    // 1.0 - 0.5 / 1 - 0.5 / 2 - 0.5 / 3, labels swapping every round.
    let expected = 1.0 - DELTA - DELTA / 2.0 - DELTA / 3.0;
    assert_eq!(result, vec![(1, (20, Score(expected))), (2, (10, Score(expected)))]);
}

#[test]
fn communities_are_independent_of_worker_count() {
    // Two triangles joined by a weak bridge.
    let graph = symmetric(&[
        (1, 2, 1.0),
        (2, 3, 1.0),
        (1, 3, 1.0),
        (4, 5, 1.0),
        (5, 6, 1.0),
        (4, 6, 1.0),
        (3, 4, 0.1),
    ]);
    let states = (1..=6).map(|id| (id, (id % 3 + 1, Score(1.0)))).collect::<Vec<_>>();
    let run = |threads| {
        FixedPointIteration::new(
            states.clone(),
            graph.clone(),
            CommunityDetection,
            FixedPointConfiguration::new(4).with_threads(threads),
        )
        .run()
        .expect("Community detection failed")
    };
    let single = run(1);
    assert_eq!(single.len(), 6);
    assert_eq!(single, run(2));
}

/// Counts how many rounds a key has been through, and drops it once `limit` is reached.
#[derive(Clone)]
struct CountRounds {
    limit: usize,
}

impl StepFunction<VertexId, usize, ()> for CountRounds {
    fn update(
        &self,
        _key: &VertexId,
        current: Option<&usize>,
        _neighbors: &[Neighbor<VertexId, usize, ()>],
        _round: usize,
    ) -> Result<Option<usize>, BspError> {
        let seen = current.copied().unwrap_or(0) + 1;
        Ok(if seen > self.limit { None } else { Some(seen) })
    }
}

#[test]
fn dependency_targets_without_state_join_the_dataset() {
    // Vertex 3 has no state of its own but depends on 2.
    let states = vec![(1, 0), (2, 0)];
    let dependencies = vec![Edge::new(1, 2, ()), Edge::new(2, 3, ())];
    let result = FixedPointIteration::new(
        states,
        dependencies,
        CountRounds { limit: 10 },
        FixedPointConfiguration::new(2).with_threads(2),
    )
    .run()
    .expect("Round counting failed");
    assert_eq!(result, vec![(1, 2), (2, 2), (3, 2)]);
}

#[test]
fn empty_updates_remove_keys() {
    let result = FixedPointIteration::new(
        vec![(1, 0), (2, 5)],
        Vec::new(),
        CountRounds { limit: 6 },
        FixedPointConfiguration::new(2),
    )
    .run()
    .expect("Round counting failed");
    assert_eq!(result, vec![(1, 2)]);
}

#[test]
fn duplicate_state_keys_are_rejected() {
    let result = FixedPointIteration::new(
        vec![(1, 5), (2, 0), (1, 7)],
        vec![Edge::new(1, 2, ())],
        CountRounds { limit: 10 },
        FixedPointConfiguration::new(1),
    )
    .run();
    assert_eq!(result, Err(BspError::DuplicateVertex("1".to_string())));
}

#[derive(Clone)]
struct FailInRound(usize);

impl StepFunction<VertexId, usize, ()> for FailInRound {
    fn update(
        &self,
        _key: &VertexId,
        current: Option<&usize>,
        _neighbors: &[Neighbor<VertexId, usize, ()>],
        round: usize,
    ) -> Result<Option<usize>, BspError> {
        if round == self.0 {
            return Err(user_fault("This is a test runtime exception"));
        }
        Ok(current.copied())
    }
}

#[test]
fn step_faults_fail_the_run() {
    let error = FixedPointIteration::new(
        vec![(7, 0)],
        Vec::new(),
        FailInRound(2),
        FixedPointConfiguration::new(3).with_threads(2),
    )
    .run()
    .err()
    .expect("Step fault must fail the run");
    assert_eq!(
        error,
        BspError::UserCodeFault {
            origin: Some("key 7 in round 2".to_string()),
            message: "This is a test runtime exception".to_string(),
        }
    );

    let invalid = FixedPointIteration::new(
        vec![(7, 0)],
        Vec::new(),
        FailInRound(2),
        FixedPointConfiguration::new(0),
    )
    .run();
    assert!(matches!(invalid, Err(BspError::Configuration(_))));
}

#[test]
fn faults_reach_every_worker() {
    let seen = timely::execute(timely::Configuration::Process(2), |worker| {
        let local = if worker.index() == 1 {
            Some(user_fault("This is a test runtime exception"))
        } else {
            None
        };
        share_faults(worker, local.as_ref())
    })
    .expect("Timely failed")
    .join()
    .into_iter()
    .map(|markers| markers.expect("Worker failed"))
    .collect_vec();

    let expected = vec![(1, "[UserCodeFault] This is a test runtime exception".to_string())];
    assert_eq!(seen, vec![expected.clone(), expected.clone()]);
    // Worker 0 raised nothing itself but must still fail.
    assert_eq!(
        remote_fault(&seen[0]),
        Some(BspError::UserCodeFault {
            origin: Some("worker 1".to_string()),
            message: expected[0].1.clone(),
        })
    );
    assert_eq!(remote_fault(&[]), None);
}
