use crate::error::BspError;
use derive_new::new;

/// A dependency of a key as seen by a step transition: the key it depends on, that key's state
/// in the current round, and the weight of the dependency.
#[derive(Debug, Clone, PartialEq, new)]
pub struct Neighbor<K, S, W> {
    pub key: K,
    pub state: S,
    pub weight: W,
}

/// The per-key transition of a fixed-point iteration.
///
/// `update` is called once per key and round with the key's current state (`None` for keys that
/// only appear as dependency targets) and the states of all keys it depends on. The returned
/// state replaces the current one for the next round; `Ok(None)` removes the key from the
/// state dataset.
///
/// `round` starts at 1, which allows round-dependent adjustments such as decaying scores.
pub trait StepFunction<K, S, W>: Clone + Send + Sync + 'static {
    fn update(
        &self,
        key: &K,
        current: Option<&S>,
        neighbors: &[Neighbor<K, S, W>],
        round: usize,
    ) -> Result<Option<S>, BspError>;
}

/// Picks the candidate with the highest score. Ties go to the candidate seen last, so the result
/// depends on candidate order unless scores are made unique (e.g. with a secondary key).
pub fn select_max_by_score<C, O, I>(candidates: I) -> Option<(C, O)>
where
    O: Ord,
    I: IntoIterator<Item = (C, O)>,
{
    candidates.into_iter().fold(None, |best, (candidate, score)| {
        if best.as_ref().map_or(false, |(_, best_score)| *best_score > score) {
            best
        } else {
            Some((candidate, score))
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::step_function::select_max_by_score;

    #[test]
    fn ties_go_to_the_last_candidate() {
        assert_eq!(select_max_by_score(vec![("a", 3), ("b", 5), ("c", 5), ("d", 1)]), Some(("c", 5)));
        assert_eq!(select_max_by_score(vec![("a", 3), ("b", 2)]), Some(("a", 3)));
        assert_eq!(select_max_by_score(Vec::<(u8, u8)>::new()), None);
        // Secondary key makes the result independent of order.
        assert_eq!(
            select_max_by_score(vec![(7, (5, 7)), (2, (5, 2))]),
            select_max_by_score(vec![(2, (5, 2)), (7, (5, 7))])
        );
    }
}
