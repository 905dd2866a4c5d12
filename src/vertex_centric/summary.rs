use crate::util::timer::Elapsed;
use surgestep_api::Superstep;

#[derive(Debug, Clone, Serialize, new)]
pub struct RoundStatistics {
    pub superstep: Superstep,
    /// Vertices that ran compute in this superstep.
    pub active_vertices: usize,
    pub messages_sent: usize,
    pub updated_vertices: usize,
    pub duration: Elapsed,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Supersteps that ran to completion.
    pub supersteps: usize,
    /// Whether the run stopped because no vertex was active anymore, rather than because the
    /// iteration budget ran out.
    pub converged: bool,
    pub messages_sent: usize,
    pub rounds: Vec<RoundStatistics>,
    pub duration: Elapsed,
}

impl RunSummary {
    pub(crate) fn record(&mut self, round: RoundStatistics) {
        self.supersteps = round.superstep;
        self.messages_sent += round.messages_sent;
        self.rounds.push(round);
    }

    pub fn compute_invocations(&self) -> usize {
        self.rounds.iter().map(|round| round.active_vertices).sum()
    }
}
