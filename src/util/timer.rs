use std::fmt::{Debug, Error, Formatter};
use std::iter::Sum;
use std::ops::Deref;
use std::time::{Duration, Instant};

/// Measures a whole run and the laps (rounds) inside it.
#[derive(Clone, Copy, Debug)]
pub struct RunTimer {
    started: Instant,
    lap_started: Instant,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Elapsed {
    duration: Duration,
}

impl RunTimer {
    pub fn start() -> Self {
        let now = Instant::now();
        Self { started: now, lap_started: now }
    }

    /// Time since the previous lap (or the start), and begins the next lap.
    pub fn lap(&mut self) -> Elapsed {
        let now = Instant::now();
        let lap = Elapsed::from(now - self.lap_started);
        self.lap_started = now;
        lap
    }

    pub fn total(&self) -> Elapsed {
        Elapsed::from(self.started.elapsed())
    }
}

impl Elapsed {
    pub fn to_millis_string(&self) -> String {
        const MICRO_PER_MILLI: u128 = 1_000;
        format!(
            "{}.{:03} ms",
            self.duration.as_micros() / MICRO_PER_MILLI,
            self.duration.as_micros() % MICRO_PER_MILLI
        )
    }

    pub fn to_seconds_string(&self) -> String {
        format!("{}.{:06} s", self.duration.as_secs(), self.duration.subsec_micros())
    }
}

impl From<Duration> for Elapsed {
    fn from(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Debug for Elapsed {
    fn fmt(&self, f: &mut Formatter) -> Result<(), Error> {
        write!(f, "{:?}", self.duration)
    }
}

impl Deref for Elapsed {
    type Target = Duration;

    fn deref(&self) -> &Self::Target {
        &self.duration
    }
}

impl Sum for Elapsed {
    fn sum<I: Iterator<Item = Elapsed>>(iter: I) -> Self {
        Elapsed::from(iter.map(|elapsed| elapsed.duration).sum::<Duration>())
    }
}
