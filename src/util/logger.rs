use chrono::Local;
use log::{Level, Log, Metadata, Record};
use surgestep_api::BspError;

const OWN_TARGETS: [&str; 2] = ["surgestep", "surgestep_api"];

/// Prints to stdout with a local timestamp and the name of the emitting thread, so lines from
/// superstep workers can be told apart. Records from other crates (timely, differential) pass
/// only up to `dependency_level`.
struct RunLogger {
    level: Level,
    dependency_level: Level,
}

impl RunLogger {
    fn threshold(&self, target: &str) -> Level {
        let crate_name = target.split("::").next().unwrap_or_default();
        if OWN_TARGETS.contains(&crate_name) {
            self.level
        } else {
            self.dependency_level
        }
    }
}

impl Log for RunLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.threshold(metadata.target())
    }

    #[allow(clippy::print_stdout)]
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let thread = std::thread::current();
            println!(
                "{} {:<5} [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.6f"),
                record.level().to_string(),
                thread.name().unwrap_or("worker"),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

/// Installs the process-wide logger with dependencies limited to warnings.
pub fn init_logger_with_level(level: Level) -> Result<(), BspError> {
    init_logger(level, Level::Warn)
}

/// Installs the process-wide logger. Fails if a logger was already installed.
pub fn init_logger(level: Level, dependency_level: Level) -> Result<(), BspError> {
    let logger = RunLogger { level, dependency_level };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|e| BspError::Generic(format!("Could not set logger: {}", e)))?;
    log::set_max_level(std::cmp::max(level, dependency_level).to_level_filter());
    Ok(())
}
