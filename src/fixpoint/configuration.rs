use log::info;
use surgestep_api::{configuration_error, BspError};
use timely::Configuration;

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Options of one fixed-point run. With more than one host the run spans a timely cluster and
/// `process_id` selects this process's entry in `hosts`.
#[derive(new, Clone, Debug, PartialEq)]
pub struct FixedPointConfiguration {
    pub max_iterations: usize,
    #[new(value = "1")]
    pub threads: usize,
    #[new(default)]
    pub process_id: usize,
    #[new(default)]
    pub hosts: Vec<String>,
}

impl Default for FixedPointConfiguration {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS)
    }
}

impl FixedPointConfiguration {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_cluster(mut self, process_id: usize, hosts: Vec<String>) -> Self {
        self.process_id = process_id;
        self.hosts = hosts;
        self
    }

    pub fn timely_config(&self) -> Configuration {
        if self.hosts.len() > 1 {
            let c_hosts = self.hosts.to_vec();
            info!("Process {} w/ {} threads, hosts = {:?}", self.process_id, self.threads, c_hosts);
            Configuration::Cluster {
                threads: self.threads,
                process: self.process_id,
                addresses: c_hosts,
                report: false,
                log_fn: Box::new(|_| None),
            }
        } else {
            info!("Process {} w/ {} threads", self.process_id, self.threads);
            Configuration::Process(self.threads)
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BspError> {
        if self.max_iterations == 0 {
            return Err(configuration_error("'max_iterations' should be at least 1"));
        }
        if self.threads == 0 {
            return Err(configuration_error("'threads' should be at least 1"));
        }
        if self.hosts.len() > 1 && self.process_id >= self.hosts.len() {
            return Err(configuration_error(format!(
                "'process_id' {} is not one of the {} hosts",
                self.process_id,
                self.hosts.len()
            )));
        }
        Ok(())
    }
}
