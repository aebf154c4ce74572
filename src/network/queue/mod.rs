mod basic;
mod fixed;
mod history_list;
mod m_g_1;

pub use basic::BasicQueue;
pub use fixed::FixedDelayQueue;
pub use history_list::HistoryListQueue;
pub use m_g_1::MG1Queue;

use crate::error::ConfigError;
use crate::sim::config::QueueModelConfig;
use crate::timeq::Cycle;

/// Contention model for a single server: how long does a request arriving at `arrival` that
/// needs `service` cycles of the server wait before service starts.
pub trait QueueModel: Send {
    fn compute_queue_delay(&mut self, arrival: Cycle, service: Cycle) -> Cycle;

    fn total_requests(&self) -> u64;

    /// Fraction of the observed time window the server spent busy.
    fn utilization(&self) -> f64;

    /// Requests answered by an analytical estimate instead of the exact model.
    fn analytical_requests(&self) -> u64 {
        0
    }
}

pub fn create(
    name: &str,
    min_processing_time: Cycle,
    config: &QueueModelConfig,
) -> Result<Box<dyn QueueModel>, ConfigError> {
    match name {
        "basic" => Ok(Box::new(BasicQueue::new())),
        "m_g_1" => Ok(Box::new(MG1Queue::new())),
        "history_list" => Ok(Box::new(HistoryListQueue::new(
            min_processing_time,
            config.history_list,
        ))),
        "fixed" => Ok(Box::new(FixedDelayQueue::new(config.fixed.delay))),
        _ => Err(ConfigError::UnknownQueueModel(name.to_string())),
    }
}

/// Busy-time bookkeeping shared by the queue models.
#[derive(Debug, Clone, Copy, Default)]
struct UtilizationCounters {
    total_requests: u64,
    busy_cycles: Cycle,
    first_arrival: Option<Cycle>,
    last_departure: Cycle,
}

impl UtilizationCounters {
    fn record(&mut self, arrival: Cycle, service: Cycle, queue_delay: Cycle) {
        self.total_requests = self.total_requests.saturating_add(1);
        self.busy_cycles = self.busy_cycles.saturating_add(service);
        let first = *self.first_arrival.get_or_insert(arrival);
        self.first_arrival = Some(first.min(arrival));
        let departure = arrival.saturating_add(queue_delay).saturating_add(service);
        self.last_departure = self.last_departure.max(departure);
    }

    fn utilization(&self) -> f64 {
        let Some(first) = self.first_arrival else {
            return 0.0;
        };
        let window = self.last_departure.saturating_sub(first);
        if window == 0 {
            0.0
        } else {
            (self.busy_cycles as f64 / window as f64).min(1.0)
        }
    }
}
