use super::{QueueModel, UtilizationCounters};
use crate::timeq::Cycle;

/// Charges the same delay to every request regardless of load.
#[derive(Debug, Clone, Default)]
pub struct FixedDelayQueue {
    delay: Cycle,
    counters: UtilizationCounters,
}

impl FixedDelayQueue {
    pub fn new(delay: Cycle) -> Self {
        Self {
            delay,
            counters: UtilizationCounters::default(),
        }
    }
}

impl QueueModel for FixedDelayQueue {
    fn compute_queue_delay(&mut self, arrival: Cycle, service: Cycle) -> Cycle {
        self.counters.record(arrival, service, self.delay);
        self.delay
    }

    fn total_requests(&self) -> u64 {
        self.counters.total_requests
    }

    fn utilization(&self) -> f64 {
        self.counters.utilization()
    }
}
