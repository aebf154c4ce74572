use super::{QueueModel, UtilizationCounters};
use crate::timeq::Cycle;

/// Single FIFO server. Requests are serviced in the order the model is asked about them,
/// so an out-of-order early request still waits behind everything already booked.
#[derive(Debug, Clone, Default)]
pub struct BasicQueue {
    busy_until: Cycle,
    counters: UtilizationCounters,
}

impl BasicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn busy_until(&self) -> Cycle {
        self.busy_until
    }
}

impl QueueModel for BasicQueue {
    fn compute_queue_delay(&mut self, arrival: Cycle, service: Cycle) -> Cycle {
        let start = self.busy_until.max(arrival);
        let delay = start - arrival;
        self.busy_until = start.saturating_add(service);
        self.counters.record(arrival, service, delay);
        delay
    }

    fn total_requests(&self) -> u64 {
        self.counters.total_requests
    }

    fn utilization(&self) -> f64 {
        self.counters.utilization()
    }
}
