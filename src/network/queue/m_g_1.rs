use super::{QueueModel, UtilizationCounters};
use crate::timeq::Cycle;

// keeps the estimate finite once observed load reaches the service rate
const MAX_UTILIZATION: f64 = 0.99;

/// Analytical M/G/1 server. Waiting time comes from the Pollaczek-Khinchine formula using the
/// arrival rate and the first two moments of service time seen so far.
#[derive(Debug, Clone, Default)]
pub struct MG1Queue {
    num_arrivals: u64,
    oldest_arrival: Option<Cycle>,
    newest_arrival: Cycle,
    service_sum: f64,
    service_sq_sum: f64,
    counters: UtilizationCounters,
}

impl MG1Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimated wait for a request arriving now, without booking it.
    pub fn estimate(&self, service: Cycle) -> Cycle {
        let Some(oldest) = self.oldest_arrival else {
            return 0;
        };
        let window = self.newest_arrival.saturating_sub(oldest);
        if self.num_arrivals < 2 || window == 0 {
            return 0;
        }
        let n = self.num_arrivals as f64;
        let arrival_rate = n / window as f64;
        let mean = self.service_sum / n;
        let second_moment = self.service_sq_sum / n;
        let util = (arrival_rate * mean).min(MAX_UTILIZATION);
        let wait = arrival_rate * second_moment / (2.0 * (1.0 - util));
        if service == 0 {
            0
        } else {
            wait.ceil() as Cycle
        }
    }

    /// Books a serviced request into the running statistics.
    pub fn update_queue(&mut self, arrival: Cycle, service: Cycle, queue_delay: Cycle) {
        self.num_arrivals += 1;
        let oldest = *self.oldest_arrival.get_or_insert(arrival);
        self.oldest_arrival = Some(oldest.min(arrival));
        self.newest_arrival = self.newest_arrival.max(arrival);
        let service_f = service as f64;
        self.service_sum += service_f;
        self.service_sq_sum += service_f * service_f;
        self.counters.record(arrival, service, queue_delay);
    }
}

impl QueueModel for MG1Queue {
    fn compute_queue_delay(&mut self, arrival: Cycle, service: Cycle) -> Cycle {
        let delay = self.estimate(service);
        self.update_queue(arrival, service, delay);
        delay
    }

    fn total_requests(&self) -> u64 {
        self.counters.total_requests
    }

    fn utilization(&self) -> f64 {
        self.counters.utilization()
    }
}
