use std::collections::VecDeque;

use log::trace;

use super::m_g_1::MG1Queue;
use super::{QueueModel, UtilizationCounters};
use crate::sim::config::HistoryListConfig;
use crate::timeq::Cycle;

/// Server modeled by a bounded list of the idle intervals left between booked requests.
///
/// Requests that arrive before the oldest remembered interval are too old to place exactly
/// and are estimated by an embedded M/G/1 model instead, when that fallback is enabled.
#[derive(Debug, Clone)]
pub struct HistoryListQueue {
    min_processing_time: Cycle,
    config: HistoryListConfig,
    // disjoint, sorted [start, end) idle intervals; the last one is open-ended
    free_intervals: VecDeque<(Cycle, Cycle)>,
    analytical: MG1Queue,
    analytical_requests: u64,
    counters: UtilizationCounters,
}

impl HistoryListQueue {
    pub fn new(min_processing_time: Cycle, config: HistoryListConfig) -> Self {
        let mut free_intervals = VecDeque::new();
        free_intervals.push_back((0, Cycle::MAX));
        Self {
            min_processing_time,
            config: HistoryListConfig {
                max_list_size: config.max_list_size.max(1),
                ..config
            },
            free_intervals,
            analytical: MG1Queue::new(),
            analytical_requests: 0,
            counters: UtilizationCounters::default(),
        }
    }

    pub fn free_intervals(&self) -> impl Iterator<Item = &(Cycle, Cycle)> {
        self.free_intervals.iter()
    }

    fn worth_keeping(&self, start: Cycle, end: Cycle) -> bool {
        end > start && end - start >= self.min_processing_time
    }

    fn compute_using_history_list(&mut self, arrival: Cycle, service: Cycle) -> Cycle {
        let mut cursor = arrival;
        let mut remaining = service;
        let mut finish = None;
        let mut i = 0;
        while i < self.free_intervals.len() {
            let (start, end) = self.free_intervals[i];
            let begin = cursor.max(start);
            if begin.saturating_add(remaining) <= end {
                let done = begin + remaining;
                self.free_intervals.remove(i);
                let mut at = i;
                if self.worth_keeping(start, begin) {
                    self.free_intervals.insert(at, (start, begin));
                    at += 1;
                }
                if self.worth_keeping(done, end) {
                    self.free_intervals.insert(at, (done, end));
                }
                finish = Some(done);
                break;
            }
            if self.config.interleaving_enabled && end > begin {
                // take what this interval offers and continue in the next one
                self.free_intervals.remove(i);
                if self.worth_keeping(start, begin) {
                    self.free_intervals.insert(i, (start, begin));
                    i += 1;
                }
                remaining -= end - begin;
                cursor = end;
                continue;
            }
            i += 1;
        }

        if self.free_intervals.len() > self.config.max_list_size {
            self.free_intervals.pop_front();
        }

        let finish = finish.unwrap_or(Cycle::MAX);
        let delay = finish.saturating_sub(arrival).saturating_sub(service);
        trace!("history list: arrival {arrival}, service {service}, queue delay {delay}");
        delay
    }
}

impl QueueModel for HistoryListQueue {
    fn compute_queue_delay(&mut self, arrival: Cycle, service: Cycle) -> Cycle {
        let oldest_start = self.free_intervals.front().map_or(0, |(start, _)| *start);
        let delay =
            if self.config.analytical_model_enabled && arrival.saturating_add(service) < oldest_start {
                self.analytical_requests += 1;
                self.analytical.estimate(service)
            } else {
                self.compute_using_history_list(arrival, service)
            };
        self.analytical.update_queue(arrival, service, delay);
        self.counters.record(arrival, service, delay);
        delay
    }

    fn total_requests(&self) -> u64 {
        self.counters.total_requests
    }

    fn utilization(&self) -> f64 {
        self.counters.utilization()
    }

    fn analytical_requests(&self) -> u64 {
        self.analytical_requests
    }
}
