use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::trace;

use crate::error::{ConfigError, NetworkError};
use crate::network::queue::{self, QueueModel};
use crate::network::{CoreId, HubSummary};
use crate::sim::config::QueueModelConfig;
use crate::timeq::{convert_cycle_count, processing_time, Cycle, Frequency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubRole {
    Sender,
    Receiver,
}

/// Clock and width parameters a hub needs to move between clock domains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HubClocks {
    pub gather_frequency: Frequency,
    pub optical_frequency: Frequency,
    pub scatter_frequency: Frequency,
    pub optical_link_width: u32,
    pub scatter_link_width: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HubQueueStats {
    pub packets: u64,
    // in the queue's own clock domain
    pub contention_delay: Cycle,
    pub utilization: f64,
    // bookings answered by the queue's analytical estimate
    pub analytical_requests: u64,
}

impl HubQueueStats {
    fn average_delay_ns(&self, frequency: Frequency) -> f64 {
        if self.packets == 0 {
            return 0.0;
        }
        convert_cycle_count(self.contention_delay, frequency, 1.0) as f64 / self.packets as f64
    }
}

fn analytical_fraction<'a>(stats: impl IntoIterator<Item = &'a HubQueueStats>) -> f64 {
    let (analytical, total) = stats.into_iter().fold((0, 0), |(analytical, total), s| {
        (analytical + s.analytical_requests, total + s.packets)
    });
    if total == 0 {
        0.0
    } else {
        analytical as f64 / total as f64
    }
}

struct HubQueue {
    queue: Box<dyn QueueModel>,
    packets: u64,
    contention_delay: Cycle,
}

impl HubQueue {
    fn new(kind: &str, config: &QueueModelConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            queue: queue::create(kind, 1, config)?,
            packets: 0,
            contention_delay: 0,
        })
    }

    fn book(&mut self, arrival: Cycle, service: Cycle) -> Cycle {
        let delay = self.queue.compute_queue_delay(arrival, service);
        self.packets = self.packets.saturating_add(1);
        self.contention_delay = self.contention_delay.saturating_add(delay);
        delay
    }

    fn stats(&self) -> HubQueueStats {
        HubQueueStats {
            packets: self.packets,
            contention_delay: self.contention_delay,
            utilization: self.queue.utilization(),
            analytical_requests: self.queue.analytical_requests(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queueing state of the core that hosts its cluster's optical hub.
///
/// The sender role has its own lock. All receive partitions share one lock, so requests for
/// different partitions of the same hub still serialize.
pub struct OpticalHub {
    cluster_id: usize,
    clocks: HubClocks,
    sender: Mutex<HubQueue>,
    receivers: Mutex<Vec<HubQueue>>,
}

impl OpticalHub {
    pub fn new(
        cluster_id: usize,
        clocks: HubClocks,
        queue_kind: &str,
        num_receive_partitions: usize,
        config: &QueueModelConfig,
    ) -> Result<Self, ConfigError> {
        if num_receive_partitions == 0 {
            return Err(ConfigError::Invalid {
                field: "network.anet.num_scatter_networks_per_cluster",
                reason: "must be >= 1".to_string(),
            });
        }
        let receivers = (0..num_receive_partitions)
            .map(|_| HubQueue::new(queue_kind, config))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            cluster_id,
            clocks,
            sender: Mutex::new(HubQueue::new(queue_kind, config)?),
            receivers: Mutex::new(receivers),
        })
    }

    fn sender_queue_delay(
        &self,
        core_id: CoreId,
        sender_cluster: usize,
        time: Cycle,
        length: u32,
    ) -> Result<Cycle, NetworkError> {
        if sender_cluster != self.cluster_id {
            return Err(NetworkError::SenderClusterMismatch {
                core: core_id,
                sender_cluster,
                hub_cluster: self.cluster_id,
            });
        }
        let clocks = &self.clocks;
        let arrival = convert_cycle_count(time, clocks.gather_frequency, clocks.optical_frequency);
        let service = processing_time(length, clocks.optical_link_width as f64);
        let delay = lock(&self.sender).book(arrival, service);
        trace!("hub {core_id} sender: arrival {arrival}, service {service}, delay {delay}");
        Ok(convert_cycle_count(
            delay,
            clocks.optical_frequency,
            clocks.gather_frequency,
        ))
    }

    fn receiver_queue_delay(
        &self,
        core_id: CoreId,
        sender_cluster: usize,
        time: Cycle,
        length: u32,
    ) -> Cycle {
        let clocks = &self.clocks;
        let arrival = convert_cycle_count(time, clocks.gather_frequency, clocks.scatter_frequency);
        let service = processing_time(length, clocks.scatter_link_width as f64);
        let delay = {
            let mut receivers = lock(&self.receivers);
            let partition = sender_cluster % receivers.len();
            receivers[partition].book(arrival, service)
        };
        trace!("hub {core_id} receiver: arrival {arrival}, service {service}, delay {delay}");
        convert_cycle_count(delay, clocks.scatter_frequency, clocks.gather_frequency)
    }

    pub fn sender_stats(&self) -> HubQueueStats {
        lock(&self.sender).stats()
    }

    pub fn receiver_stats(&self) -> Vec<HubQueueStats> {
        lock(&self.receivers).iter().map(HubQueue::stats).collect()
    }
}

/// The part of a core's model other cores may reach: its enabled flag and, on hub cores,
/// the optical hub. Shared through the hub directory.
pub struct HubPort {
    core_id: CoreId,
    enabled: AtomicBool,
    queueing_enabled: bool,
    application_cores: usize,
    hub: Option<OpticalHub>,
}

impl HubPort {
    pub fn new(
        core_id: CoreId,
        queueing_enabled: bool,
        application_cores: usize,
        hub: Option<OpticalHub>,
    ) -> Self {
        Self {
            core_id,
            enabled: AtomicBool::new(false),
            queueing_enabled,
            application_cores,
            hub,
        }
    }

    pub fn core_id(&self) -> CoreId {
        self.core_id
    }

    pub fn hub(&self) -> Option<&OpticalHub> {
        self.hub.as_ref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Queueing delay, in gather-network cycles, for a packet of `length` bytes reaching this
    /// hub at gather-clock `time`. Zero whenever contention is not modeled for the request.
    pub fn compute_hub_queue_delay(
        &self,
        role: HubRole,
        sender_cluster: usize,
        time: Cycle,
        length: u32,
        requester: CoreId,
    ) -> Result<Cycle, NetworkError> {
        if !self.is_enabled() || !self.queueing_enabled || requester >= self.application_cores {
            return Ok(0);
        }
        let hub = self.hub.as_ref().ok_or(NetworkError::NotAHub(self.core_id))?;
        match role {
            HubRole::Sender => hub.sender_queue_delay(self.core_id, sender_cluster, time, length),
            HubRole::Receiver => {
                Ok(hub.receiver_queue_delay(self.core_id, sender_cluster, time, length))
            }
        }
    }

    pub fn hub_summary(&self, num_receive_partitions: usize) -> HubSummary {
        let Some(hub) = &self.hub else {
            return HubSummary {
                sender_contention_delay_ns: None,
                receiver_contention_delay_ns: vec![None; num_receive_partitions],
                sender_utilization: None,
                receiver_utilization: vec![None; num_receive_partitions],
                analytical_fraction: None,
            };
        };
        let sender = hub.sender_stats();
        let receivers = hub.receiver_stats();
        HubSummary {
            sender_contention_delay_ns: Some(sender.average_delay_ns(hub.clocks.optical_frequency)),
            receiver_contention_delay_ns: receivers
                .iter()
                .map(|stats| Some(stats.average_delay_ns(hub.clocks.scatter_frequency)))
                .collect(),
            sender_utilization: Some(sender.utilization),
            receiver_utilization: receivers.iter().map(|stats| Some(stats.utilization)).collect(),
            analytical_fraction: Some(analytical_fraction(
                std::iter::once(&sender).chain(&receivers),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::sim::config::{FixedQueueConfig, HistoryListConfig};

    fn clocks() -> HubClocks {
        HubClocks {
            gather_frequency: 1.0,
            optical_frequency: 2.0,
            scatter_frequency: 1.0,
            optical_link_width: 64,
            scatter_link_width: 32,
        }
    }

    fn fixed(delay: Cycle) -> QueueModelConfig {
        QueueModelConfig {
            fixed: FixedQueueConfig { delay },
            ..QueueModelConfig::default()
        }
    }

    fn port(partitions: usize) -> HubPort {
        let hub = OpticalHub::new(3, clocks(), "fixed", partitions, &fixed(5)).unwrap();
        let port = HubPort::new(10, true, 16, Some(hub));
        port.set_enabled(true);
        port
    }

    #[test]
    fn sender_delay_converts_back_to_gather_clock() {
        let port = port(1);
        // 5 optical cycles at 2 GHz -> ceil(2.5) gather cycles
        assert_eq!(3, port.compute_hub_queue_delay(HubRole::Sender, 3, 100, 64, 0).unwrap());
        let stats = port.hub().unwrap().sender_stats();
        assert_eq!(1, stats.packets);
        assert_eq!(5, stats.contention_delay);
    }

    #[test]
    fn receiver_partition_follows_sender_cluster() {
        let port = port(2);
        assert_eq!(5, port.compute_hub_queue_delay(HubRole::Receiver, 1, 0, 64, 0).unwrap());
        assert_eq!(5, port.compute_hub_queue_delay(HubRole::Receiver, 3, 0, 64, 0).unwrap());
        assert_eq!(5, port.compute_hub_queue_delay(HubRole::Receiver, 4, 0, 64, 0).unwrap());
        let stats = port.hub().unwrap().receiver_stats();
        assert_eq!(1, stats[0].packets);
        assert_eq!(2, stats[1].packets);
    }

    #[test]
    fn guards_skip_queueing() {
        let port = port(1);
        // helper core beyond the application cores
        assert_eq!(0, port.compute_hub_queue_delay(HubRole::Sender, 3, 0, 64, 17).unwrap());
        port.set_enabled(false);
        assert_eq!(0, port.compute_hub_queue_delay(HubRole::Sender, 3, 0, 64, 0).unwrap());
        assert_eq!(0, port.hub().unwrap().sender_stats().packets);
    }

    #[test]
    fn sender_hub_rejects_foreign_cluster() {
        let port = port(1);
        let err = port.compute_hub_queue_delay(HubRole::Sender, 2, 0, 64, 0).unwrap_err();
        assert!(matches!(
            err,
            NetworkError::SenderClusterMismatch {
                sender_cluster: 2,
                hub_cluster: 3,
                ..
            }
        ));
    }

    #[test]
    fn queueing_on_non_hub_is_an_error() {
        let port = HubPort::new(11, true, 16, None);
        port.set_enabled(true);
        assert!(matches!(
            port.compute_hub_queue_delay(HubRole::Receiver, 0, 0, 64, 0),
            Err(NetworkError::NotAHub(11))
        ));
        let summary = port.hub_summary(2);
        assert_eq!(None, summary.sender_contention_delay_ns);
        assert_eq!(vec![None, None], summary.receiver_contention_delay_ns);
    }

    #[test]
    fn summary_reports_average_delay_in_ns() {
        let port = port(1);
        port.compute_hub_queue_delay(HubRole::Sender, 3, 0, 64, 0).unwrap();
        port.compute_hub_queue_delay(HubRole::Sender, 3, 0, 64, 0).unwrap();
        let summary = port.hub_summary(1);
        // 10 optical cycles at 2 GHz over 2 packets
        assert_eq!(Some(2.5), summary.sender_contention_delay_ns);
        assert_eq!(vec![Some(0.0)], summary.receiver_contention_delay_ns);
        // 16 busy optical cycles inside a 13 cycle window saturate the sender
        assert_eq!(Some(1.0), summary.sender_utilization);
        assert_eq!(vec![Some(0.0)], summary.receiver_utilization);
        assert_eq!(Some(0.0), summary.analytical_fraction);
    }

    #[test]
    fn summary_reports_analytical_share() {
        let config = QueueModelConfig {
            history_list: HistoryListConfig {
                max_list_size: 2,
                ..HistoryListConfig::default()
            },
            ..QueueModelConfig::default()
        };
        let hub = OpticalHub::new(3, clocks(), "history_list", 1, &config).unwrap();
        let port = HubPort::new(10, true, 16, Some(hub));
        port.set_enabled(true);
        for time in [0, 20, 40] {
            port.compute_hub_queue_delay(HubRole::Sender, 3, time, 64, 0).unwrap();
        }
        // ends before the oldest idle interval still remembered
        port.compute_hub_queue_delay(HubRole::Sender, 3, 0, 64, 0).unwrap();

        let stats = port.hub().unwrap().sender_stats();
        assert_eq!(4, stats.packets);
        assert_eq!(1, stats.analytical_requests);
        assert_eq!(Some(0.25), port.hub_summary(1).analytical_fraction);
    }

    #[test]
    fn concurrent_bookings_are_all_counted() {
        const THREADS: u64 = 8;
        const BOOKINGS: u64 = 1000;
        let port = Arc::new(port(2));
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let port = Arc::clone(&port);
                thread::spawn(move || {
                    for i in 0..BOOKINGS {
                        let time = t * BOOKINGS + i;
                        port.compute_hub_queue_delay(HubRole::Sender, 3, time, 64, 0)
                            .unwrap();
                        // even and odd sender clusters land on different partitions
                        port.compute_hub_queue_delay(HubRole::Receiver, i as usize, time, 64, 0)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let hub = port.hub().unwrap();
        let sender = hub.sender_stats();
        assert_eq!(THREADS * BOOKINGS, sender.packets);
        assert_eq!(5 * THREADS * BOOKINGS, sender.contention_delay);
        let receivers = hub.receiver_stats();
        assert_eq!(THREADS * BOOKINGS / 2, receivers[0].packets);
        assert_eq!(THREADS * BOOKINGS / 2, receivers[1].packets);
        assert_eq!(5 * THREADS * BOOKINGS / 2, receivers[1].contention_delay);
    }
}
