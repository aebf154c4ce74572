use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::io::{self, Write};
use std::sync::Arc;

use log::{debug, info};

use crate::error::{ConfigError, NetworkError};
use crate::network::packet::{Packet, RequesterResolver, ShmemHeaderResolver};
use crate::network::registry::{ClusterRegistry, HubDirectory};
use crate::network::topology::TopologyConfig;
use crate::network::{
    AnetClusterModel, CoreId, EMeshHopCounterModel, Hop, ModelSummary, NetworkModel,
    RoutingAction,
};
use crate::sim::config::{NetworkModelKind, SimulationConfig};
use crate::sim::perf_log::RunSummary;
use crate::timeq::Cycle;
use crate::traffic::patterns::TrafficGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    // packet enters the network at its sender
    Inject,
    // packet reached the next core of a hop
    Arrive,
}

struct Pending {
    time: Cycle,
    seq: u64,
    core: CoreId,
    stage: Stage,
    packet: Packet,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// The router layer around the per-core network models.
///
/// Holds one model per core and delivers every hop a model returns in time order: a
/// forwarded packet is routed again by the model of the core it reached, a received packet
/// is handed to that core's receive accounting. Packets with equal times are delivered in
/// the order they were scheduled.
pub struct NetworkSim {
    config: SimulationConfig,
    topology: Option<Arc<TopologyConfig>>,
    registry: Arc<ClusterRegistry>,
    models: Vec<Box<dyn NetworkModel>>,
    pending: BinaryHeap<Reverse<Pending>>,
    seq: u64,
    now: Cycle,
    completion_time: Cycle,
    delivered: u64,
}

impl NetworkSim {
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        Self::with_resolver(config, Arc::new(ShmemHeaderResolver))
    }

    pub fn with_resolver(
        config: SimulationConfig,
        resolver: Arc<dyn RequesterResolver>,
    ) -> Result<Self, ConfigError> {
        let total_cores = config.general.total_cores as usize;
        let registry = Arc::new(ClusterRegistry::new(total_cores));
        let mut models: Vec<Box<dyn NetworkModel>> = Vec::with_capacity(total_cores);
        let topology = match config.general.network_model {
            NetworkModelKind::AnetCluster => {
                let anet = config
                    .anet
                    .as_ref()
                    .ok_or(ConfigError::MissingSection("network.anet"))?;
                let topology = Arc::new(TopologyConfig::new(
                    config.general.total_cores,
                    anet.cluster_size,
                )?);
                let directory: Arc<dyn HubDirectory> = registry.clone();
                for core_id in 0..total_cores {
                    models.push(Box::new(AnetClusterModel::new(
                        core_id,
                        &config,
                        Arc::clone(&topology),
                        Arc::clone(&directory),
                        Arc::clone(&resolver),
                    )?));
                }
                Some(topology)
            }
            NetworkModelKind::EmeshHopCounter => {
                for core_id in 0..total_cores {
                    models.push(Box::new(EMeshHopCounterModel::new(core_id, &config)?));
                }
                None
            }
        };
        info!(
            "built {} {} models ({} process(es))",
            models.len(),
            config.general.network_model.name(),
            config.general.process_count
        );

        Ok(Self {
            config,
            topology,
            registry,
            models,
            pending: BinaryHeap::new(),
            seq: 0,
            now: 0,
            completion_time: 0,
            delivered: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn topology(&self) -> Option<&TopologyConfig> {
        self.topology.as_deref()
    }

    pub fn registry(&self) -> &ClusterRegistry {
        &self.registry
    }

    pub fn model(&self, core_id: CoreId) -> Option<&dyn NetworkModel> {
        self.models.get(core_id).map(|model| model.as_ref())
    }

    pub fn num_cores(&self) -> usize {
        self.models.len()
    }

    /// Time of the most recently delivered event.
    pub fn now(&self) -> Cycle {
        self.now
    }

    /// Latest time at which a receiving core finished accepting a packet.
    pub fn completion_time(&self) -> Cycle {
        self.completion_time
    }

    /// Packets handed to a receiving core so far, counted whether or not the model was enabled.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn enable_models(&mut self) {
        self.models.iter_mut().for_each(|model| model.enable());
    }

    pub fn disable_models(&mut self) {
        self.models.iter_mut().for_each(|model| model.disable());
    }

    fn schedule(&mut self, core: CoreId, stage: Stage, packet: Packet) {
        let pending = Pending {
            time: packet.time,
            seq: self.seq,
            core,
            stage,
            packet,
        };
        self.seq += 1;
        self.pending.push(Reverse(pending));
    }

    /// Queues `packet` for injection at its sender at `packet.time`.
    pub fn inject(&mut self, packet: Packet) -> Result<(), NetworkError> {
        if packet.sender >= self.models.len() {
            return Err(NetworkError::InvalidSender(packet.sender));
        }
        self.schedule(packet.sender, Stage::Inject, packet);
        Ok(())
    }

    fn schedule_hops(&mut self, packet: &Packet, hops: impl IntoIterator<Item = Hop>) {
        for hop in hops {
            let mut next = packet.clone();
            next.receiver = hop.final_dest;
            next.specific = Some(hop.specific);
            next.time = hop.time;
            self.schedule(hop.next_dest, Stage::Arrive, next);
        }
    }

    /// Delivers the earliest pending event. Returns its time, or `None` once nothing is left.
    pub fn step(&mut self) -> Result<Option<Cycle>, NetworkError> {
        let Some(Reverse(pending)) = self.pending.pop() else {
            return Ok(None);
        };
        let Pending {
            time,
            core,
            stage,
            mut packet,
            ..
        } = pending;
        self.now = time;
        let model = self
            .models
            .get_mut(core)
            .ok_or(NetworkError::InvalidReceiver(core))?;

        let action = match stage {
            Stage::Inject => RoutingAction::Forward,
            Stage::Arrive => model.compute_action(&packet)?,
        };
        match action {
            RoutingAction::Forward => {
                let hops = model.route_packet(&packet)?;
                debug!(
                    "t={time}: core {core} forwarded packet from {} as {} hop(s)",
                    packet.sender,
                    hops.len()
                );
                self.schedule_hops(&packet, hops);
            }
            RoutingAction::Receive => {
                model.process_received_packet(&mut packet)?;
                self.completion_time = self.completion_time.max(packet.time);
                self.delivered += 1;
            }
        }
        Ok(Some(time))
    }

    /// Delivers events until none are pending and returns the completion time.
    pub fn run_until_idle(&mut self) -> Result<Cycle, NetworkError> {
        while self.step()?.is_some() {}
        Ok(self.completion_time)
    }

    /// Runs the configured synthetic traffic: the warm-up rounds with every model disabled,
    /// then the measured rounds with every model enabled.
    pub fn run(&mut self) -> Result<RunSummary, NetworkError> {
        let traffic_config = self.config.traffic.clone();
        let application_cores = self.config.general.application_cores as usize;
        let mut traffic = TrafficGenerator::new(&traffic_config, application_cores);

        let mut start = self.now;
        if traffic_config.warmup_packets > 0 {
            self.disable_models();
            for packet in traffic.generate(traffic_config.warmup_packets, start) {
                self.inject(packet)?;
            }
            let drained = self.run_until_idle()?;
            start = drained.max(traffic.end_of(traffic_config.warmup_packets, start));
            info!("warm-up finished at {start}");
        }

        self.enable_models();
        for packet in traffic.generate(traffic_config.num_packets, start) {
            self.inject(packet)?;
        }
        let completion_time = self.run_until_idle()?;
        info!(
            "{:?} traffic finished at {completion_time}, {} packets delivered",
            traffic.pattern(),
            self.delivered
        );
        Ok(RunSummary::new(
            self.config.general.network_model.name(),
            completion_time,
            self.summaries(),
        ))
    }

    pub fn summaries(&self) -> Vec<ModelSummary> {
        self.models.iter().map(|model| model.summary()).collect()
    }

    pub fn output_summaries(&self, out: &mut dyn Write) -> io::Result<()> {
        for model in &self.models {
            writeln!(out, "Core {}:", model.core_id())?;
            writeln!(out, "  Network summary:")?;
            model.output_summary(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::{Destination, PacketType};

    const CONFIG: &str = r#"
        [general]
        total_cores = 20
        application_cores = 20

        [network.anet]
        cluster_size = 4

        [network.anet.gather]
        frequency = 1.0
        link_width = 64
        link_length = 1.0
        link_type = "electrical_repeated"
        num_hops_to_hub = 2
        router_delay = 1

        [network.anet.optical]
        frequency = 1.0
        link_width = 64
        link_length = 1.0

        [network.anet.scatter]
        frequency = 1.0
        link_width = 64
        link_length = 1.0
        link_type = "electrical_repeated"
        network_delay = 1

        [link_model.electrical_repeated.delay]
        delay_per_mm = 1.0
        tx_delay = 0
        rx_delay = 0

        [link_model.optical]
        num_receiver_endpoints = 1

        [link_model.optical.delay]
        waveguide_delay_per_mm = 1.0
        e_o_conversion = 0
        o_e_conversion = 0
        wdm_hops = 0
    "#;

    fn sim() -> NetworkSim {
        let table: toml::Table = toml::from_str(CONFIG).unwrap();
        NetworkSim::new(SimulationConfig::from_table(&table).unwrap()).unwrap()
    }

    #[test]
    fn builds_one_model_per_core() {
        let sim = sim();
        assert_eq!(20, sim.num_cores());
        assert_eq!(20, sim.registry().len());
        assert_eq!(6, sim.topology().unwrap().num_clusters());
        assert!(sim.model(19).is_some());
        assert!(sim.model(20).is_none());
        assert!(!sim.model(0).unwrap().is_enabled());
    }

    #[test]
    fn events_are_delivered_in_time_order() {
        let mut sim = sim();
        sim.enable_models();
        sim.inject(Packet::new(0, Destination::Core(0), PacketType::User, 8, 50)).unwrap();
        sim.inject(Packet::new(1, Destination::Core(1), PacketType::User, 8, 10)).unwrap();
        // injection then self delivery of core 1's packet
        assert_eq!(Some(10), sim.step().unwrap());
        assert_eq!(Some(10), sim.step().unwrap());
        assert_eq!(1, sim.delivered());
        assert_eq!(50, sim.run_until_idle().unwrap());
        assert_eq!(2, sim.delivered());
        assert!(sim.is_idle());
        assert_eq!(None, sim.step().unwrap());
    }

    #[test]
    fn rejects_unknown_sender() {
        let mut sim = sim();
        let err = sim
            .inject(Packet::new(25, Destination::Core(0), PacketType::User, 8, 0))
            .unwrap_err();
        assert!(matches!(err, NetworkError::InvalidSender(25)));
    }

    #[test]
    fn summaries_name_every_core() {
        let sim = sim();
        let mut out = Vec::new();
        sim.output_summaries(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Core 0:"));
        assert!(text.contains("Core 19:"));
        assert_eq!(20, sim.summaries().len());
    }
}
