use std::sync::Arc;

use log::{debug, info};
use smallvec::smallvec;

use crate::error::{ConfigError, NetworkError};
use crate::network::hub::{HubClocks, HubPort, HubRole, OpticalHub};
use crate::network::link::LinkModel;
use crate::network::packet::{Destination, Packet, RequesterResolver};
use crate::network::registry::HubDirectory;
use crate::network::topology::TopologyConfig;
use crate::network::{
    Component, CoreId, Hop, Hops, ModelSummary, NetworkModel, PowerSummary, ProcessMode,
    ReceiveCounters, RoutingAction,
};
use crate::sim::config::SimulationConfig;
use crate::timeq::{convert_cycle_count, processing_time, Cycle, Frequency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubNetwork {
    Gather,
    Optical,
    Scatter,
}

/// Hybrid cluster network model of one core.
///
/// Packets leave a core on the electrical gather network towards the cluster hub, cross to
/// the destination cluster's hub on the optical network and fan out to the receiving cores
/// on the electrical scatter network. Packets between cores of the same cluster never touch
/// the optical network. All delays are kept in gather-network cycles.
pub struct AnetClusterModel {
    core_id: CoreId,
    cluster_id: usize,
    mode: ProcessMode,
    topology: Arc<TopologyConfig>,
    directory: Arc<dyn HubDirectory>,
    resolver: Arc<dyn RequesterResolver>,
    port: Arc<HubPort>,

    application_cores: usize,
    power_modeling: bool,
    queueing_enabled: bool,
    packet_header_bytes: u32,
    num_scatter_networks: usize,
    scatter_energy_fanout: u32,

    gather_frequency: Frequency,
    gather_link: LinkModel,
    optical_link: LinkModel,
    scatter_link: LinkModel,

    effective_bandwidth: f64,
    gather_delay: Cycle,
    optical_link_delay: Cycle,
    scatter_delay: Cycle,

    received: ReceiveCounters,
}

impl AnetClusterModel {
    pub fn new(
        core_id: CoreId,
        config: &SimulationConfig,
        topology: Arc<TopologyConfig>,
        directory: Arc<dyn HubDirectory>,
        resolver: Arc<dyn RequesterResolver>,
    ) -> Result<Self, ConfigError> {
        let anet = config
            .anet
            .as_ref()
            .ok_or(ConfigError::MissingSection("network.anet"))?;
        let general = &config.general;
        if topology.total_cores() != general.total_cores as usize
            || topology.cluster_size() != anet.cluster_size as usize
        {
            return Err(ConfigError::Invalid {
                field: "network.anet.cluster_size",
                reason: format!(
                    "topology ({} cores, cluster size {}) does not match config ({} cores, cluster size {})",
                    topology.total_cores(),
                    topology.cluster_size(),
                    general.total_cores,
                    anet.cluster_size
                ),
            });
        }
        if core_id >= topology.total_cores() {
            return Err(ConfigError::Invalid {
                field: "general.total_cores",
                reason: format!("core {core_id} outside a {} core mesh", topology.total_cores()),
            });
        }

        let (gather, optical, scatter) = (&anet.gather, &anet.optical, &anet.scatter);
        if gather.frequency != scatter.frequency {
            return Err(ConfigError::FrequencyMismatch {
                gather: gather.frequency,
                scatter: scatter.frequency,
            });
        }

        // bits per gather-network cycle
        let gather_bandwidth = gather.link_width as f64;
        let optical_bandwidth =
            optical.link_width as f64 * (optical.frequency / gather.frequency);
        let scatter_bandwidth =
            scatter.link_width as f64 * (scatter.frequency / gather.frequency);
        let effective_bandwidth = gather_bandwidth
            .min(optical_bandwidth)
            .min(scatter_bandwidth);

        let power_modeling = general.enable_power_modeling;
        let links = &config.link_model;
        let gather_link = LinkModel::create(
            &gather.link_type,
            gather.frequency,
            gather.link_length,
            gather.link_width,
            power_modeling,
            links,
        )?;
        let optical_link = LinkModel::create(
            &optical.link_type,
            optical.frequency,
            optical.link_length,
            optical.link_width,
            power_modeling,
            links,
        )?;
        let scatter_link = LinkModel::create(
            &scatter.link_type,
            scatter.frequency,
            scatter.link_length,
            scatter.link_width,
            power_modeling,
            links,
        )?;

        let gather_delay =
            (gather_link.delay() + gather.router_delay) * gather.num_hops_to_hub as Cycle;
        let optical_link_delay =
            convert_cycle_count(optical_link.delay(), optical.frequency, gather.frequency);
        let scatter_delay =
            convert_cycle_count(scatter.network_delay, scatter.frequency, gather.frequency);

        let num_scatter_networks = anet.num_scatter_networks_per_cluster as usize;
        if num_scatter_networks == 0 {
            return Err(ConfigError::Invalid {
                field: "network.anet.num_scatter_networks_per_cluster",
                reason: "must be >= 1".to_string(),
            });
        }

        let cluster_id = topology.cluster_id_of(core_id);
        let is_hub = topology.is_hub(core_id);
        let queueing_enabled = anet.queue_model.enabled;
        let hub = if queueing_enabled && is_hub {
            let clocks = HubClocks {
                gather_frequency: gather.frequency,
                optical_frequency: optical.frequency,
                scatter_frequency: scatter.frequency,
                optical_link_width: optical.link_width,
                scatter_link_width: scatter.link_width,
            };
            Some(OpticalHub::new(
                cluster_id,
                clocks,
                &anet.queue_model.kind,
                num_scatter_networks,
                &config.queue_model,
            )?)
        } else {
            None
        };
        let port = Arc::new(HubPort::new(
            core_id,
            queueing_enabled,
            general.application_cores as usize,
            hub,
        ));
        directory.register(Arc::clone(&port));

        info!(
            "anet core {}: cluster {}, hub {}, effective bandwidth {} bits/cycle, gather {} / optical {} / scatter {} cycles",
            core_id,
            cluster_id,
            if port.hub().is_some() { "yes" } else { "no" },
            effective_bandwidth,
            gather_delay,
            optical_link_delay,
            scatter_delay
        );

        Ok(Self {
            core_id,
            cluster_id,
            mode: ProcessMode::from_process_count(general.process_count),
            scatter_energy_fanout: anet.scatter_energy_fanout.unwrap_or(anet.cluster_size),
            topology,
            directory,
            resolver,
            port,
            application_cores: general.application_cores as usize,
            power_modeling,
            queueing_enabled,
            packet_header_bytes: anet.packet_header_bytes,
            num_scatter_networks,
            gather_frequency: gather.frequency,
            gather_link,
            optical_link,
            scatter_link,
            effective_bandwidth,
            gather_delay,
            optical_link_delay,
            scatter_delay,
            received: ReceiveCounters::default(),
        })
    }

    pub fn topology(&self) -> &TopologyConfig {
        &self.topology
    }

    pub fn port(&self) -> &Arc<HubPort> {
        &self.port
    }

    pub fn effective_bandwidth(&self) -> f64 {
        self.effective_bandwidth
    }

    pub fn gather_delay(&self) -> Cycle {
        self.gather_delay
    }

    pub fn optical_link_delay(&self) -> Cycle {
        self.optical_link_delay
    }

    pub fn scatter_delay(&self) -> Cycle {
        self.scatter_delay
    }

    pub fn received(&self) -> &ReceiveCounters {
        &self.received
    }

    pub fn serialization_delay(&self, modeled_length: u32) -> Cycle {
        processing_time(modeled_length, self.effective_bandwidth)
    }

    pub fn modeled_length(&self, packet: &Packet) -> u32 {
        packet.modeled_length(self.packet_header_bytes)
    }

    /// Core charged for the packet: shared-memory traffic belongs to the core it is sent for.
    pub fn requester(&self, packet: &Packet) -> Result<CoreId, NetworkError> {
        let requester = if packet.packet_type.is_shared_memory() {
            self.resolver.shmem_requester(packet)
        } else {
            packet.sender
        };
        if requester >= self.topology.total_cores() {
            return Err(NetworkError::InvalidRequester(requester));
        }
        Ok(requester)
    }

    /// Queueing delay at this core's own hub.
    pub fn compute_hub_queue_delay(
        &self,
        role: HubRole,
        sender_cluster: usize,
        time: Cycle,
        length: u32,
        requester: CoreId,
    ) -> Result<Cycle, NetworkError> {
        self.port
            .compute_hub_queue_delay(role, sender_cluster, time, length, requester)
    }

    // asks the hub of `hub_cluster`, wherever it lives, to book the packet
    fn hub_queue_delay_at(
        &self,
        role: HubRole,
        sender_cluster: usize,
        hub_cluster: usize,
        time: Cycle,
        length: u32,
        requester: CoreId,
    ) -> Result<Cycle, NetworkError> {
        if !self.queueing_enabled {
            return Ok(0);
        }
        let hub_core = self.topology.hub_core_id_of(hub_cluster);
        let port = self
            .directory
            .hub_port(hub_core)
            .ok_or(NetworkError::HubNotRegistered(hub_core))?;
        port.compute_hub_queue_delay(role, sender_cluster, time, length, requester)
    }

    fn update_dynamic_energy(&mut self, sub_network: SubNetwork, length: u32) {
        if !self.power_modeling {
            return;
        }
        match sub_network {
            SubNetwork::Gather => {
                let width = self.gather_link.width();
                // average mesh hops from a core to its hub
                let hops = (self.topology.sqrt_cluster_size() / 2 + 1) as Cycle;
                let flits = processing_time(length, width as f64) * hops;
                self.gather_link.update_dynamic_energy(width / 2, flits);
            }
            SubNetwork::Optical => {
                let width = self.optical_link.width();
                let flits = processing_time(length, width as f64);
                self.optical_link.update_dynamic_energy(width / 2, flits);
            }
            SubNetwork::Scatter => {
                let width = self.scatter_link.width();
                let flits = processing_time(length, width as f64) * self.scatter_energy_fanout as Cycle;
                self.scatter_link.update_dynamic_energy(width / 2, flits);
            }
        }
    }

    fn check_receiver(&self, receiver: CoreId) -> Result<(), NetworkError> {
        if receiver >= self.topology.total_cores() {
            return Err(NetworkError::InvalidReceiver(receiver));
        }
        Ok(())
    }

    fn route_single_process(
        &mut self,
        packet: &Packet,
        length: u32,
        requester: CoreId,
    ) -> Result<Hops, NetworkError> {
        let serialization = self.serialization_delay(length);
        let sender_cluster = self.topology.cluster_id_of(packet.sender);

        let receiver = match packet.receiver {
            Destination::Broadcast => {
                self.update_dynamic_energy(SubNetwork::Gather, length);
                self.update_dynamic_energy(SubNetwork::Optical, length);
                let sender_queue = self.hub_queue_delay_at(
                    HubRole::Sender,
                    sender_cluster,
                    sender_cluster,
                    packet.time + self.gather_delay,
                    length,
                    requester,
                )?;
                let to_receiver_hub = self.gather_delay + sender_queue + self.optical_link_delay;

                let num_clusters = self.topology.num_clusters();
                let mut receiver_queue = Vec::with_capacity(num_clusters);
                for cluster in 0..num_clusters {
                    self.update_dynamic_energy(SubNetwork::Scatter, length);
                    receiver_queue.push(self.hub_queue_delay_at(
                        HubRole::Receiver,
                        sender_cluster,
                        cluster,
                        packet.time + to_receiver_hub,
                        length,
                        requester,
                    )?);
                }

                let hops: Hops = (0..self.topology.total_cores())
                    .map(|core| Hop {
                        next_dest: core,
                        final_dest: Destination::Broadcast,
                        specific: Component::ReceiverCore,
                        time: packet.time
                            + to_receiver_hub
                            + receiver_queue[self.topology.cluster_id_of(core)]
                            + self.scatter_delay
                            + serialization,
                    })
                    .collect();
                debug!(
                    "core {}: broadcast from {} resolved to {} hops",
                    self.core_id,
                    packet.sender,
                    hops.len()
                );
                return Ok(hops);
            }
            Destination::Core(receiver) => receiver,
        };

        self.check_receiver(receiver)?;
        let latency = if packet.sender == receiver {
            0
        } else {
            self.update_dynamic_energy(SubNetwork::Gather, length);
            let receiver_cluster = self.topology.cluster_id_of(receiver);
            let to_receiver_hub = if sender_cluster == receiver_cluster {
                self.gather_delay
            } else {
                self.update_dynamic_energy(SubNetwork::Optical, length);
                let sender_queue = self.hub_queue_delay_at(
                    HubRole::Sender,
                    sender_cluster,
                    sender_cluster,
                    packet.time + self.gather_delay,
                    length,
                    requester,
                )?;
                self.gather_delay + sender_queue + self.optical_link_delay
            };

            self.update_dynamic_energy(SubNetwork::Scatter, length);
            let receiver_queue = self.hub_queue_delay_at(
                HubRole::Receiver,
                sender_cluster,
                receiver_cluster,
                packet.time + to_receiver_hub,
                length,
                requester,
            )?;
            to_receiver_hub + receiver_queue + self.scatter_delay + serialization
        };

        let hop = Hop {
            next_dest: receiver,
            final_dest: packet.receiver,
            specific: Component::ReceiverCore,
            time: packet.time + latency,
        };
        debug!("core {}: unicast {} -> {} at {}", self.core_id, packet.sender, receiver, hop.time);
        Ok(smallvec![hop])
    }

    fn undefined_route(&self, packet: &Packet) -> NetworkError {
        NetworkError::UndefinedRoute {
            core: self.core_id,
            sender: packet.sender,
            receiver: packet.receiver,
            specific: packet.specific,
            time: packet.time,
        }
    }

    fn check_local_sender(&self, packet: &Packet) -> Result<(), NetworkError> {
        if packet.sender != self.core_id {
            return Err(NetworkError::SenderMismatch {
                core: self.core_id,
                sender: packet.sender,
            });
        }
        Ok(())
    }

    // hops from this hub to every core in its cluster
    fn scatter_to_local_cores(
        &mut self,
        packet: &Packet,
        length: u32,
        requester: CoreId,
    ) -> Result<Hops, NetworkError> {
        self.update_dynamic_energy(SubNetwork::Scatter, length);
        let sender_cluster = self.topology.cluster_id_of(packet.sender);
        let receiver_queue = self.compute_hub_queue_delay(
            HubRole::Receiver,
            sender_cluster,
            packet.time,
            length,
            requester,
        )?;
        let time = packet.time + receiver_queue + self.scatter_delay;
        Ok(self
            .topology
            .cores_in_cluster(self.cluster_id)
            .into_iter()
            .map(|core| Hop {
                next_dest: core,
                final_dest: Destination::Core(core),
                specific: Component::ReceiverCore,
                time,
            })
            .collect())
    }

    fn route_multi_process(
        &mut self,
        packet: &Packet,
        length: u32,
        requester: CoreId,
    ) -> Result<Hops, NetworkError> {
        let sender_cluster = self.topology.cluster_id_of(packet.sender);
        match (packet.receiver, packet.specific) {
            (Destination::Broadcast, Some(Component::SenderHub)) => {
                self.update_dynamic_energy(SubNetwork::Optical, length);
                let sender_queue = self.compute_hub_queue_delay(
                    HubRole::Sender,
                    sender_cluster,
                    packet.time,
                    length,
                    requester,
                )?;
                let optical_time = packet.time + sender_queue + self.optical_link_delay;
                let mut hops: Hops = (0..self.topology.num_clusters())
                    .filter(|cluster| *cluster != self.cluster_id)
                    .map(|cluster| Hop {
                        next_dest: self.topology.hub_core_id_of(cluster),
                        final_dest: Destination::Broadcast,
                        specific: Component::ReceiverHub,
                        time: optical_time,
                    })
                    .collect();
                hops.extend(self.scatter_to_local_cores(packet, length, requester)?);
                Ok(hops)
            }
            (Destination::Broadcast, Some(Component::ReceiverHub)) => {
                self.scatter_to_local_cores(packet, length, requester)
            }
            (Destination::Broadcast, None) => {
                self.check_local_sender(packet)?;
                self.update_dynamic_energy(SubNetwork::Gather, length);
                Ok(smallvec![Hop {
                    next_dest: self.topology.hub_core_id_of(self.cluster_id),
                    final_dest: Destination::Broadcast,
                    specific: Component::SenderHub,
                    time: packet.time + self.gather_delay,
                }])
            }
            (Destination::Core(receiver), specific) => {
                self.check_receiver(receiver)?;
                let receiver_cluster = self.topology.cluster_id_of(receiver);
                let (next_dest, next_component, latency) = match specific {
                    Some(Component::SenderHub) if sender_cluster == receiver_cluster => {
                        self.update_dynamic_energy(SubNetwork::Scatter, length);
                        let receiver_queue = self.compute_hub_queue_delay(
                            HubRole::Receiver,
                            sender_cluster,
                            packet.time,
                            length,
                            requester,
                        )?;
                        (
                            receiver,
                            Component::ReceiverCore,
                            receiver_queue + self.scatter_delay,
                        )
                    }
                    Some(Component::SenderHub) => {
                        self.update_dynamic_energy(SubNetwork::Optical, length);
                        let sender_queue = self.compute_hub_queue_delay(
                            HubRole::Sender,
                            sender_cluster,
                            packet.time,
                            length,
                            requester,
                        )?;
                        (
                            self.topology.hub_core_id_of(receiver_cluster),
                            Component::ReceiverHub,
                            sender_queue + self.optical_link_delay,
                        )
                    }
                    Some(Component::ReceiverHub) => {
                        if self.cluster_id != receiver_cluster {
                            return Err(NetworkError::HubClusterMismatch {
                                core: self.core_id,
                                hub_cluster: self.cluster_id,
                                receiver,
                                receiver_cluster,
                            });
                        }
                        self.update_dynamic_energy(SubNetwork::Scatter, length);
                        let receiver_queue = self.compute_hub_queue_delay(
                            HubRole::Receiver,
                            sender_cluster,
                            packet.time,
                            length,
                            requester,
                        )?;
                        (
                            receiver,
                            Component::ReceiverCore,
                            receiver_queue + self.scatter_delay,
                        )
                    }
                    None => {
                        self.check_local_sender(packet)?;
                        if packet.sender == receiver {
                            (receiver, Component::ReceiverCore, 0)
                        } else {
                            self.update_dynamic_energy(SubNetwork::Gather, length);
                            (
                                self.topology.hub_core_id_of(sender_cluster),
                                Component::SenderHub,
                                self.gather_delay,
                            )
                        }
                    }
                    Some(Component::SenderCore | Component::ReceiverCore) => {
                        return Err(self.undefined_route(packet));
                    }
                };
                let hop = Hop {
                    next_dest,
                    final_dest: packet.receiver,
                    specific: next_component,
                    time: packet.time + latency,
                };
                debug!(
                    "core {}: {} -> {} next hop {} ({:?}) at {}",
                    self.core_id, packet.sender, receiver, next_dest, next_component, hop.time
                );
                Ok(smallvec![hop])
            }
            _ => Err(self.undefined_route(packet)),
        }
    }

    fn static_power(&self) -> f64 {
        if !self.topology.is_hub(self.core_id) {
            return 0.0;
        }
        // a tree joining the cluster's cores and the hub has cluster_size edges
        let links = self.topology.cluster_size() as f64;
        self.gather_link.static_power() * links
            + self.optical_link.static_power()
            + self.scatter_link.static_power() * links * self.num_scatter_networks as f64
    }

    fn dynamic_energy(&self) -> f64 {
        self.gather_link.dynamic_energy()
            + self.optical_link.dynamic_energy()
            + self.scatter_link.dynamic_energy()
    }
}

impl NetworkModel for AnetClusterModel {
    fn core_id(&self) -> CoreId {
        self.core_id
    }

    fn compute_action(&self, packet: &Packet) -> Result<RoutingAction, NetworkError> {
        match packet.specific {
            Some(Component::SenderHub | Component::ReceiverHub) => Ok(RoutingAction::Forward),
            Some(Component::ReceiverCore) => match packet.receiver {
                Destination::Broadcast => Ok(RoutingAction::Receive),
                Destination::Core(receiver) if receiver == self.core_id => {
                    Ok(RoutingAction::Receive)
                }
                receiver => Err(NetworkError::ReceiverMismatch {
                    core: self.core_id,
                    receiver,
                }),
            },
            specific => Err(NetworkError::UnhandledComponent {
                core: self.core_id,
                specific,
            }),
        }
    }

    fn route_packet(&mut self, packet: &Packet) -> Result<Hops, NetworkError> {
        let requester = self.requester(packet)?;
        let length = self.modeled_length(packet);
        match self.mode {
            ProcessMode::Single => self.route_single_process(packet, length, requester),
            ProcessMode::Multi => self.route_multi_process(packet, length, requester),
        }
    }

    fn process_received_packet(&mut self, packet: &mut Packet) -> Result<(), NetworkError> {
        let requester = self.requester(packet)?;
        if !self.is_enabled() || requester >= self.application_cores {
            return Ok(());
        }
        let length = self.modeled_length(packet);
        if self.mode == ProcessMode::Multi {
            packet.time += self.serialization_delay(length);
        }
        self.received
            .record(length, packet.time.saturating_sub(packet.start_time));
        Ok(())
    }

    fn enable(&mut self) {
        self.port.set_enabled(true);
    }

    fn disable(&mut self) {
        self.port.set_enabled(false);
    }

    fn is_enabled(&self) -> bool {
        self.port.is_enabled()
    }

    fn summary(&self) -> ModelSummary {
        let received = &self.received;
        let average_packet_latency_ns = if received.packets == 0 {
            0.0
        } else {
            convert_cycle_count(received.latency, self.gather_frequency, 1.0) as f64
                / received.packets as f64
        };
        ModelSummary {
            core_id: self.core_id,
            bytes_received: received.bytes,
            packets_received: received.packets,
            average_packet_latency_ns,
            hub: Some(self.port.hub_summary(self.num_scatter_networks)),
            power: self.power_modeling.then(|| PowerSummary {
                static_power: self.static_power(),
                dynamic_energy: self.dynamic_energy(),
            }),
            events: None,
        }
    }
}
