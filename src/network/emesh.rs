use log::{debug, info};

use crate::error::{ConfigError, NetworkError};
use crate::network::link::LinkModel;
use crate::network::packet::{Destination, Packet};
use crate::network::router::{BufferAccess, RouterGeometry, RouterModel};
use crate::network::{
    Component, CoreId, EventSummary, Hop, Hops, ModelSummary, NetworkModel, PowerSummary,
    ReceiveCounters, RoutingAction,
};
use crate::sim::config::SimulationConfig;
use crate::timeq::{convert_cycle_count, processing_time, Cycle, Frequency};

const NUM_ROUTER_PORTS: u32 = 5;
const NUM_OUTPUT_DIRECTIONS: f64 = 4.0;

struct PowerModels {
    router: RouterModel,
    link: LinkModel,
}

/// Electrical mesh without contention: a packet pays a fixed latency per XY hop.
///
/// The mesh spans the application cores only. There is no broadcast support in the network
/// itself, so a broadcast is expanded into one unicast per application core.
pub struct EMeshHopCounterModel {
    core_id: CoreId,
    total_cores: usize,
    application_cores: usize,
    mesh_width: usize,
    frequency: Frequency,
    flit_width: u32,
    hop_latency: Cycle,
    enabled: bool,
    power: Option<PowerModels>,
    events: EventSummary,
    received: ReceiveCounters,
}

impl EMeshHopCounterModel {
    pub fn new(core_id: CoreId, config: &SimulationConfig) -> Result<Self, ConfigError> {
        let general = &config.general;
        let emesh = &config.emesh;
        let application_cores = general.application_cores as usize;
        if application_cores == 0 {
            return Err(ConfigError::Invalid {
                field: "general.application_cores",
                reason: "must be > 0".to_string(),
            });
        }
        if emesh.flit_width == 0 {
            return Err(ConfigError::Invalid {
                field: "network.emesh_hop_counter.flit_width",
                reason: "must be > 0".to_string(),
            });
        }
        let mesh_width = (application_cores as f64).sqrt().floor() as usize;

        let power = if general.enable_power_modeling {
            let geometry = RouterGeometry {
                num_input_ports: NUM_ROUTER_PORTS,
                num_output_ports: NUM_ROUTER_PORTS,
                num_flits_per_port_buffer: emesh.num_flits_per_port_buffer,
                flit_width: emesh.flit_width,
            };
            Some(PowerModels {
                router: RouterModel::analytical(geometry, &config.router_model),
                link: LinkModel::create(
                    &emesh.link_type,
                    emesh.frequency,
                    emesh.link_length,
                    emesh.flit_width,
                    true,
                    &config.link_model,
                )?,
            })
        } else {
            None
        };

        let hop_latency = emesh.router_delay + emesh.link_delay;
        info!("emesh core {core_id}: {mesh_width} wide mesh, {hop_latency} cycles per hop");

        Ok(Self {
            core_id,
            total_cores: general.total_cores as usize,
            application_cores,
            mesh_width,
            frequency: emesh.frequency,
            flit_width: emesh.flit_width,
            hop_latency,
            enabled: false,
            power,
            events: EventSummary::default(),
            received: ReceiveCounters::default(),
        })
    }

    fn position(&self, core_id: CoreId) -> (usize, usize) {
        (core_id % self.mesh_width, core_id / self.mesh_width)
    }

    pub fn num_hops(&self, sender: CoreId, receiver: CoreId) -> u64 {
        let (sx, sy) = self.position(sender);
        let (dx, dy) = self.position(receiver);
        (sx.abs_diff(dx) + sy.abs_diff(dy)) as u64
    }

    pub fn events(&self) -> &EventSummary {
        &self.events
    }

    fn update_dynamic_energy(&mut self, length: u32, num_hops: u64) {
        if !self.enabled {
            return;
        }
        let num_flits = processing_time(length, self.flit_width as f64);
        let traversals = num_flits * num_hops;

        let events = &mut self.events;
        events.buffer_writes = events.buffer_writes.saturating_add(traversals);
        events.buffer_reads = events.buffer_reads.saturating_add(traversals);
        events.switch_allocator_requests = events.switch_allocator_requests.saturating_add(num_hops);
        events.crossbar_traversals = events.crossbar_traversals.saturating_add(traversals);
        events.link_traversals = events.link_traversals.saturating_add(traversals);

        if let Some(power) = &mut self.power {
            let bit_flips = self.flit_width / 2;
            power
                .router
                .update_dynamic_energy_buffer(BufferAccess::Write, bit_flips, traversals);
            power
                .router
                .update_dynamic_energy_buffer(BufferAccess::Read, bit_flips, traversals);
            power.router.update_dynamic_energy_crossbar(bit_flips, traversals);
            power.router.update_dynamic_energy_switch_allocator(1, num_hops);
            power.router.update_dynamic_energy_clock(traversals);
            power.link.update_dynamic_energy(bit_flips, traversals);
        }
    }

    fn unicast_hop(&mut self, packet: &Packet, receiver: CoreId, final_dest: Destination) -> Hop {
        let num_hops = self.num_hops(packet.sender, receiver);
        let latency = if self.enabled {
            num_hops * self.hop_latency
        } else {
            0
        };
        self.update_dynamic_energy(packet.length, num_hops);
        Hop {
            next_dest: receiver,
            final_dest,
            specific: Component::ReceiverCore,
            time: packet.time + latency,
        }
    }
}

impl NetworkModel for EMeshHopCounterModel {
    fn core_id(&self) -> CoreId {
        self.core_id
    }

    fn compute_action(&self, _packet: &Packet) -> Result<RoutingAction, NetworkError> {
        Ok(RoutingAction::Receive)
    }

    fn route_packet(&mut self, packet: &Packet) -> Result<Hops, NetworkError> {
        let hops: Hops = match packet.receiver {
            Destination::Core(receiver) => {
                if receiver >= self.total_cores {
                    return Err(NetworkError::InvalidReceiver(receiver));
                }
                std::iter::once(self.unicast_hop(packet, receiver, packet.receiver)).collect()
            }
            Destination::Broadcast => (0..self.application_cores)
                .map(|core| self.unicast_hop(packet, core, Destination::Broadcast))
                .collect(),
        };
        debug!(
            "emesh core {}: packet from {} routed to {} receivers",
            self.core_id,
            packet.sender,
            hops.len()
        );
        Ok(hops)
    }

    fn process_received_packet(&mut self, packet: &mut Packet) -> Result<(), NetworkError> {
        if !self.enabled {
            return Ok(());
        }
        self.received
            .record(packet.length, packet.time.saturating_sub(packet.start_time));
        Ok(())
    }

    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn summary(&self) -> ModelSummary {
        let received = &self.received;
        let average_packet_latency_ns = if received.packets == 0 {
            0.0
        } else {
            convert_cycle_count(received.latency, self.frequency, 1.0) as f64
                / received.packets as f64
        };
        // router plus its four outgoing links
        let power = self.power.as_ref().map(|power| PowerSummary {
            static_power: power.router.total_static_power()
                + power.link.static_power() * NUM_OUTPUT_DIRECTIONS,
            dynamic_energy: power.router.total_dynamic_energy() + power.link.dynamic_energy(),
        });
        ModelSummary {
            core_id: self.core_id,
            bytes_received: received.bytes,
            packets_received: received.packets,
            average_packet_latency_ns,
            hub: None,
            power,
            events: Some(self.events),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::PacketType;

    const CONFIG: &str = r#"
        [general]
        total_cores = 20
        application_cores = 16
        network_model = "emesh_hop_counter"

        [network.emesh_hop_counter]
        flit_width = 32
        link_delay = 1
        router_delay = 2

        [link_model.electrical_repeated.delay]
        delay_per_mm = 1.0
        tx_delay = 0
        rx_delay = 0

        [link_model.electrical_repeated.power]
        static_power_per_mm = 0.1
        fixed_power = 0.05
        dynamic_energy_per_bit_flip_per_mm = 0.01
    "#;

    fn config() -> SimulationConfig {
        let table: toml::Table = toml::from_str(CONFIG).unwrap();
        SimulationConfig::from_table(&table).unwrap()
    }

    fn model(core_id: CoreId, config: &SimulationConfig) -> EMeshHopCounterModel {
        let mut model = EMeshHopCounterModel::new(core_id, config).unwrap();
        model.enable();
        model
    }

    #[test]
    fn latency_is_xy_distance_times_hop_latency() {
        let mut model = model(0, &config());
        // core 15 sits at (3, 3) in a 4 wide mesh
        let packet = Packet::new(0, Destination::Core(15), PacketType::User, 8, 10);
        let hops = model.route_packet(&packet).unwrap();
        assert_eq!(6, model.num_hops(0, 15));
        assert_eq!(10 + 6 * 3, hops[0].time);
        assert_eq!(RoutingAction::Receive, model.compute_action(&packet).unwrap());

        // 8 bytes over 32 bit flits: 2 flits per hop
        let events = model.events();
        assert_eq!(12, events.buffer_writes);
        assert_eq!(12, events.link_traversals);
        assert_eq!(6, events.switch_allocator_requests);
    }

    #[test]
    fn disabled_model_counts_nothing() {
        let mut model = EMeshHopCounterModel::new(0, &config()).unwrap();
        let mut packet = Packet::new(0, Destination::Core(15), PacketType::User, 8, 10);
        let hops = model.route_packet(&packet).unwrap();
        assert_eq!(10, hops[0].time);
        assert_eq!(0, model.events().buffer_writes);
        packet.time = 40;
        model.process_received_packet(&mut packet).unwrap();
        assert_eq!(0, model.summary().packets_received);
    }

    #[test]
    fn broadcast_expands_to_application_cores() {
        let mut model = model(5, &config());
        let packet = Packet::new(5, Destination::Broadcast, PacketType::User, 8, 0);
        let hops = model.route_packet(&packet).unwrap();
        assert_eq!(16, hops.len());
        assert!(hops.iter().all(|hop| hop.final_dest == Destination::Broadcast));
        assert_eq!(0, hops[5].time);
    }

    #[test]
    fn power_summary_covers_router_and_four_links() {
        let mut config = config();
        config.general.enable_power_modeling = true;
        let mut model = model(0, &config);
        assert!(model.summary().power.unwrap().static_power > 0.0);
        model
            .route_packet(&Packet::new(0, Destination::Core(1), PacketType::User, 8, 0))
            .unwrap();
        let power = model.summary().power.unwrap();
        assert!(power.dynamic_energy > 0.0);
        assert!(model.summary().events.is_some());
    }
}
