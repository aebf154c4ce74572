pub mod anet;
pub mod emesh;
pub mod hub;
pub mod link;
pub mod packet;
pub mod queue;
pub mod registry;
pub mod router;
pub mod topology;

use std::io::{self, Write};

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::NetworkError;
use crate::timeq::Cycle;

pub use anet::AnetClusterModel;
pub use emesh::EMeshHopCounterModel;
pub use hub::{HubPort, HubRole, OpticalHub};
pub use link::{LinkKind, LinkModel};
pub use packet::{
    shmem_header, Destination, Packet, PacketType, RequesterResolver, SenderIsRequester,
    ShmemHeaderResolver,
};
pub use queue::QueueModel;
pub use registry::{ClusterRegistry, HubDirectory};
pub use router::{BufferAccess, RouterModel, RouterPowerOracle};
pub use topology::TopologyConfig;

pub type CoreId = usize;

/// Stage of the hybrid path a packet currently occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Component {
    SenderHub,
    ReceiverHub,
    SenderCore,
    ReceiverCore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingAction {
    Forward,
    Receive,
}

/// One resolved leg of a packet's path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    pub next_dest: CoreId,
    pub final_dest: Destination,
    pub specific: Component,
    pub time: Cycle,
}

// Unicast routing yields a single hop; only broadcasts spill to the heap.
pub type Hops = SmallVec<[Hop; 2]>;

/// Whether one process sees every core's model or each process only sees its own cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    Single,
    Multi,
}

impl ProcessMode {
    pub fn from_process_count(process_count: u32) -> Self {
        if process_count <= 1 {
            Self::Single
        } else {
            Self::Multi
        }
    }
}

/// Per-core summary record, serialized into the run summary.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModelSummary {
    pub core_id: CoreId,
    pub bytes_received: u64,
    pub packets_received: u64,
    // gather-network cycles converted to ns
    pub average_packet_latency_ns: f64,
    pub hub: Option<HubSummary>,
    pub power: Option<PowerSummary>,
    pub events: Option<EventSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct HubSummary {
    // `None` when the core carries no hub or queueing is disabled
    pub sender_contention_delay_ns: Option<f64>,
    pub receiver_contention_delay_ns: Vec<Option<f64>>,
    pub sender_utilization: Option<f64>,
    pub receiver_utilization: Vec<Option<f64>>,
    // share of hub bookings estimated analytically rather than placed in the history
    pub analytical_fraction: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PowerSummary {
    pub static_power: f64,
    pub dynamic_energy: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EventSummary {
    pub buffer_writes: u64,
    pub buffer_reads: u64,
    pub switch_allocator_requests: u64,
    pub crossbar_traversals: u64,
    pub link_traversals: u64,
}

/// Interface the enclosing router drives, one instance per core.
pub trait NetworkModel: Send {
    fn core_id(&self) -> CoreId;

    fn compute_action(&self, packet: &Packet) -> Result<RoutingAction, NetworkError>;

    fn route_packet(&mut self, packet: &Packet) -> Result<Hops, NetworkError>;

    fn process_received_packet(&mut self, packet: &mut Packet) -> Result<(), NetworkError>;

    fn enable(&mut self);

    fn disable(&mut self);

    fn is_enabled(&self) -> bool;

    fn summary(&self) -> ModelSummary;

    fn output_summary(&self, out: &mut dyn Write) -> io::Result<()> {
        write_summary(&self.summary(), out)
    }
}

fn fmt_na(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| v.to_string())
}

pub fn write_summary(summary: &ModelSummary, out: &mut dyn Write) -> io::Result<()> {
    writeln!(out, "    bytes received: {}", summary.bytes_received)?;
    writeln!(out, "    packets received: {}", summary.packets_received)?;
    writeln!(
        out,
        "    average packet latency (in ns): {}",
        summary.average_packet_latency_ns
    )?;
    if let Some(hub) = &summary.hub {
        writeln!(out, "  ATAC Cluster:")?;
        writeln!(
            out,
            "    Sender Hub Contention Delay (in ns): {}",
            fmt_na(hub.sender_contention_delay_ns)
        )?;
        for (i, delay) in hub.receiver_contention_delay_ns.iter().enumerate() {
            writeln!(
                out,
                "    Receiver Hub ({}) Contention Delay (in ns): {}",
                i,
                fmt_na(*delay)
            )?;
        }
        writeln!(
            out,
            "    Sender Hub Utilization: {}",
            fmt_na(hub.sender_utilization)
        )?;
        for (i, utilization) in hub.receiver_utilization.iter().enumerate() {
            writeln!(
                out,
                "    Receiver Hub ({}) Utilization: {}",
                i,
                fmt_na(*utilization)
            )?;
        }
        writeln!(
            out,
            "    Analytical Model Used (in %): {}",
            fmt_na(hub.analytical_fraction.map(|fraction| fraction * 100.0))
        )?;
    }
    if let Some(power) = &summary.power {
        writeln!(out, "    Static Power: {}", power.static_power)?;
        writeln!(out, "    Dynamic Energy: {}", power.dynamic_energy)?;
    }
    if let Some(events) = &summary.events {
        writeln!(out, "    Event Counters:")?;
        writeln!(out, "      Buffer Writes: {}", events.buffer_writes)?;
        writeln!(out, "      Buffer Reads: {}", events.buffer_reads)?;
        writeln!(
            out,
            "      Switch Allocator Traversals: {}",
            events.switch_allocator_requests
        )?;
        writeln!(out, "      Crossbar Traversals: {}", events.crossbar_traversals)?;
        writeln!(out, "      Link Traversals: {}", events.link_traversals)?;
    }
    Ok(())
}

/// Running totals of everything delivered to a core.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiveCounters {
    pub bytes: u64,
    pub packets: u64,
    pub latency: Cycle,
}

impl ReceiveCounters {
    pub fn record(&mut self, bytes: u32, latency: Cycle) {
        self.packets = self.packets.saturating_add(1);
        self.bytes = self.bytes.saturating_add(bytes as u64);
        self.latency = self.latency.saturating_add(latency);
    }
}
