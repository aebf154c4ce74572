use crate::network::packet::{shmem_header, Destination, Packet, PacketType};
use crate::network::CoreId;
use crate::timeq::Cycle;
use crate::traffic::config::{TrafficConfig, TrafficPattern};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Synthetic packet source shared by every application core.
///
/// Packet `i` of every core is injected at `start + i * injection_interval`, so all cores
/// inject in lock step. The stream is fully determined by the seed.
#[derive(Debug)]
pub struct TrafficGenerator {
    pattern: TrafficPattern,
    packet_bytes: u32,
    injection_interval: Cycle,
    shmem_fraction: f64,
    hotspot_core: CoreId,
    application_cores: usize,
    rng: StdRng,
}

impl TrafficGenerator {
    pub fn new(config: &TrafficConfig, application_cores: usize) -> Self {
        Self {
            pattern: config.pattern,
            packet_bytes: config.packet_bytes,
            injection_interval: config.injection_interval,
            shmem_fraction: config.shmem_fraction.clamp(0.0, 1.0),
            hotspot_core: config.hotspot_core as CoreId,
            application_cores: application_cores.max(1),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn pattern(&self) -> TrafficPattern {
        self.pattern
    }

    fn receiver(&mut self, sender: CoreId) -> Destination {
        match self.pattern {
            TrafficPattern::UniformRandom => {
                Destination::Core(self.rng.gen_range(0..self.application_cores))
            }
            TrafficPattern::Neighbor => Destination::Core((sender + 1) % self.application_cores),
            TrafficPattern::Broadcast => Destination::Broadcast,
            TrafficPattern::SelfSend => Destination::Core(sender),
            TrafficPattern::Hotspot => Destination::Core(self.hotspot_core),
        }
    }

    /// Builds one packet from `sender`, injected at `time`.
    pub fn packet(&mut self, sender: CoreId, time: Cycle) -> Packet {
        let receiver = self.receiver(sender);
        if self.shmem_fraction > 0.0 && self.rng.gen_bool(self.shmem_fraction) {
            let requester = self.rng.gen_range(0..self.application_cores);
            Packet::new(sender, receiver, PacketType::SharedMem1, self.packet_bytes, time)
                .with_data(shmem_header(requester))
        } else {
            Packet::new(sender, receiver, PacketType::User, self.packet_bytes, time)
        }
    }

    /// `count` rounds of packets from every application core, starting at `start`.
    pub fn generate(&mut self, count: u32, start: Cycle) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(count as usize * self.application_cores);
        for round in 0..count as Cycle {
            let time = start + round * self.injection_interval;
            for sender in 0..self.application_cores {
                packets.push(self.packet(sender, time));
            }
        }
        packets
    }

    /// Injection time one interval past the last round of `count` rounds.
    pub fn end_of(&self, count: u32, start: Cycle) -> Cycle {
        start + count as Cycle * self.injection_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::packet::{RequesterResolver, ShmemHeaderResolver};

    fn config(pattern: TrafficPattern) -> TrafficConfig {
        TrafficConfig {
            pattern,
            num_packets: 4,
            packet_bytes: 16,
            injection_interval: 5,
            seed: 7,
            ..TrafficConfig::default()
        }
    }

    #[test]
    fn rounds_are_injected_in_lock_step() {
        let mut traffic = TrafficGenerator::new(&config(TrafficPattern::Neighbor), 4);
        let packets = traffic.generate(3, 100);
        assert_eq!(12, packets.len());
        assert_eq!(100, packets[0].time);
        assert_eq!(105, packets[4].time);
        assert_eq!(110, packets[11].start_time);
        // the last core wraps around to core 0
        assert_eq!(Destination::Core(0), packets[3].receiver);
        assert_eq!(Destination::Core(2), packets[1].receiver);
        assert_eq!(115, traffic.end_of(3, 100));
    }

    #[test]
    fn fixed_patterns() {
        let mut traffic = TrafficGenerator::new(&config(TrafficPattern::SelfSend), 4);
        assert!(traffic
            .generate(2, 0)
            .iter()
            .all(|p| p.receiver == Destination::Core(p.sender)));

        let mut hotspot = config(TrafficPattern::Hotspot);
        hotspot.hotspot_core = 3;
        let mut traffic = TrafficGenerator::new(&hotspot, 4);
        assert!(traffic
            .generate(2, 0)
            .iter()
            .all(|p| p.receiver == Destination::Core(3)));

        let mut traffic = TrafficGenerator::new(&config(TrafficPattern::Broadcast), 4);
        assert!(traffic.generate(1, 0).iter().all(|p| p.receiver.is_broadcast()));
    }

    #[test]
    fn uniform_random_is_reproducible_and_in_range() {
        let receivers = |seed| {
            let mut config = config(TrafficPattern::UniformRandom);
            config.seed = seed;
            TrafficGenerator::new(&config, 16)
                .generate(8, 0)
                .into_iter()
                .map(|p| p.receiver)
                .collect::<Vec<_>>()
        };
        let first = receivers(7);
        assert_eq!(first, receivers(7));
        assert!(first
            .iter()
            .all(|r| matches!(r, Destination::Core(id) if *id < 16)));
    }

    #[test]
    fn shared_memory_packets_carry_a_requester() {
        let mut config = config(TrafficPattern::Neighbor);
        config.shmem_fraction = 1.0;
        let mut traffic = TrafficGenerator::new(&config, 4);
        for packet in traffic.generate(4, 0) {
            assert_eq!(PacketType::SharedMem1, packet.packet_type);
            assert!(ShmemHeaderResolver.shmem_requester(&packet) < 4);
        }

        config.shmem_fraction = 0.0;
        let mut traffic = TrafficGenerator::new(&config, 4);
        assert!(traffic
            .generate(4, 0)
            .iter()
            .all(|p| p.packet_type == PacketType::User && p.data.is_empty()));
    }
}
