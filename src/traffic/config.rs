use std::str::FromStr;

use serde::Deserialize;

use crate::sim::config::Config;
use crate::timeq::Cycle;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrafficPattern {
    #[default]
    UniformRandom,
    Neighbor,
    Broadcast,
    SelfSend,
    Hotspot,
}

impl FromStr for TrafficPattern {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "uniform_random" => Ok(Self::UniformRandom),
            "neighbor" => Ok(Self::Neighbor),
            "broadcast" => Ok(Self::Broadcast),
            "self_send" => Ok(Self::SelfSend),
            "hotspot" => Ok(Self::Hotspot),
            _ => Err(format!(
                "unsupported traffic pattern '{}', expected one of: uniform_random, neighbor, broadcast, self_send, hotspot",
                value
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TrafficConfig {
    pub pattern: TrafficPattern,
    // packets injected per application core
    pub num_packets: u32,
    pub packet_bytes: u32,
    pub injection_interval: Cycle,
    pub seed: u64,
    // packets per core routed with the models disabled before counting starts
    pub warmup_packets: u32,
    // share of packets sent as shared-memory traffic on behalf of another core
    pub shmem_fraction: f64,
    pub hotspot_core: u32,
}

impl Config for TrafficConfig {
    const SECTION: &'static str = "traffic";
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            pattern: TrafficPattern::UniformRandom,
            num_packets: 64,
            packet_bytes: 64,
            injection_interval: 10,
            seed: 0,
            warmup_packets: 0,
            shmem_fraction: 0.0,
            hotspot_core: 0,
        }
    }
}
