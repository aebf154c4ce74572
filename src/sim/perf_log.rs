use std::env;
use std::fs;
use std::io;
use std::ops::AddAssign;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::network::ModelSummary;
use crate::timeq::Cycle;

static PERF_RUN_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Per-run output directory under `$ANETSIM_PERF_LOG_DIR`, created on first use.
/// `None` when the variable is unset or the directory cannot be created.
pub fn perf_run_dir() -> Option<PathBuf> {
    PERF_RUN_DIR.get_or_init(create_run_dir).clone()
}

fn create_run_dir() -> Option<PathBuf> {
    let root = env::var("ANETSIM_PERF_LOG_DIR").ok().map(PathBuf::from)?;
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let pid = std::process::id();
    let run_dir = root.join(format!("run_{ts}_{pid}"));
    fs::create_dir_all(&run_dir).ok()?;
    Some(run_dir)
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub network_model: String,
    // cycle at which the last measured packet was delivered
    pub completion_time: Cycle,
    pub per_core: Vec<ModelSummary>,
    pub total: AggregateSummary,
}

impl RunSummary {
    pub fn new(network_model: &str, completion_time: Cycle, per_core: Vec<ModelSummary>) -> Self {
        Self {
            network_model: network_model.to_string(),
            completion_time,
            total: aggregate_summaries(&per_core),
            per_core,
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct AggregateSummary {
    pub num_cores: usize,
    pub bytes_received: u64,
    pub packets_received: u64,
    // weighted by packets received per core
    pub average_packet_latency_ns: f64,
    pub static_power: Option<f64>,
    pub dynamic_energy: Option<f64>,
}

impl AddAssign<&ModelSummary> for AggregateSummary {
    fn add_assign(&mut self, core: &ModelSummary) {
        let packets = self.packets_received.saturating_add(core.packets_received);
        if packets > 0 {
            self.average_packet_latency_ns = (self.average_packet_latency_ns
                * self.packets_received as f64
                + core.average_packet_latency_ns * core.packets_received as f64)
                / packets as f64;
        }
        self.packets_received = packets;
        self.bytes_received = self.bytes_received.saturating_add(core.bytes_received);
        if let Some(power) = &core.power {
            *self.static_power.get_or_insert(0.0) += power.static_power;
            *self.dynamic_energy.get_or_insert(0.0) += power.dynamic_energy;
        }
    }
}

pub fn aggregate_summaries(per_core: &[ModelSummary]) -> AggregateSummary {
    let mut total = AggregateSummary {
        num_cores: per_core.len(),
        ..AggregateSummary::default()
    };
    for core in per_core {
        total += core;
    }
    total
}

pub fn write_summary(path: &Path, summary: &RunSummary) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let payload = serde_json::to_string_pretty(summary)?;
    fs::write(path, payload)
}
