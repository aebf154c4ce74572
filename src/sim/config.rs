use std::str::FromStr;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::{Table, Value};

use crate::error::ConfigError;
use crate::timeq::{Cycle, Frequency};
use crate::traffic::config::TrafficConfig;

/// Optional config section. Absent sections fall back to defaults.
pub trait Config: DeserializeOwned + Default {
    const SECTION: &'static str;

    fn from_section(section: Option<&Value>) -> Result<Self, ConfigError> {
        match section {
            Some(value) => value.clone().try_into().map_err(|source| ConfigError::Parse {
                section: Self::SECTION,
                source,
            }),
            None => {
                warn!("config section [{}] not found, using defaults", Self::SECTION);
                Ok(Self::default())
            }
        }
    }

    fn from_table(table: &Table) -> Result<Self, ConfigError> {
        Self::from_section(lookup(table, Self::SECTION))
    }
}

/// Config section without usable defaults. A missing section stops construction.
pub trait RequiredConfig: DeserializeOwned {
    const SECTION: &'static str;

    fn from_section(section: Option<&Value>) -> Result<Self, ConfigError> {
        let value = section.ok_or(ConfigError::MissingSection(Self::SECTION))?;
        value.clone().try_into().map_err(|source| ConfigError::Parse {
            section: Self::SECTION,
            source,
        })
    }

    fn from_table(table: &Table) -> Result<Self, ConfigError> {
        Self::from_section(lookup(table, Self::SECTION))
    }
}

/// Resolves a dotted section path such as `network.anet` inside a parsed TOML table.
pub fn lookup<'a>(table: &'a Table, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = table.get(parts.next()?)?;
    for part in parts {
        current = current.as_table()?.get(part)?;
    }
    Some(current)
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkModelKind {
    #[default]
    AnetCluster,
    EmeshHopCounter,
}

impl NetworkModelKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::AnetCluster => "anet_cluster",
            Self::EmeshHopCounter => "emesh_hop_counter",
        }
    }
}

impl FromStr for NetworkModelKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "anet_cluster" => Ok(Self::AnetCluster),
            "emesh_hop_counter" => Ok(Self::EmeshHopCounter),
            _ => Err(ConfigError::UnknownNetworkModel(value.to_string())),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub total_cores: u32,
    pub application_cores: u32,
    pub process_count: u32,
    pub enable_power_modeling: bool,
    pub network_model: NetworkModelKind,
}

impl Config for GeneralConfig {
    const SECTION: &'static str = "general";
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            total_cores: 20,
            application_cores: 20,
            process_count: 1,
            enable_power_modeling: false,
            network_model: NetworkModelKind::AnetCluster,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnetConfig {
    pub cluster_size: u32,
    #[serde(default = "default_num_scatter_networks")]
    pub num_scatter_networks_per_cluster: u32,
    #[serde(default)]
    pub packet_header_bytes: u32,
    // Flits charged to the scatter network per packet. Defaults to the cluster size, which
    // stands in for the fan-out of the broadcast tree.
    #[serde(default)]
    pub scatter_energy_fanout: Option<u32>,
    pub gather: GatherNetworkConfig,
    pub optical: OpticalNetworkConfig,
    pub scatter: ScatterNetworkConfig,
    #[serde(default)]
    pub queue_model: HubQueueConfig,
}

impl RequiredConfig for AnetConfig {
    const SECTION: &'static str = "network.anet";
}

fn default_num_scatter_networks() -> u32 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatherNetworkConfig {
    pub frequency: Frequency,
    pub link_width: u32,
    pub link_length: f64,
    pub link_type: String,
    pub num_hops_to_hub: u32,
    pub router_delay: Cycle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpticalNetworkConfig {
    pub frequency: Frequency,
    pub link_width: u32,
    pub link_length: f64,
    #[serde(default = "default_optical_link_type")]
    pub link_type: String,
}

fn default_optical_link_type() -> String {
    "optical".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScatterNetworkConfig {
    pub frequency: Frequency,
    pub link_width: u32,
    pub link_length: f64,
    pub link_type: String,
    // in scatter network cycles
    pub network_delay: Cycle,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HubQueueConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for HubQueueConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: "history_list".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EMeshConfig {
    pub frequency: Frequency,
    pub flit_width: u32,
    pub link_type: String,
    pub link_length: f64,
    pub link_delay: Cycle,
    pub router_delay: Cycle,
    pub num_flits_per_port_buffer: u32,
}

impl Config for EMeshConfig {
    const SECTION: &'static str = "network.emesh_hop_counter";
}

impl Default for EMeshConfig {
    fn default() -> Self {
        Self {
            frequency: 1.0,
            flit_width: 64,
            link_type: "electrical_repeated".to_string(),
            link_length: 1.0,
            link_delay: 1,
            router_delay: 1,
            num_flits_per_port_buffer: 4,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct LinkModelConfig {
    pub electrical_repeated: Option<RepeatedLinkParams>,
    pub electrical_equalized: Option<EqualizedLinkParams>,
    pub optical: Option<OpticalLinkParams>,
}

impl Config for LinkModelConfig {
    const SECTION: &'static str = "link_model";
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepeatedLinkParams {
    pub delay: RepeatedDelayParams,
    #[serde(default)]
    pub power: Option<ElectricalPowerParams>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RepeatedDelayParams {
    // ns per mm
    pub delay_per_mm: f64,
    pub tx_delay: Cycle,
    pub rx_delay: Cycle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EqualizedLinkParams {
    pub delay: EqualizedDelayParams,
    #[serde(default)]
    pub power: Option<ElectricalPowerParams>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EqualizedDelayParams {
    // ns per mm
    pub delay_per_mm: f64,
    pub tx_pipeline_delay: Cycle,
    pub rx_pipeline_delay: Cycle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElectricalPowerParams {
    pub static_power_per_mm: f64,
    pub fixed_power: f64,
    pub dynamic_energy_per_bit_flip_per_mm: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpticalLinkParams {
    pub num_receiver_endpoints: u32,
    pub delay: OpticalDelayParams,
    #[serde(default)]
    pub power: Option<OpticalPowerParams>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpticalDelayParams {
    // ns per mm
    pub waveguide_delay_per_mm: f64,
    pub e_o_conversion: Cycle,
    pub o_e_conversion: Cycle,
    #[serde(default)]
    pub wdm_hops: Cycle,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpticalPowerParams {
    pub laser_power: f64,
    pub ring_tuning_power: f64,
    pub electrical_tx_static_power: f64,
    pub electrical_rx_static_power: f64,
    pub clock_power_tx: f64,
    pub clock_power_rx: f64,
    pub electrical_tx_dynamic_energy: f64,
    pub electrical_rx_dynamic_energy: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RouterPowerConfig {
    pub buffer_read_energy_per_bit: f64,
    pub buffer_write_energy_per_bit: f64,
    pub crossbar_energy_per_bit: f64,
    pub switch_allocator_energy_per_request: f64,
    pub clock_energy_per_flit: f64,
    pub buffer_static_power_per_bit: f64,
    pub crossbar_static_power_per_port: f64,
    pub switch_allocator_static_power_per_port: f64,
    pub clock_static_power: f64,
}

impl Config for RouterPowerConfig {
    const SECTION: &'static str = "router_model";
}

impl Default for RouterPowerConfig {
    fn default() -> Self {
        Self {
            buffer_read_energy_per_bit: 1.2e-14,
            buffer_write_energy_per_bit: 1.5e-14,
            crossbar_energy_per_bit: 2.0e-14,
            switch_allocator_energy_per_request: 1.0e-13,
            clock_energy_per_flit: 5.0e-14,
            buffer_static_power_per_bit: 2.0e-7,
            crossbar_static_power_per_port: 1.0e-4,
            switch_allocator_static_power_per_port: 2.0e-5,
            clock_static_power: 5.0e-4,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct QueueModelConfig {
    pub history_list: HistoryListConfig,
    pub fixed: FixedQueueConfig,
}

impl Config for QueueModelConfig {
    const SECTION: &'static str = "queue_model";
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct HistoryListConfig {
    pub max_list_size: usize,
    pub analytical_model_enabled: bool,
    pub interleaving_enabled: bool,
}

impl Default for HistoryListConfig {
    fn default() -> Self {
        Self {
            max_list_size: 100,
            analytical_model_enabled: true,
            interleaving_enabled: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default)]
#[serde(default)]
pub struct FixedQueueConfig {
    pub delay: Cycle,
}

/// Every section the simulator reads, loaded and checked in one pass.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub general: GeneralConfig,
    pub anet: Option<AnetConfig>,
    pub emesh: EMeshConfig,
    pub link_model: LinkModelConfig,
    pub router_model: RouterPowerConfig,
    pub queue_model: QueueModelConfig,
    pub traffic: TrafficConfig,
}

impl SimulationConfig {
    pub fn from_table(table: &Table) -> Result<Self, ConfigError> {
        let general = GeneralConfig::from_table(table)?;
        let anet = match general.network_model {
            NetworkModelKind::AnetCluster => Some(AnetConfig::from_table(table)?),
            NetworkModelKind::EmeshHopCounter => None,
        };
        let config = Self {
            general,
            anet,
            emesh: EMeshConfig::from_table(table)?,
            link_model: LinkModelConfig::from_table(table)?,
            router_model: RouterPowerConfig::from_table(table)?,
            queue_model: QueueModelConfig::from_table(table)?,
            traffic: TrafficConfig::from_table(table)?,
        };
        config.check_general()?;
        Ok(config)
    }

    fn check_general(&self) -> Result<(), ConfigError> {
        let general = &self.general;
        if general.total_cores == 0 {
            return Err(ConfigError::Invalid {
                field: "general.total_cores",
                reason: "must be > 0".to_string(),
            });
        }
        if general.application_cores > general.total_cores {
            return Err(ConfigError::Invalid {
                field: "general.application_cores",
                reason: format!(
                    "{} exceeds total cores ({})",
                    general.application_cores, general.total_cores
                ),
            });
        }
        if general.process_count == 0 {
            return Err(ConfigError::Invalid {
                field: "general.process_count",
                reason: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}
