use log::debug;
use phf::phf_map;

use crate::error::ConfigError;
use crate::sim::config::{LinkModelConfig, OpticalPowerParams};
use crate::timeq::{Cycle, Frequency};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    ElectricalRepeated,
    ElectricalEqualized,
    Optical,
}

static LINK_KINDS: phf::Map<&'static str, LinkKind> = phf_map! {
    "electrical_repeated" => LinkKind::ElectricalRepeated,
    "electrical_equalized" => LinkKind::ElectricalEqualized,
    "optical" => LinkKind::Optical,
};

impl LinkKind {
    pub fn parse(type_str: &str) -> Result<Self, ConfigError> {
        LINK_KINDS
            .get(type_str)
            .copied()
            .ok_or_else(|| ConfigError::UnknownLinkType(type_str.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ElectricalRepeated => "electrical_repeated",
            Self::ElectricalEqualized => "electrical_equalized",
            Self::Optical => "optical",
        }
    }
}

#[derive(Debug, Clone)]
enum LinkEnergy {
    // power modeling off: only the delay is modeled
    Untracked,
    Electrical {
        energy_per_bit_flip_per_mm: f64,
    },
    Optical {
        tx_energy: f64,
        rx_energy: f64,
        num_receivers: u32,
    },
}

/// A point-to-point link of a given kind, length (mm) and width (bits).
///
/// Delay and static power are fixed when the link is built; dynamic energy accumulates
/// with every [`LinkModel::update_dynamic_energy`] call and is never reset.
#[derive(Debug, Clone)]
pub struct LinkModel {
    length: f64,
    width: u32,
    delay: Cycle,
    static_power: f64,
    energy: LinkEnergy,
    total_dynamic_energy: f64,
}

impl LinkModel {
    pub fn create(
        type_str: &str,
        frequency: Frequency,
        length: f64,
        width: u32,
        use_detailed_power_model: bool,
        params: &LinkModelConfig,
    ) -> Result<Self, ConfigError> {
        let kind = LinkKind::parse(type_str)?;
        if frequency.is_nan() || frequency <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "link.frequency",
                reason: format!("{frequency} GHz must be positive"),
            });
        }
        if width == 0 {
            return Err(ConfigError::Invalid {
                field: "link.width",
                reason: "must be > 0".to_string(),
            });
        }

        let (delay, static_power, energy) = match kind {
            LinkKind::ElectricalRepeated => {
                let p = params
                    .electrical_repeated
                    .as_ref()
                    .ok_or(ConfigError::MissingLinkParams(kind.name()))?;
                let delay = wire_delay(p.delay.delay_per_mm, length, frequency)
                    + p.delay.tx_delay
                    + p.delay.rx_delay;
                let (static_power, energy) = if use_detailed_power_model {
                    let power = p
                        .power
                        .as_ref()
                        .ok_or(ConfigError::MissingLinkPowerParams(kind.name()))?;
                    (
                        width as f64 * (power.static_power_per_mm * length + power.fixed_power),
                        LinkEnergy::Electrical {
                            energy_per_bit_flip_per_mm: power.dynamic_energy_per_bit_flip_per_mm,
                        },
                    )
                } else {
                    (0.0, LinkEnergy::Untracked)
                };
                (delay, static_power, energy)
            }
            LinkKind::ElectricalEqualized => {
                let p = params
                    .electrical_equalized
                    .as_ref()
                    .ok_or(ConfigError::MissingLinkParams(kind.name()))?;
                // the equalizer adds pipeline stages on both ends of the wire
                let delay = wire_delay(p.delay.delay_per_mm, length, frequency)
                    + p.delay.tx_pipeline_delay
                    + p.delay.rx_pipeline_delay;
                let (static_power, energy) = if use_detailed_power_model {
                    let power = p
                        .power
                        .as_ref()
                        .ok_or(ConfigError::MissingLinkPowerParams(kind.name()))?;
                    (
                        width as f64 * (power.static_power_per_mm * length + power.fixed_power),
                        LinkEnergy::Electrical {
                            energy_per_bit_flip_per_mm: power.dynamic_energy_per_bit_flip_per_mm,
                        },
                    )
                } else {
                    (0.0, LinkEnergy::Untracked)
                };
                (delay, static_power, energy)
            }
            LinkKind::Optical => {
                let p = params
                    .optical
                    .as_ref()
                    .ok_or(ConfigError::MissingLinkParams(kind.name()))?;
                let delay = (p.delay.waveguide_delay_per_mm * length * frequency
                    + p.delay.e_o_conversion as f64
                    + p.delay.o_e_conversion as f64)
                    .ceil() as Cycle
                    + p.delay.wdm_hops;
                let (static_power, energy) = if use_detailed_power_model {
                    let power = p
                        .power
                        .as_ref()
                        .ok_or(ConfigError::MissingLinkPowerParams(kind.name()))?;
                    (
                        optical_static_power(power, p.num_receiver_endpoints, width),
                        LinkEnergy::Optical {
                            tx_energy: power.electrical_tx_dynamic_energy,
                            rx_energy: power.electrical_rx_dynamic_energy,
                            num_receivers: p.num_receiver_endpoints,
                        },
                    )
                } else {
                    (0.0, LinkEnergy::Untracked)
                };
                (delay, static_power, energy)
            }
        };

        debug!(
            "{} link: {} GHz, {} mm, {} bits -> delay {} cycles",
            kind.name(),
            frequency,
            length,
            width,
            delay
        );

        Ok(Self {
            length,
            width,
            delay,
            static_power,
            energy,
            total_dynamic_energy: 0.0,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    /// Cycles, in this link's clock, to traverse the link once.
    pub fn delay(&self) -> Cycle {
        self.delay
    }

    pub fn static_power(&self) -> f64 {
        self.static_power
    }

    pub fn dynamic_energy(&self) -> f64 {
        self.total_dynamic_energy
    }

    pub fn update_dynamic_energy(&mut self, num_bit_flips: u32, num_flits: u64) {
        let activity = num_flits as f64 * num_bit_flips as f64;
        match self.energy {
            LinkEnergy::Untracked => {}
            LinkEnergy::Electrical {
                energy_per_bit_flip_per_mm,
            } => {
                self.total_dynamic_energy += activity * energy_per_bit_flip_per_mm * self.length;
            }
            LinkEnergy::Optical {
                tx_energy,
                rx_energy,
                num_receivers,
            } => {
                self.total_dynamic_energy +=
                    activity * (tx_energy + rx_energy * num_receivers as f64);
            }
        }
    }
}

fn wire_delay(delay_per_mm: f64, length: f64, frequency: Frequency) -> Cycle {
    (delay_per_mm * length * frequency).ceil() as Cycle
}

fn optical_static_power(power: &OpticalPowerParams, num_receivers: u32, width: u32) -> f64 {
    let sender = power.laser_power
        + power.ring_tuning_power
        + power.electrical_tx_static_power
        + power.clock_power_tx;
    let receiver =
        power.ring_tuning_power + power.electrical_rx_static_power + power.clock_power_rx;
    width as f64 * (sender + num_receivers as f64 * receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::config::{
        ElectricalPowerParams, EqualizedDelayParams, EqualizedLinkParams, OpticalDelayParams,
        OpticalLinkParams, RepeatedDelayParams, RepeatedLinkParams,
    };

    fn params() -> LinkModelConfig {
        LinkModelConfig {
            electrical_repeated: Some(RepeatedLinkParams {
                delay: RepeatedDelayParams {
                    delay_per_mm: 0.5,
                    tx_delay: 1,
                    rx_delay: 1,
                },
                power: Some(ElectricalPowerParams {
                    static_power_per_mm: 1.0,
                    fixed_power: 0.5,
                    dynamic_energy_per_bit_flip_per_mm: 0.25,
                }),
            }),
            electrical_equalized: Some(EqualizedLinkParams {
                delay: EqualizedDelayParams {
                    delay_per_mm: 0.1,
                    tx_pipeline_delay: 2,
                    rx_pipeline_delay: 1,
                },
                power: None,
            }),
            optical: Some(OpticalLinkParams {
                num_receiver_endpoints: 3,
                delay: OpticalDelayParams {
                    waveguide_delay_per_mm: 0.01,
                    e_o_conversion: 1,
                    o_e_conversion: 1,
                    wdm_hops: 0,
                },
                power: Some(OpticalPowerParams {
                    laser_power: 1.0,
                    ring_tuning_power: 0.5,
                    electrical_tx_static_power: 0.25,
                    electrical_rx_static_power: 0.25,
                    clock_power_tx: 0.0,
                    clock_power_rx: 0.0,
                    electrical_tx_dynamic_energy: 2.0,
                    electrical_rx_dynamic_energy: 1.0,
                }),
            }),
        }
    }

    #[test]
    fn repeated_delay_power_and_energy() {
        let mut link = LinkModel::create("electrical_repeated", 2.0, 1.5, 8, true, &params()).unwrap();
        // ceil(0.5 * 1.5 * 2.0) = 2, plus tx and rx
        assert_eq!(4, link.delay());
        assert_eq!(8.0 * (1.0 * 1.5 + 0.5), link.static_power());
        link.update_dynamic_energy(4, 3);
        link.update_dynamic_energy(4, 1);
        assert_eq!(16.0 * 0.25 * 1.5, link.dynamic_energy());
        assert_eq!(8.0 * (1.0 * 1.5 + 0.5), link.static_power());
    }

    #[test]
    fn equalized_adds_pipeline_delay() {
        let link = LinkModel::create("electrical_equalized", 1.0, 10.0, 64, false, &params()).unwrap();
        assert_eq!(1 + 2 + 1, link.delay());
        assert_eq!(0.0, link.static_power());
    }

    #[test]
    fn equalized_power_requires_power_params() {
        let err = LinkModel::create("electrical_equalized", 1.0, 10.0, 64, true, &params()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingLinkPowerParams("electrical_equalized")));
    }

    #[test]
    fn optical_counts_conversion_delay() {
        let mut link = LinkModel::create("optical", 2.0, 50.0, 4, true, &params()).unwrap();
        // ceil(0.01 * 50 * 2 + 1 + 1) = 3
        assert_eq!(3, link.delay());
        assert_eq!(4.0 * (1.75 + 3.0 * 0.75), link.static_power());
        link.update_dynamic_energy(2, 1);
        assert_eq!(2.0 * (2.0 + 3.0), link.dynamic_energy());
    }

    #[test]
    fn unknown_link_type_is_fatal() {
        let err = LinkModel::create("superconducting", 1.0, 1.0, 64, false, &params()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownLinkType(ref s) if s == "superconducting"));
    }

    #[test]
    fn non_positive_or_nan_frequency_is_fatal() {
        for frequency in [0.0, -1.0, f64::NAN] {
            let err = LinkModel::create("electrical_repeated", frequency, 1.0, 8, false, &params())
                .unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: "link.frequency", .. }));
        }
    }

    #[test]
    fn missing_kind_params_is_fatal() {
        let err = LinkModel::create("optical", 1.0, 1.0, 64, false, &LinkModelConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingLinkParams("optical")));
    }
}
