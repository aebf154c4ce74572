use log::debug;
use serde::Serialize;

use crate::sim::config::RouterPowerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    Read,
    Write,
}

/// Router geometry the power numbers scale with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterGeometry {
    pub num_input_ports: u32,
    pub num_output_ports: u32,
    pub num_flits_per_port_buffer: u32,
    pub flit_width: u32,
}

impl RouterGeometry {
    fn buffer_bits(&self) -> f64 {
        self.num_input_ports as f64 * self.num_flits_per_port_buffer as f64 * self.flit_width as f64
    }
}

/// Source of per-event router energies and static power.
pub trait RouterPowerOracle: Send {
    fn buffer_energy_per_bit(&self, access: BufferAccess) -> f64;
    fn crossbar_energy_per_bit(&self) -> f64;
    fn switch_allocator_energy_per_request(&self) -> f64;
    fn clock_energy_per_flit(&self) -> f64;
    fn static_power(&self, geometry: &RouterGeometry) -> RouterStaticPower;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RouterStaticPower {
    pub buffer: f64,
    pub crossbar: f64,
    pub switch_allocator: f64,
    pub clock: f64,
}

impl RouterStaticPower {
    pub fn total(&self) -> f64 {
        self.buffer + self.crossbar + self.switch_allocator + self.clock
    }
}

/// Closed-form per-bit and per-port coefficients read from `[router_model]`.
#[derive(Debug, Clone)]
pub struct AnalyticalRouterPower {
    params: RouterPowerConfig,
}

impl AnalyticalRouterPower {
    pub fn new(params: RouterPowerConfig) -> Self {
        Self { params }
    }
}

impl RouterPowerOracle for AnalyticalRouterPower {
    fn buffer_energy_per_bit(&self, access: BufferAccess) -> f64 {
        match access {
            BufferAccess::Read => self.params.buffer_read_energy_per_bit,
            BufferAccess::Write => self.params.buffer_write_energy_per_bit,
        }
    }

    fn crossbar_energy_per_bit(&self) -> f64 {
        self.params.crossbar_energy_per_bit
    }

    fn switch_allocator_energy_per_request(&self) -> f64 {
        self.params.switch_allocator_energy_per_request
    }

    fn clock_energy_per_flit(&self) -> f64 {
        self.params.clock_energy_per_flit
    }

    fn static_power(&self, geometry: &RouterGeometry) -> RouterStaticPower {
        let ports = (geometry.num_input_ports + geometry.num_output_ports) as f64;
        RouterStaticPower {
            buffer: geometry.buffer_bits() * self.params.buffer_static_power_per_bit,
            crossbar: ports * self.params.crossbar_static_power_per_port,
            switch_allocator: geometry.num_input_ports as f64
                * self.params.switch_allocator_static_power_per_port,
            clock: self.params.clock_static_power,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RouterDynamicEnergy {
    pub buffer: f64,
    pub crossbar: f64,
    pub switch_allocator: f64,
    pub clock: f64,
}

impl RouterDynamicEnergy {
    pub fn total(&self) -> f64 {
        self.buffer + self.crossbar + self.switch_allocator + self.clock
    }
}

/// Per-router energy accounting. Static power is fixed at construction and survives
/// [`RouterModel::reset_counters`].
pub struct RouterModel {
    oracle: Box<dyn RouterPowerOracle>,
    static_power: RouterStaticPower,
    dynamic_energy: RouterDynamicEnergy,
}

impl RouterModel {
    pub fn new(geometry: RouterGeometry, oracle: Box<dyn RouterPowerOracle>) -> Self {
        let static_power = oracle.static_power(&geometry);
        debug!(
            "router {}x{} ports, {} flits/port, {} bit flits: static power {}",
            geometry.num_input_ports,
            geometry.num_output_ports,
            geometry.num_flits_per_port_buffer,
            geometry.flit_width,
            static_power.total()
        );
        Self {
            oracle,
            static_power,
            dynamic_energy: RouterDynamicEnergy::default(),
        }
    }

    pub fn analytical(geometry: RouterGeometry, params: &RouterPowerConfig) -> Self {
        Self::new(geometry, Box::new(AnalyticalRouterPower::new(params.clone())))
    }


    pub fn update_dynamic_energy_buffer(
        &mut self,
        access: BufferAccess,
        num_bit_flips: u32,
        num_flits: u64,
    ) {
        self.dynamic_energy.buffer += num_flits as f64
            * num_bit_flips as f64
            * self.oracle.buffer_energy_per_bit(access);
    }

    pub fn update_dynamic_energy_crossbar(&mut self, num_bit_flips: u32, num_flits: u64) {
        self.dynamic_energy.crossbar +=
            num_flits as f64 * num_bit_flips as f64 * self.oracle.crossbar_energy_per_bit();
    }

    pub fn update_dynamic_energy_switch_allocator(&mut self, num_requests: u32, num_flits: u64) {
        self.dynamic_energy.switch_allocator += num_flits as f64
            * num_requests as f64
            * self.oracle.switch_allocator_energy_per_request();
    }

    pub fn update_dynamic_energy_clock(&mut self, num_flits: u64) {
        self.dynamic_energy.clock += num_flits as f64 * self.oracle.clock_energy_per_flit();
    }

    pub fn static_power(&self) -> &RouterStaticPower {
        &self.static_power
    }

    pub fn dynamic_energy(&self) -> &RouterDynamicEnergy {
        &self.dynamic_energy
    }

    pub fn total_static_power(&self) -> f64 {
        self.static_power.total()
    }

    pub fn total_dynamic_energy(&self) -> f64 {
        self.dynamic_energy.total()
    }

    pub fn reset_counters(&mut self) {
        self.dynamic_energy = RouterDynamicEnergy::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_params() -> RouterPowerConfig {
        RouterPowerConfig {
            buffer_read_energy_per_bit: 1.0,
            buffer_write_energy_per_bit: 2.0,
            crossbar_energy_per_bit: 3.0,
            switch_allocator_energy_per_request: 4.0,
            clock_energy_per_flit: 5.0,
            buffer_static_power_per_bit: 0.5,
            crossbar_static_power_per_port: 1.0,
            switch_allocator_static_power_per_port: 2.0,
            clock_static_power: 3.0,
        }
    }

    fn geometry() -> RouterGeometry {
        RouterGeometry {
            num_input_ports: 5,
            num_output_ports: 5,
            num_flits_per_port_buffer: 4,
            flit_width: 8,
        }
    }

    #[test]
    fn static_power_from_geometry() {
        let router = RouterModel::analytical(geometry(), &unit_params());
        let power = router.static_power();
        assert_eq!(5.0 * 4.0 * 8.0 * 0.5, power.buffer);
        assert_eq!(10.0, power.crossbar);
        assert_eq!(10.0, power.switch_allocator);
        assert_eq!(3.0, power.clock);
        assert_eq!(80.0 + 10.0 + 10.0 + 3.0, router.total_static_power());
    }

    #[test]
    fn charges_each_event_class() {
        let mut router = RouterModel::analytical(geometry(), &unit_params());
        router.update_dynamic_energy_buffer(BufferAccess::Write, 4, 2);
        router.update_dynamic_energy_buffer(BufferAccess::Read, 4, 2);
        router.update_dynamic_energy_crossbar(4, 2);
        router.update_dynamic_energy_switch_allocator(1, 2);
        router.update_dynamic_energy_clock(2);
        let energy = router.dynamic_energy();
        assert_eq!(8.0 * 2.0 + 8.0 * 1.0, energy.buffer);
        assert_eq!(24.0, energy.crossbar);
        assert_eq!(8.0, energy.switch_allocator);
        assert_eq!(10.0, energy.clock);
        assert_eq!(24.0 + 24.0 + 8.0 + 10.0, router.total_dynamic_energy());
    }

    #[test]
    fn reset_keeps_static_power() {
        let mut router = RouterModel::analytical(geometry(), &unit_params());
        router.update_dynamic_energy_clock(10);
        router.reset_counters();
        assert_eq!(0.0, router.total_dynamic_energy());
        assert_eq!(103.0, router.total_static_power());
    }
}
