//! Beam kinematics tracked along the lattice.
//!
//! A `BeamState` starts at rest for the configured species and is updated
//! whenever a beam card redefines the momentum or an acceleration element
//! adds kinetic energy. The scaling in both calculators is relative to the
//! current momentum/energy-gain unit, with `eV` as the degenerate case.

use crate::common::constants::C_LIGHT;
use crate::common::units::{label_scale, UnitQuantity, UnitTable};
use crate::domain::DistrType;

#[derive(Debug, Clone)]
pub struct BeamState {
    // updated along the lattice
    pub momentum: f64,
    pub k_energy: f64,
    pub tot_energy_current: f64,
    pub gamma: f64,
    pub beta: f64,
    pub brho: f64,
    // fixed from the initial beam definition
    pub mass: f64,
    pub tot_energy: f64,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub sigma_xp: f64,
    pub sigma_yp: f64,
    pub sigma_e: f64,
    pub sigma_t: f64,
    pub x0: f64,
    pub y0: f64,
    pub z0: f64,
    pub t0: f64,
    pub xp0: f64,
    pub yp0: f64,
    pub betx: f64,
    pub alfx: f64,
    pub bety: f64,
    pub alfy: f64,
    pub emitx: f64,
    pub emity: f64,
    pub distr_type: DistrType,
}

impl BeamState {
    /// Beam at rest for a particle of the given mass in GeV.
    pub fn at_rest(mass_gev: f64) -> Self {
        Self {
            momentum: 0.0,
            k_energy: 0.0,
            tot_energy_current: mass_gev,
            gamma: 1.0,
            beta: 0.0,
            brho: 0.0,
            mass: mass_gev,
            tot_energy: mass_gev,
            sigma_x: 0.0,
            sigma_y: 0.0,
            sigma_xp: 0.0,
            sigma_yp: 0.0,
            sigma_e: 0.0,
            sigma_t: 0.0,
            x0: 0.0,
            y0: 0.0,
            z0: 0.0,
            t0: 0.0,
            xp0: 0.0,
            yp0: 0.0,
            betx: 0.0,
            alfx: 0.0,
            bety: 0.0,
            alfy: 0.0,
            emitx: 0.0,
            emity: 0.0,
            distr_type: DistrType::Gauss,
        }
    }

    /// Mass scaling factor relative to the current momentum/energy unit.
    /// A rest mass in GeV multiplied by this lands in that unit.
    fn mass_scaling(units: &UnitTable) -> (f64, f64) {
        let unit = units.unit(UnitQuantity::PEgain);
        if unit == "eV" {
            (1.0e9, 1.0)
        } else {
            let unit_scale = label_scale(unit);
            (1.0e9 / unit_scale, unit_scale)
        }
    }

    /// Set the momentum (in the current p_egain unit) and derive total and
    /// kinetic energy, gamma, beta and the magnetic rigidity brho.
    pub fn set_energy_from_momentum(&mut self, momentum: f64, units: &UnitTable) {
        self.momentum = momentum;
        let (scaling, to_ev) = Self::mass_scaling(units);
        let mom_in_ev = momentum * to_ev;
        let mass = self.mass * scaling;
        let energy = (mass * mass + momentum * momentum).sqrt();
        self.tot_energy = energy;
        self.tot_energy_current = energy;
        self.k_energy = energy - mass;
        self.gamma = energy / mass;
        self.beta = (1.0 - 1.0 / (self.gamma * self.gamma)).sqrt();
        self.brho = mom_in_ev / C_LIGHT;
    }

    /// Set the kinetic energy (in the current p_egain unit) and derive the
    /// momentum and the remaining kinematic quantities. Inverse of
    /// `set_energy_from_momentum` up to rounding.
    pub fn set_momentum_from_energy(&mut self, k_energy: f64, units: &UnitTable) {
        self.k_energy = k_energy;
        let (scaling, to_ev) = Self::mass_scaling(units);
        let mass = self.mass * scaling;
        self.tot_energy_current = k_energy + mass;
        self.momentum =
            (self.tot_energy_current * self.tot_energy_current - mass * mass).sqrt();
        self.gamma = self.tot_energy_current / mass;
        self.beta = (1.0 - 1.0 / (self.gamma * self.gamma)).sqrt();
        self.brho = self.momentum * to_ev / C_LIGHT;
    }
}

#[cfg(test)]
mod tests {
    use super::BeamState;
    use crate::common::units::{UnitQuantity, UnitTable};

    const PROTON_MASS_GEV: f64 = 0.938_272;

    fn gev_units() -> UnitTable {
        let mut units = UnitTable::default();
        units.set(UnitQuantity::PEgain, "GeV");
        units
    }

    #[test]
    fn rest_state_is_trivial() {
        let beam = BeamState::at_rest(PROTON_MASS_GEV);
        assert_eq!(beam.gamma, 1.0);
        assert_eq!(beam.beta, 0.0);
        assert_eq!(beam.tot_energy_current, PROTON_MASS_GEV);
    }

    #[test]
    fn momentum_sets_full_kinematics() {
        let units = gev_units();
        let mut beam = BeamState::at_rest(PROTON_MASS_GEV);
        beam.set_energy_from_momentum(10.0, &units);
        // E = sqrt(m^2 + p^2) in natural units.
        let expected_energy = (PROTON_MASS_GEV * PROTON_MASS_GEV + 100.0).sqrt();
        assert!((beam.tot_energy_current - expected_energy).abs() < 1e-12);
        assert!((beam.k_energy - (expected_energy - PROTON_MASS_GEV)).abs() < 1e-12);
        assert!(beam.beta > 0.99 && beam.beta < 1.0);
        // brho = p[eV] / c, with GeV -> eV scaling of 1e9.
        assert!((beam.brho - 10.0e9 / 299_792_458.0).abs() < 1e-6);
    }

    #[test]
    fn energy_and_momentum_calculators_are_inverse() {
        let units = gev_units();
        let mut beam = BeamState::at_rest(PROTON_MASS_GEV);
        beam.set_energy_from_momentum(2.5, &units);
        let k = beam.k_energy;
        let brho = beam.brho;

        let mut other = BeamState::at_rest(PROTON_MASS_GEV);
        other.set_momentum_from_energy(k, &units);
        assert!((other.momentum - 2.5).abs() < 1e-9);
        assert!((other.brho - brho).abs() < 1e-9);
        assert!((other.beta - beam.beta).abs() < 1e-12);
    }

    #[test]
    fn ev_unit_takes_the_degenerate_scaling_branch() {
        let mut units = UnitTable::default();
        units.set(UnitQuantity::PEgain, "eV");
        let mut beam = BeamState::at_rest(PROTON_MASS_GEV);
        // momentum expressed directly in eV
        beam.set_energy_from_momentum(10.0e9, &units);
        assert!((beam.brho - 10.0e9 / 299_792_458.0).abs() < 1e-6);
        // mass scaled by 1e9 -> same gamma as the GeV case with p = 10
        assert!((beam.gamma - (PROTON_MASS_GEV * PROTON_MASS_GEV + 100.0).sqrt() / PROTON_MASS_GEV).abs() < 1e-9);
    }

    #[test]
    fn mev_unit_scales_mass_and_momentum_consistently() {
        let mut units = UnitTable::default();
        units.set(UnitQuantity::PEgain, "MeV");
        let mut beam = BeamState::at_rest(PROTON_MASS_GEV);
        beam.set_energy_from_momentum(10_000.0, &units);
        // 10 GeV expressed in MeV; rigidity must agree with the GeV case.
        assert!((beam.brho - 10.0e9 / 299_792_458.0).abs() < 1e-3);
    }
}
