//! Running CNS and OTU totals for a diver.

use crate::error::PlanError;
use crate::gas::GasSource;
use crate::oxtox;
use crate::units::Units;

/// Largest pO2 change (bar) allowed within one integration step.
const PO2_STEP: f64 = 0.05;

/// Accumulates oxygen exposure along a profile.
///
/// CNS is held in percent of the single-exposure clock; OTU is a plain sum.
/// Both only grow: there is no recovery while underwater.
#[derive(Debug, Clone, PartialEq)]
pub struct CnsOtu {
    cns: f64,
    otu: f64,
    altitude: f64,
    units: Units,
    depth: f64,
}

impl CnsOtu {
    /// Start at the surface of a dive site at `altitude` metres with prior exposure.
    pub fn new(altitude: f64, units: Units, cns: f64, otu: f64) -> Self {
        CnsOtu {
            cns: cns.max(0.0),
            otu: otu.max(0.0),
            altitude,
            units,
            depth: 0.0,
        }
    }

    pub fn cns(&self) -> f64 {
        self.cns
    }

    pub fn otu(&self) -> f64 {
        self.otu
    }

    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Travel linearly from the current depth to `new_depth` over `minutes` on `gas`.
    ///
    /// The travel is split so pO2 moves by at most 0.05 bar per step, and each
    /// step is charged at its midpoint. Nothing is committed on error.
    pub fn change_depth(
        &mut self,
        new_depth: f64,
        minutes: f64,
        gas: &GasSource,
    ) -> Result<(), PlanError> {
        let start = self.depth;
        let delta = new_depth - start;
        let intervals = self.interval_count(delta, gas);
        let dt = minutes.max(0.0) / intervals as f64;

        let mut cns = self.cns;
        let mut otu = self.otu;
        for i in 0..intervals {
            let mid = start + delta * (i as f64 + 0.5) / intervals as f64;
            let po2 = self.po2_at(mid, gas);
            cns += oxtox::cns_rate(po2)? * dt * 100.0;
            otu += oxtox::otu_rate(po2)? * dt;
        }
        oxtox::check_po2(self.po2_at(new_depth, gas))?;

        self.cns = cns;
        self.otu = otu;
        self.depth = new_depth;
        Ok(())
    }

    /// Stay at the current depth for `minutes` on `gas`.
    pub fn run(&mut self, minutes: f64, gas: &GasSource) -> Result<(), PlanError> {
        let po2 = self.po2_at(self.depth, gas);
        let minutes = minutes.max(0.0);
        let cns = oxtox::cns_rate(po2)? * minutes * 100.0;
        let otu = oxtox::otu_rate(po2)? * minutes;
        self.cns += cns;
        self.otu += otu;
        Ok(())
    }

    fn po2_at(&self, depth: f64, gas: &GasSource) -> f64 {
        gas.po2_at_pressure(self.units.depth_to_abs_pressure(depth, self.altitude))
    }

    fn interval_count(&self, delta: f64, gas: &GasSource) -> usize {
        let fo2 = match gas.driving_o2_fraction() {
            Some(fo2) if fo2 > 0.0 => fo2,
            _ => return 1,
        };
        let depth_step = PO2_STEP * self.units.depth_per_bar() / fo2;
        ((delta.abs() / depth_step).ceil() as usize).max(1)
    }
}
