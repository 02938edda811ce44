//! Breathing gas sources: open-circuit mixes and rebreather setpoints.

use std::fmt;

use crate::error::PlanError;
use crate::localize::{Localizer, StringToken};
use crate::oxtox;
use crate::units::Units;

/// Tolerance used when comparing gas fractions.
pub const FRACTION_EPSILON: f64 = 1e-9;

/// An open-circuit mix of oxygen, helium and (implicitly) nitrogen.
#[derive(Debug, Clone, Copy)]
pub struct Mix {
    o2: f64,
    he: f64,
}

impl PartialEq for Mix {
    fn eq(&self, other: &Self) -> bool {
        (self.o2 - other.o2).abs() < FRACTION_EPSILON && (self.he - other.he).abs() < FRACTION_EPSILON
    }
}

impl Mix {
    pub fn new(o2: f64, he: f64) -> Result<Self, PlanError> {
        validate_fractions(o2, he)?;
        Ok(Mix { o2, he })
    }

    pub fn air() -> Self {
        Mix { o2: 0.21, he: 0.0 }
    }

    pub fn oxygen() -> Self {
        Mix { o2: 1.0, he: 0.0 }
    }

    pub fn o2(&self) -> f64 {
        self.o2
    }

    pub fn he(&self) -> f64 {
        self.he
    }

    pub fn n2(&self) -> f64 {
        (1.0 - self.o2 - self.he).max(0.0)
    }

    pub fn set_o2(&mut self, o2: f64) -> Result<(), PlanError> {
        validate_fractions(o2, self.he)?;
        self.o2 = o2;
        Ok(())
    }

    pub fn set_he(&mut self, he: f64) -> Result<(), PlanError> {
        validate_fractions(self.o2, he)?;
        self.he = he;
        Ok(())
    }

    /// pO2 at `depth` at sea level.
    pub fn po2(&self, depth: f64, units: &Units) -> f64 {
        self.po2_at_pressure(units.depth_to_abs_pressure(depth, 0.0))
    }

    pub fn po2_at_pressure(&self, pressure: f64) -> f64 {
        self.o2 * pressure
    }

    /// Maximum operating depth for `max_po2`, floored to the unit's depth increment.
    pub fn mod_depth(&self, units: &Units, max_po2: f64) -> Result<f64, PlanError> {
        if self.o2 <= 0.0 {
            return Err(PlanError::ModUndefined);
        }
        let exact = (max_po2 / self.o2 - 1.0) * units.depth_per_bar();
        let increment = units.depth_increment();
        // absorb float noise so an exact multiple is not floored one step down
        let steps = (exact / increment + 1e-9).floor();
        Ok((steps * increment).max(0.0))
    }

    pub fn is_air(&self) -> bool {
        *self == Mix::air()
    }

    /// Human-readable name, e.g. "Air", "EAN32", "18/45".
    pub fn name(&self, localizer: &dyn Localizer) -> String {
        let o2 = percent(self.o2);
        let he = percent(self.he);
        if self.is_air() {
            localizer.string(StringToken::Air)
        } else if o2 == 100 {
            localizer.string(StringToken::Oxygen)
        } else if he == 100 {
            localizer.string(StringToken::Helium)
        } else if o2 == 0 && he == 0 {
            localizer.string(StringToken::Nitrogen)
        } else if he == 0 {
            format!("EAN{o2}")
        } else if o2 + he == 100 {
            format!("Heliox {o2}/{he}")
        } else {
            format!("{o2}/{he}")
        }
    }
}

fn percent(fraction: f64) -> i64 {
    (fraction * 100.0).round() as i64
}

fn validate_fractions(o2: f64, he: f64) -> Result<(), PlanError> {
    let in_range = |f: f64| f.is_finite() && (0.0..=1.0).contains(&f);
    if !in_range(o2) || !in_range(he) || o2 + he > 1.0 + FRACTION_EPSILON {
        return Err(PlanError::InvalidGasComposition { o2, he });
    }
    Ok(())
}

/// A constant pO2 held by a rebreather loop, optionally with its diluent.
#[derive(Debug, Clone, Copy)]
pub struct Setpoint {
    po2: f64,
    diluent: Option<Mix>,
}

impl PartialEq for Setpoint {
    fn eq(&self, other: &Self) -> bool {
        (self.po2 - other.po2).abs() < FRACTION_EPSILON && self.diluent == other.diluent
    }
}

impl Setpoint {
    pub fn new(po2: f64, diluent: Option<Mix>) -> Result<Self, PlanError> {
        if !po2.is_finite() || po2 <= 0.0 {
            return Err(PlanError::InvalidSetpoint(po2));
        }
        Ok(Setpoint { po2, diluent })
    }

    pub fn po2_setting(&self) -> f64 {
        self.po2
    }

    pub fn diluent(&self) -> Option<Mix> {
        self.diluent
    }

    pub fn set_po2(&mut self, po2: f64) -> Result<(), PlanError> {
        *self = Setpoint::new(po2, self.diluent)?;
        Ok(())
    }

    pub fn set_diluent(&mut self, diluent: Option<Mix>) {
        self.diluent = diluent;
    }

    /// pO2 at `depth` at sea level.
    pub fn po2(&self, depth: f64, units: &Units) -> f64 {
        self.po2_at_pressure(units.depth_to_abs_pressure(depth, 0.0))
    }

    /// The loop cannot hold more oxygen than a pure diluent flush delivers.
    pub fn po2_at_pressure(&self, pressure: f64) -> f64 {
        match self.diluent {
            Some(diluent) => self.po2.min(diluent.po2_at_pressure(pressure)),
            None => self.po2,
        }
    }
}

/// Either kind of breathing gas. Every exposure calculation goes through here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GasSource {
    Mix(Mix),
    Setpoint(Setpoint),
}

impl From<Mix> for GasSource {
    fn from(mix: Mix) -> Self {
        GasSource::Mix(mix)
    }
}

impl From<Setpoint> for GasSource {
    fn from(setpoint: Setpoint) -> Self {
        GasSource::Setpoint(setpoint)
    }
}

impl GasSource {
    pub fn air() -> Self {
        GasSource::Mix(Mix::air())
    }

    pub fn po2(&self, depth: f64, units: &Units) -> f64 {
        match self {
            GasSource::Mix(mix) => mix.po2(depth, units),
            GasSource::Setpoint(setpoint) => setpoint.po2(depth, units),
        }
    }

    pub fn po2_at_pressure(&self, pressure: f64) -> f64 {
        match self {
            GasSource::Mix(mix) => mix.po2_at_pressure(pressure),
            GasSource::Setpoint(setpoint) => setpoint.po2_at_pressure(pressure),
        }
    }

    /// Fraction that drives pO2 changes with depth, if any.
    pub(crate) fn driving_o2_fraction(&self) -> Option<f64> {
        match self {
            GasSource::Mix(mix) => Some(mix.o2()),
            GasSource::Setpoint(setpoint) => setpoint.diluent().map(|d| d.o2()),
        }
    }

    /// The mix actually carried: the mix itself, or a setpoint's diluent.
    pub fn mix(&self) -> Option<Mix> {
        match self {
            GasSource::Mix(mix) => Some(*mix),
            GasSource::Setpoint(setpoint) => setpoint.diluent(),
        }
    }

    /// Minutes at `depth` before the CNS clock reaches `max_cns` percent.
    pub fn max_cns_exposure(
        &self,
        depth: f64,
        units: &Units,
        current_cns: f64,
        max_cns: f64,
    ) -> Result<f64, PlanError> {
        oxtox::max_cns_exposure(self.po2(depth, units), current_cns, max_cns)
    }

    /// Minutes at `depth` before the OTU total reaches `max_otu`.
    pub fn max_otu_exposure(
        &self,
        depth: f64,
        units: &Units,
        current_otu: f64,
        max_otu: f64,
    ) -> Result<f64, PlanError> {
        oxtox::max_otu_exposure(self.po2(depth, units), current_otu, max_otu)
    }

    pub fn name(&self, localizer: &dyn Localizer) -> String {
        match self {
            GasSource::Mix(mix) => mix.name(localizer),
            GasSource::Setpoint(setpoint) => match setpoint.diluent() {
                Some(diluent) => format!(
                    "SP {:.1} ({})",
                    setpoint.po2_setting(),
                    diluent.name(localizer)
                ),
                None => format!("SP {:.1}", setpoint.po2_setting()),
            },
        }
    }
}

impl fmt::Display for GasSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name(&crate::localize::English))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localize::English;
    use proptest::prelude::*;

    fn mix(o2: f64, he: f64) -> Mix {
        Mix::new(o2, he).unwrap()
    }

    #[test]
    fn test_rejects_invalid_composition() {
        assert!(matches!(
            Mix::new(0.6, 0.5),
            Err(PlanError::InvalidGasComposition { .. })
        ));
        assert!(Mix::new(-0.1, 0.0).is_err());
        assert!(Mix::new(1.2, 0.0).is_err());
        assert!(Mix::new(f64::NAN, 0.0).is_err());

        let mut m = mix(0.21, 0.35);
        assert!(m.set_he(0.85).is_err());
        assert_eq!(m.he(), 0.35);
        assert!(m.set_o2(0.18).is_ok());
        assert_eq!(m.o2(), 0.18);
    }

    #[test]
    fn test_pure_helium_has_no_mod() {
        let helium = mix(0.0, 1.0);
        assert_eq!(helium.n2(), 0.0);
        assert!(matches!(
            helium.mod_depth(&Units::metric(), 1.4),
            Err(PlanError::ModUndefined)
        ));
    }

    #[test]
    fn test_ean32_mod() {
        let ean32 = mix(0.32, 0.0);
        let depth = ean32.mod_depth(&Units::metric(), 1.4).unwrap();
        assert_eq!(depth, 33.0);
    }

    #[test]
    fn test_mod_floors_to_increment() {
        // 1.6 bar of oxygen is exactly 6 m
        let depth = Mix::oxygen().mod_depth(&Units::metric(), 1.6).unwrap();
        assert_eq!(depth, 6.0);
        let depth = mix(0.5, 0.0).mod_depth(&Units::metric(), 1.6).unwrap();
        assert_eq!(depth, 21.0);
        let depth = Mix::oxygen().mod_depth(&Units::imperial(), 1.6).unwrap();
        assert_eq!(depth, 10.0);
    }

    #[test]
    fn test_mix_po2() {
        let po2 = Mix::air().po2(30.0, &Units::metric());
        assert!((po2 - 0.84).abs() < 1e-12);
    }

    #[test]
    fn test_setpoint_limited_by_diluent() {
        let diluent = mix(0.18, 0.45);
        let sp = Setpoint::new(1.3, Some(diluent)).unwrap();
        let po2 = sp.po2(20.0, &Units::metric());
        assert!((po2 - 0.54).abs() < 1e-12);

        // deep enough for the diluent to sustain the setpoint
        let po2 = sp.po2(70.0, &Units::metric());
        assert!((po2 - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_setpoint_equality_tolerates_rounding() {
        let sp = Setpoint::new(1.3, None).unwrap();
        assert_eq!(sp, Setpoint::new(13.0 / 10.0 + 1e-12, None).unwrap());
        assert_ne!(sp, Setpoint::new(1.31, None).unwrap());
        assert_ne!(sp, Setpoint::new(1.3, Some(Mix::air())).unwrap());
    }

    #[test]
    fn test_setpoint_without_diluent_is_constant() {
        let sp = Setpoint::new(1.2, None).unwrap();
        let units = Units::metric();
        assert_eq!(sp.po2(0.0, &units), 1.2);
        assert_eq!(sp.po2(90.0, &units), 1.2);
        assert!(Setpoint::new(0.0, None).is_err());
    }

    #[test]
    fn test_exposure_limits() {
        let units = Units::metric();
        let ean32: GasSource = mix(0.32, 0.0).into();
        // 33.75 m on EAN32 is 1.4 bar: 150 minute clock
        let minutes = ean32.max_cns_exposure(33.75, &units, 0.0, 100.0).unwrap();
        assert!((minutes - 150.0).abs() < 1e-6);

        let minutes = ean32.max_otu_exposure(21.25, &units, 0.0, 300.0).unwrap();
        assert!((minutes - 300.0).abs() < 1e-6);

        assert!(matches!(
            ean32.max_cns_exposure(45.0, &units, 0.0, 100.0),
            Err(PlanError::MaxPo2Exceeded { .. })
        ));
    }

    #[test]
    fn test_po2_boundary_through_gas_source() {
        let units = Units::metric();
        let oxygen: GasSource = Mix::oxygen().into();
        assert!(oxygen.max_cns_exposure(6.0, &units, 0.0, 100.0).is_ok());
        assert!(oxygen.max_cns_exposure(6.01, &units, 0.0, 100.0).is_err());
    }

    #[test]
    fn test_gas_names() {
        let l = English;
        assert_eq!(Mix::air().name(&l), "Air");
        assert_eq!(Mix::oxygen().name(&l), "Oxygen");
        assert_eq!(mix(0.0, 1.0).name(&l), "Helium");
        assert_eq!(mix(0.0, 0.0).name(&l), "Nitrogen");
        assert_eq!(mix(0.32, 0.0).name(&l), "EAN32");
        assert_eq!(mix(0.18, 0.45).name(&l), "18/45");
        assert_eq!(mix(0.10, 0.90).name(&l), "Heliox 10/90");

        let sp = GasSource::Setpoint(Setpoint::new(1.3, Some(mix(0.18, 0.45))).unwrap());
        assert_eq!(sp.to_string(), "SP 1.3 (18/45)");
        let sp = GasSource::Setpoint(Setpoint::new(1.2, None).unwrap());
        assert_eq!(sp.to_string(), "SP 1.2");
    }

    proptest! {
        #[test]
        fn prop_gas_conservation(o2 in 0u32..=1000, he in 0u32..=1000) {
            prop_assume!(o2 + he <= 1000);
            let m = Mix::new(o2 as f64 / 1000.0, he as f64 / 1000.0).unwrap();
            prop_assert!((m.o2() + m.he() + m.n2() - 1.0).abs() < 1e-6);
        }

        #[test]
        fn prop_mod_monotonic(a in 1u32..=100, b in 1u32..=100, max_po2 in 1.0f64..1.6) {
            prop_assume!(a < b);
            let units = Units::metric();
            let lean = Mix::new(a as f64 / 100.0, 0.0).unwrap();
            let rich = Mix::new(b as f64 / 100.0, 0.0).unwrap();
            prop_assert!(lean.mod_depth(&units, max_po2).unwrap() >= rich.mod_depth(&units, max_po2).unwrap());
        }
    }
}
