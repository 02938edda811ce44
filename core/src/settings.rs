use crate::error::PlanError;
use crate::models::SettingsId;
use crate::profile::TravelRates;
use crate::units::{UnitSystem, Units};

/// Planner configuration, persisted through [`crate::storage::Storage`].
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub id: SettingsId,
    pub unit_system: UnitSystem,
    /// Depth units per minute.
    pub descent_rate: f64,
    pub ascent_rate: f64,
    /// pO2 ceiling for bottom gases; sets their MOD.
    pub max_po2_bottom: f64,
    /// pO2 ceiling for deco gases.
    pub max_po2_deco: f64,
    /// CNS percent a plan may reach.
    pub max_cns: f64,
    pub max_otu: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::for_units(UnitSystem::Metric)
    }
}

impl Settings {
    pub fn for_units(unit_system: UnitSystem) -> Self {
        let rates = TravelRates::for_units(&Units::new(unit_system));
        Settings {
            id: SettingsId::default(),
            unit_system,
            descent_rate: rates.descent(),
            ascent_rate: rates.ascent(),
            max_po2_bottom: 1.4,
            max_po2_deco: 1.6,
            max_cns: 100.0,
            max_otu: 300.0,
        }
    }

    pub fn units(&self) -> Units {
        Units::new(self.unit_system)
    }

    pub fn travel_rates(&self) -> Result<TravelRates, PlanError> {
        TravelRates::new(self.descent_rate, self.ascent_rate)
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        self.travel_rates()?;
        for po2 in [self.max_po2_bottom, self.max_po2_deco] {
            crate::oxtox::check_po2(po2)?;
            if po2 <= 0.0 {
                return Err(PlanError::InvalidSetpoint(po2));
            }
        }
        Ok(())
    }
}
