//! Unit systems and the ambient pressure model.
//!
//! Depths are carried as `f64` in the unit of the active system (metres or
//! feet). Pressures are absolute, in bar for metric and ata for imperial; the
//! model treats the two as the same scale with a different depth per unit.

/// Feet in one metre.
pub const FEET_PER_METER: f64 = 3.2808399;

/// Coefficient of the standard barometric formula (per metre of altitude).
const BAROMETRIC_LAPSE: f64 = 2.25577e-5;

/// Exponent of the standard barometric formula.
const BAROMETRIC_EXPONENT: f64 = 5.25588;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, uniffi::Enum)]
pub enum UnitSystem {
    /// Metres and bar.
    Metric,
    /// Feet and ata.
    Imperial,
}

impl UnitSystem {
    /// Integer code used by the persisted settings record.
    pub fn code(&self) -> i64 {
        match self {
            UnitSystem::Metric => 0,
            UnitSystem::Imperial => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(UnitSystem::Metric),
            1 => Some(UnitSystem::Imperial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    system: UnitSystem,
}

impl Default for Units {
    fn default() -> Self {
        Units::metric()
    }
}

impl Units {
    pub fn new(system: UnitSystem) -> Self {
        Units { system }
    }

    pub fn metric() -> Self {
        Units::new(UnitSystem::Metric)
    }

    pub fn imperial() -> Self {
        Units::new(UnitSystem::Imperial)
    }

    pub fn system(&self) -> UnitSystem {
        self.system
    }

    /// Depth of water that adds one bar (ata) of pressure.
    pub fn depth_per_bar(&self) -> f64 {
        match self.system {
            UnitSystem::Metric => 10.0,
            UnitSystem::Imperial => 33.0,
        }
    }

    /// Deepest depth a planner accepts.
    pub fn depth_max(&self) -> f64 {
        match self.system {
            UnitSystem::Metric => 200.0,
            UnitSystem::Imperial => 660.0,
        }
    }

    /// Step between selectable depths (stop spacing, MOD flooring).
    pub fn depth_increment(&self) -> f64 {
        match self.system {
            UnitSystem::Metric => 3.0,
            UnitSystem::Imperial => 10.0,
        }
    }

    pub fn depth_unit(&self) -> &'static str {
        match self.system {
            UnitSystem::Metric => "m",
            UnitSystem::Imperial => "ft",
        }
    }

    pub fn pressure_unit(&self) -> &'static str {
        match self.system {
            UnitSystem::Metric => "bar",
            UnitSystem::Imperial => "ata",
        }
    }

    /// Absolute pressure at `depth` for a dive at `altitude_m` metres above sea level.
    pub fn depth_to_abs_pressure(&self, depth: f64, altitude_m: f64) -> f64 {
        surface_pressure(altitude_m) + depth / self.depth_per_bar()
    }

    /// Depth at which the absolute pressure equals `pressure`.
    pub fn abs_pressure_to_depth(&self, pressure: f64, altitude_m: f64) -> f64 {
        (pressure - surface_pressure(altitude_m)) * self.depth_per_bar()
    }

    /// Convert a depth expressed in `from` into this system's unit.
    pub fn convert_depth(&self, value: f64, from: UnitSystem) -> f64 {
        convert_depth(value, from, self.system)
    }

    /// Round a depth for display or storage; ties go to the even neighbour.
    pub fn display_depth(&self, value: f64) -> i64 {
        value.round_ties_even() as i64
    }
}

/// Convert a depth between two unit systems.
pub fn convert_depth(value: f64, from: UnitSystem, to: UnitSystem) -> f64 {
    match (from, to) {
        (UnitSystem::Metric, UnitSystem::Imperial) => value * FEET_PER_METER,
        (UnitSystem::Imperial, UnitSystem::Metric) => value / FEET_PER_METER,
        _ => value,
    }
}

/// Surface pressure (bar) at an altitude in metres, 1.0 at sea level.
pub fn surface_pressure(altitude_m: f64) -> f64 {
    if altitude_m <= 0.0 {
        return 1.0;
    }
    (1.0 - BAROMETRIC_LAPSE * altitude_m).powf(BAROMETRIC_EXPONENT)
}
