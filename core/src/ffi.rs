//! Foreign-function surface for mobile front-ends.
//!
//! Everything here is stateless: callers pass plain records and get numbers
//! or records back. Profile editing and deco runs stay on the Rust side.

use crate::cns_otu::CnsOtu;
use crate::codec::{self, WireGas};
use crate::error::PlanError;
use crate::gas::{GasSource, Mix, Setpoint};
use crate::localize::English;
use crate::units::{surface_pressure, UnitSystem, Units};

// ============================================================================
// FFI Types
// ============================================================================

/// A gas source as seen by foreign code.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum GasSourceInput {
    Mix {
        /// Fraction of O2 (0.0–1.0)
        o2_fraction: f64,
        /// Fraction of He (0.0–1.0)
        he_fraction: f64,
    },
    Setpoint {
        /// Loop pO2 in bar
        po2: f64,
        /// Diluent fractions; both set or both absent
        diluent_o2: Option<f64>,
        diluent_he: Option<f64>,
    },
}

/// Decoded text form of a gas.
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum WireGasOutput {
    Any,
    Source { gas: GasSourceInput },
}

/// One leg of a profile for [`compute_exposure`].
#[derive(Debug, Clone, uniffi::Record)]
pub struct SegmentInput {
    /// Depth at the end of the leg, in the unit system's depth unit
    pub depth: f64,
    /// Minutes travelling to `depth`
    pub travel_minutes: f64,
    /// Minutes spent at `depth` afterwards
    pub minutes: f64,
    pub gas: GasSourceInput,
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct ExposureResult {
    pub cns_percent: f64,
    pub otu: f64,
}

impl TryFrom<&GasSourceInput> for GasSource {
    type Error = PlanError;

    fn try_from(input: &GasSourceInput) -> Result<Self, PlanError> {
        match *input {
            GasSourceInput::Mix {
                o2_fraction,
                he_fraction,
            } => Ok(Mix::new(o2_fraction, he_fraction)?.into()),
            GasSourceInput::Setpoint {
                po2,
                diluent_o2,
                diluent_he,
            } => {
                let diluent = match (diluent_o2, diluent_he) {
                    (Some(o2), Some(he)) => Some(Mix::new(o2, he)?),
                    (None, None) => None,
                    (o2, he) => {
                        return Err(PlanError::InvalidGasComposition {
                            o2: o2.unwrap_or(f64::NAN),
                            he: he.unwrap_or(f64::NAN),
                        })
                    }
                };
                Ok(Setpoint::new(po2, diluent)?.into())
            }
        }
    }
}

impl From<&GasSource> for GasSourceInput {
    fn from(gas: &GasSource) -> Self {
        match gas {
            GasSource::Mix(mix) => GasSourceInput::Mix {
                o2_fraction: mix.o2(),
                he_fraction: mix.he(),
            },
            GasSource::Setpoint(sp) => GasSourceInput::Setpoint {
                po2: sp.po2_setting(),
                diluent_o2: sp.diluent().map(|d| d.o2()),
                diluent_he: sp.diluent().map(|d| d.he()),
            },
        }
    }
}

// ============================================================================
// Exported functions
// ============================================================================

#[uniffi::export]
pub fn encode_gas(gas: GasSourceInput) -> Result<String, PlanError> {
    codec::encode(&GasSource::try_from(&gas)?)
}

#[uniffi::export]
pub fn decode_gas(text: String) -> Option<WireGasOutput> {
    codec::decode(&text).map(|wire| match wire {
        WireGas::Any => WireGasOutput::Any,
        WireGas::Source(gas) => WireGasOutput::Source {
            gas: GasSourceInput::from(&gas),
        },
    })
}

/// English display name, e.g. "EAN32" or "SP 1.3 (10/70)".
#[uniffi::export]
pub fn gas_name(gas: GasSourceInput) -> Result<String, PlanError> {
    Ok(GasSource::try_from(&gas)?.name(&English))
}

/// pO2 breathed at `depth` on a dive at `altitude_m`.
#[uniffi::export]
pub fn gas_po2(
    gas: GasSourceInput,
    depth: f64,
    unit_system: UnitSystem,
    altitude_m: f64,
) -> Result<f64, PlanError> {
    let gas = GasSource::try_from(&gas)?;
    let pressure = Units::new(unit_system).depth_to_abs_pressure(depth, altitude_m);
    Ok(gas.po2_at_pressure(pressure))
}

/// Maximum operating depth, floored to the unit system's depth increment.
#[uniffi::export]
pub fn mix_mod(
    o2_fraction: f64,
    he_fraction: f64,
    unit_system: UnitSystem,
    max_po2: f64,
) -> Result<f64, PlanError> {
    Mix::new(o2_fraction, he_fraction)?.mod_depth(&Units::new(unit_system), max_po2)
}

#[uniffi::export]
pub fn max_cns_exposure(
    gas: GasSourceInput,
    depth: f64,
    unit_system: UnitSystem,
    current_cns: f64,
    max_cns: f64,
) -> Result<f64, PlanError> {
    GasSource::try_from(&gas)?.max_cns_exposure(depth, &Units::new(unit_system), current_cns, max_cns)
}

#[uniffi::export]
pub fn max_otu_exposure(
    gas: GasSourceInput,
    depth: f64,
    unit_system: UnitSystem,
    current_otu: f64,
    max_otu: f64,
) -> Result<f64, PlanError> {
    GasSource::try_from(&gas)?.max_otu_exposure(depth, &Units::new(unit_system), current_otu, max_otu)
}

/// Surface pressure in bar at `altitude_m`.
#[uniffi::export]
pub fn altitude_surface_pressure(altitude_m: f64) -> f64 {
    surface_pressure(altitude_m)
}

/// CNS and OTU after flying `segments` from the surface.
#[uniffi::export]
pub fn compute_exposure(
    segments: Vec<SegmentInput>,
    unit_system: UnitSystem,
    altitude_m: f64,
    start_cns: f64,
    start_otu: f64,
) -> Result<ExposureResult, PlanError> {
    let mut acc = CnsOtu::new(altitude_m, Units::new(unit_system), start_cns, start_otu);
    let mut travel_gas: Option<GasSource> = None;
    for segment in &segments {
        let gas = GasSource::try_from(&segment.gas)?;
        let travel = travel_gas.unwrap_or(gas);
        acc.change_depth(segment.depth, segment.travel_minutes, &travel)?;
        acc.run(segment.minutes, &gas)?;
        travel_gas = Some(gas);
    }
    Ok(ExposureResult {
        cns_percent: acc.cns(),
        otu: acc.otu(),
    })
}
