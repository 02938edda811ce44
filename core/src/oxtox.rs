//! Oxygen toxicity tables: NOAA CNS clock and pulmonary OTU rate.

use crate::error::PlanError;

/// Highest pO2 (bar) any exposure calculation accepts.
pub const MAX_PO2: f64 = 1.6;

/// pO2 (bar) below which no toxicity accrues.
pub const MIN_TOXIC_PO2: f64 = 0.5;

/// Slack applied to the pO2 ceiling so that 1.6 computed with rounding noise passes.
const PO2_TOLERANCE: f64 = 1e-9;

/// NOAA single-exposure limits: (pO2 bar, minutes).
const CNS_LIMITS: [(f64, f64); 11] = [
    (0.6, 720.0),
    (0.7, 570.0),
    (0.8, 450.0),
    (0.9, 360.0),
    (1.0, 300.0),
    (1.1, 240.0),
    (1.2, 210.0),
    (1.3, 180.0),
    (1.4, 150.0),
    (1.5, 120.0),
    (1.6, 45.0),
];

/// Reject a pO2 above the NOAA table.
pub fn check_po2(po2: f64) -> Result<(), PlanError> {
    if po2 > MAX_PO2 + PO2_TOLERANCE {
        return Err(PlanError::MaxPo2Exceeded { po2 });
    }
    Ok(())
}

/// Fraction of the CNS clock consumed per minute at `po2`.
///
/// Between 0.5 and the first table row the rate ramps linearly from zero, so
/// the clock never jumps when a diver crosses 0.6 bar.
pub fn cns_rate(po2: f64) -> Result<f64, PlanError> {
    check_po2(po2)?;
    if po2 <= MIN_TOXIC_PO2 {
        return Ok(0.0);
    }
    let (first_po2, first_limit) = CNS_LIMITS[0];
    if po2 < first_po2 {
        let ramp = (po2 - MIN_TOXIC_PO2) / (first_po2 - MIN_TOXIC_PO2);
        return Ok(ramp / first_limit);
    }
    Ok(1.0 / table_limit(po2))
}

/// Single-exposure time limit in minutes at `po2` (infinite below 0.5 bar).
pub fn cns_time_limit(po2: f64) -> Result<f64, PlanError> {
    let rate = cns_rate(po2)?;
    if rate <= 0.0 {
        Ok(f64::INFINITY)
    } else {
        Ok(1.0 / rate)
    }
}

fn table_limit(po2: f64) -> f64 {
    for pair in CNS_LIMITS.windows(2) {
        let (lo_po2, lo_limit) = pair[0];
        let (hi_po2, hi_limit) = pair[1];
        if po2 <= hi_po2 {
            let t = (po2 - lo_po2) / (hi_po2 - lo_po2);
            return lo_limit + t * (hi_limit - lo_limit);
        }
    }
    CNS_LIMITS[CNS_LIMITS.len() - 1].1
}

/// OTUs accrued per minute at `po2`.
pub fn otu_rate(po2: f64) -> Result<f64, PlanError> {
    check_po2(po2)?;
    if po2 <= MIN_TOXIC_PO2 {
        return Ok(0.0);
    }
    Ok(((po2 - MIN_TOXIC_PO2) / MIN_TOXIC_PO2).powf(5.0 / 6.0))
}

/// Minutes at `po2` before the CNS clock (percent) climbs from `current_cns` to `max_cns`.
pub fn max_cns_exposure(po2: f64, current_cns: f64, max_cns: f64) -> Result<f64, PlanError> {
    let limit = cns_time_limit(po2)?;
    let remaining = (max_cns - current_cns).max(0.0) / 100.0;
    if limit.is_infinite() {
        return Ok(f64::INFINITY);
    }
    Ok(remaining * limit)
}

/// Minutes at `po2` before the OTU total climbs from `current_otu` to `max_otu`.
pub fn max_otu_exposure(po2: f64, current_otu: f64, max_otu: f64) -> Result<f64, PlanError> {
    let rate = otu_rate(po2)?;
    if rate <= 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok((max_otu - current_otu).max(0.0) / rate)
}
