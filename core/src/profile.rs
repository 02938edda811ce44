//! Profile segments and the raw/resolved inheritance rule.
//!
//! A raw [`ProfileItem`] may leave out any of its depth, time or gas fields;
//! they are filled from the preceding active item when the profile is walked.

use crate::error::PlanError;
use crate::gas::GasSource;
use crate::models::{DiveId, ProfileItemId};
use crate::units::{UnitSystem, Units};

/// How `segtime` relates to the depth change leading into the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TimeType {
    /// `segtime` is spent at depth, after arriving.
    #[default]
    Segment,
    /// `segtime` includes the travel to the depth.
    IncludesTravel,
}

impl TimeType {
    pub fn code(&self) -> i64 {
        match self {
            TimeType::Segment => 0,
            TimeType::IncludesTravel => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TimeType::Segment),
            1 => Some(TimeType::IncludesTravel),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Validity {
    Invalid,
    #[default]
    Valid,
    /// Never invalidated by edits earlier in the profile.
    AlwaysValid,
}

impl Validity {
    pub fn code(&self) -> i64 {
        match self {
            Validity::Invalid => 0,
            Validity::Valid => 1,
            Validity::AlwaysValid => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Validity::Invalid),
            1 => Some(Validity::Valid),
            2 => Some(Validity::AlwaysValid),
            _ => None,
        }
    }
}

/// Author of a profile item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemSource(pub i64);

impl ItemSource {
    pub const USER: ItemSource = ItemSource(0);
    pub const DECO: ItemSource = ItemSource(1);
}

impl Default for ItemSource {
    fn default() -> Self {
        ItemSource::USER
    }
}

/// Descent and ascent speeds, in depth units per minute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TravelRates {
    descent: f64,
    ascent: f64,
}

impl TravelRates {
    pub fn new(descent: f64, ascent: f64) -> Result<Self, PlanError> {
        let valid = |rate: f64| rate.is_finite() && rate > 0.0;
        if !valid(descent) || !valid(ascent) {
            return Err(PlanError::ProfileInconsistency(format!(
                "travel rates must be positive (descent {descent}, ascent {ascent})"
            )));
        }
        Ok(TravelRates { descent, ascent })
    }

    /// 18/9 m/min metric, 60/30 ft/min imperial.
    pub fn for_units(units: &Units) -> Self {
        match units.system() {
            UnitSystem::Metric => TravelRates {
                descent: 18.0,
                ascent: 9.0,
            },
            UnitSystem::Imperial => TravelRates {
                descent: 60.0,
                ascent: 30.0,
            },
        }
    }

    pub fn descent(&self) -> f64 {
        self.descent
    }

    pub fn ascent(&self) -> f64 {
        self.ascent
    }

    /// Minutes needed to go from `from` to `to`.
    pub fn travel_time(&self, from: f64, to: f64) -> f64 {
        let delta = to - from;
        if delta > 0.0 {
            delta / self.descent
        } else {
            -delta / self.ascent
        }
    }
}

impl Default for TravelRates {
    fn default() -> Self {
        TravelRates::for_units(&Units::metric())
    }
}

/// A profile segment as stored: unset fields inherit from the item before it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileItem {
    pub id: Option<ProfileItemId>,
    pub dive_id: Option<DiveId>,
    pub order: u32,
    pub depth: Option<f64>,
    pub segtime: Option<f64>,
    pub time_type: Option<TimeType>,
    pub gas_source: Option<GasSource>,
    /// Minutes travelling to `depth`. Not inherited.
    pub depth_change_time: Option<f64>,
    pub source: ItemSource,
    pub active: bool,
    pub valid: Validity,
}

impl ProfileItem {
    /// An empty, active item authored by `source`.
    pub fn new(source: ItemSource) -> Self {
        ProfileItem {
            source,
            active: true,
            ..Default::default()
        }
    }

    /// A fully specified user segment.
    pub fn segment(depth: f64, segtime: f64, gas_source: GasSource) -> Self {
        ProfileItem::new(ItemSource::USER)
            .with_depth(depth)
            .with_segtime(segtime)
            .with_gas_source(gas_source)
            .with_time_type(TimeType::Segment)
    }

    /// A deco stop as returned by an algorithm.
    pub fn stop(depth: f64, segtime: f64, gas_source: GasSource) -> Self {
        ProfileItem {
            source: ItemSource::DECO,
            ..ProfileItem::segment(depth, segtime, gas_source)
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_segtime(mut self, segtime: f64) -> Self {
        self.segtime = Some(segtime);
        self
    }

    pub fn with_time_type(mut self, time_type: TimeType) -> Self {
        self.time_type = Some(time_type);
        self
    }

    pub fn with_gas_source(mut self, gas_source: GasSource) -> Self {
        self.gas_source = Some(gas_source);
        self
    }

    pub fn with_depth_change_time(mut self, minutes: f64) -> Self {
        self.depth_change_time = Some(minutes);
        self
    }

    pub fn with_valid(mut self, valid: Validity) -> Self {
        self.valid = valid;
        self
    }

    /// Copy every field `other` sets onto this item.
    pub fn overlay(&mut self, other: &ProfileItem) {
        if other.depth.is_some() {
            self.depth = other.depth;
        }
        if other.segtime.is_some() {
            self.segtime = other.segtime;
        }
        if other.time_type.is_some() {
            self.time_type = other.time_type;
        }
        if other.gas_source.is_some() {
            self.gas_source = other.gas_source;
        }
        if other.depth_change_time.is_some() {
            self.depth_change_time = other.depth_change_time;
        }
        self.valid = other.valid;
    }

    pub fn invalidate(&mut self) {
        if self.valid != Validity::AlwaysValid {
            self.valid = Validity::Invalid;
        }
    }
}

/// A profile segment with every field known.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub order: u32,
    pub start_depth: f64,
    pub depth: f64,
    pub segtime: f64,
    pub time_type: TimeType,
    pub gas_source: GasSource,
    pub depth_change_time: f64,
    pub source: ItemSource,
    pub active: bool,
    pub valid: Validity,
}

impl ResolvedItem {
    /// Minutes spent at `depth` after arriving.
    pub fn time_at_depth(&self) -> f64 {
        match self.time_type {
            TimeType::Segment => self.segtime,
            TimeType::IncludesTravel => (self.segtime - self.depth_change_time).max(0.0),
        }
    }

    /// Total minutes the segment takes, travel included.
    pub fn duration(&self) -> f64 {
        self.depth_change_time + self.time_at_depth()
    }
}

/// Resolve `current` against the resolved item before it.
///
/// Without a predecessor the item must carry depth, segtime and gas itself.
pub fn merge(
    previous: Option<&ResolvedItem>,
    current: &ProfileItem,
    rates: &TravelRates,
) -> Result<ResolvedItem, PlanError> {
    let missing = |field: &str| {
        PlanError::ProfileInconsistency(format!(
            "item {} has no {field} and nothing to inherit it from",
            current.order
        ))
    };

    let depth = current
        .depth
        .or(previous.map(|p| p.depth))
        .ok_or_else(|| missing("depth"))?;
    let segtime = current
        .segtime
        .or(previous.map(|p| p.segtime))
        .ok_or_else(|| missing("segtime"))?;
    let gas_source = current
        .gas_source
        .or(previous.map(|p| p.gas_source))
        .ok_or_else(|| missing("gas source"))?;
    let time_type = current
        .time_type
        .or(previous.map(|p| p.time_type))
        .unwrap_or_default();

    let start_depth = previous.map(|p| p.depth).unwrap_or(0.0);
    let depth_change_time = current
        .depth_change_time
        .unwrap_or_else(|| rates.travel_time(start_depth, depth));

    Ok(ResolvedItem {
        order: current.order,
        start_depth,
        depth,
        segtime,
        time_type,
        gas_source,
        depth_change_time,
        source: current.source,
        active: current.active,
        valid: current.valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::Mix;

    fn ean32() -> GasSource {
        Mix::new(0.32, 0.0).unwrap().into()
    }

    #[test]
    fn test_first_item_must_be_complete() {
        let rates = TravelRates::default();
        let item = ProfileItem::new(ItemSource::USER).with_depth(30.0).with_segtime(20.0);
        let err = merge(None, &item, &rates).unwrap_err();
        assert!(matches!(err, PlanError::ProfileInconsistency(_)));
        assert!(err.to_string().contains("gas source"));

        let first = merge(None, &ProfileItem::segment(30.0, 20.0, ean32()), &rates).unwrap();
        assert_eq!(first.start_depth, 0.0);
        assert_eq!(first.time_type, TimeType::Segment);
        // 30 m at 18 m/min
        assert!((first.depth_change_time - 30.0 / 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_inherits_from_previous() {
        let rates = TravelRates::default();
        let first = merge(None, &ProfileItem::segment(30.0, 20.0, ean32()), &rates).unwrap();

        let item = ProfileItem::new(ItemSource::USER).with_depth(21.0);
        let second = merge(Some(&first), &item, &rates).unwrap();
        assert_eq!(second.depth, 21.0);
        assert_eq!(second.segtime, 20.0);
        assert_eq!(second.gas_source, ean32());
        assert_eq!(second.start_depth, 30.0);
        assert!((second.depth_change_time - 1.0).abs() < 1e-12);

        // same depth: no travel
        let third = merge(Some(&second), &ProfileItem::new(ItemSource::USER), &rates).unwrap();
        assert_eq!(third.depth_change_time, 0.0);
    }

    #[test]
    fn test_explicit_change_time_wins() {
        let rates = TravelRates::default();
        let item = ProfileItem::segment(30.0, 20.0, ean32()).with_depth_change_time(5.0);
        let resolved = merge(None, &item, &rates).unwrap();
        assert_eq!(resolved.depth_change_time, 5.0);
    }

    #[test]
    fn test_time_types() {
        let rates = TravelRates::default();
        let item = ProfileItem::segment(36.0, 25.0, ean32()).with_time_type(TimeType::IncludesTravel);
        let resolved = merge(None, &item, &rates).unwrap();
        assert!((resolved.time_at_depth() - 23.0).abs() < 1e-12);
        assert!((resolved.duration() - 25.0).abs() < 1e-12);

        let item = ProfileItem::segment(36.0, 1.0, ean32()).with_time_type(TimeType::IncludesTravel);
        let resolved = merge(None, &item, &rates).unwrap();
        assert_eq!(resolved.time_at_depth(), 0.0);

        let resolved = merge(None, &ProfileItem::segment(36.0, 25.0, ean32()), &rates).unwrap();
        assert!((resolved.duration() - 27.0).abs() < 1e-12);
    }

    #[test]
    fn test_overlay_and_invalidate() {
        let mut item = ProfileItem::segment(30.0, 20.0, ean32());
        item.overlay(&ProfileItem::new(ItemSource::USER).with_segtime(10.0));
        assert_eq!(item.depth, Some(30.0));
        assert_eq!(item.segtime, Some(10.0));

        item.invalidate();
        assert_eq!(item.valid, Validity::Invalid);

        let mut pinned = ProfileItem::segment(30.0, 20.0, ean32()).with_valid(Validity::AlwaysValid);
        pinned.invalidate();
        assert_eq!(pinned.valid, Validity::AlwaysValid);
    }

    #[test]
    fn test_travel_rates() {
        let rates = TravelRates::for_units(&Units::imperial());
        assert_eq!(rates.travel_time(0.0, 120.0), 2.0);
        assert_eq!(rates.travel_time(60.0, 0.0), 2.0);
        assert!(TravelRates::new(0.0, 9.0).is_err());
        assert!(TravelRates::new(20.0, 10.0).is_ok());
    }

    #[test]
    fn test_codes() {
        for v in [Validity::Invalid, Validity::Valid, Validity::AlwaysValid] {
            assert_eq!(Validity::from_code(v.code()), Some(v));
        }
        assert_eq!(TimeType::from_code(1), Some(TimeType::IncludesTravel));
        assert_eq!(TimeType::from_code(4), None);
    }
}
