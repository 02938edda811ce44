//! Persistence collaborator and the row layout shared by every backend.
//!
//! Backends store flat records: depths in metres, gas sources as scaled
//! integer columns. Conversion to and from the domain types happens here so
//! that each backend only moves rows.

use std::sync::Arc;

use tracing::debug;

use crate::decoset::{Decoset, DecosetItem};
use crate::error::{PlanError, StorageError};
use crate::gas::{GasSource, Mix, Setpoint};
use crate::models::{
    DecosetId, DecosetItemId, Dive, DiveId, MissionId, ProfileItemId, SettingsId,
};
use crate::profile::{ItemSource, ProfileItem, TimeType, Validity};
use crate::settings::Settings;
use crate::units::{convert_depth, UnitSystem, Units};

/// Gas source as three nullable integer columns.
///
/// `setpoint_x10` set means a setpoint; the fraction columns are then its
/// diluent, if present. Fractions alone mean a mix. All null means no gas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasColumns {
    pub setpoint_x10: Option<i64>,
    pub o2_x1000: Option<i64>,
    pub he_x1000: Option<i64>,
}

impl GasColumns {
    pub fn encode(gas: Option<&GasSource>) -> Self {
        let fractions = |mix: &Mix| {
            (
                Some((mix.o2() * 1000.0).round() as i64),
                Some((mix.he() * 1000.0).round() as i64),
            )
        };
        match gas {
            None => GasColumns::default(),
            Some(GasSource::Mix(mix)) => {
                let (o2_x1000, he_x1000) = fractions(mix);
                GasColumns {
                    setpoint_x10: None,
                    o2_x1000,
                    he_x1000,
                }
            }
            Some(GasSource::Setpoint(sp)) => {
                let (o2_x1000, he_x1000) = sp.diluent().as_ref().map(fractions).unwrap_or((None, None));
                GasColumns {
                    setpoint_x10: Some((sp.po2_setting() * 10.0).round() as i64),
                    o2_x1000,
                    he_x1000,
                }
            }
        }
    }

    pub fn decode(&self) -> Result<Option<GasSource>, StorageError> {
        let corrupt = |e: PlanError| StorageError::Corrupt(e.to_string());
        let mix = match (self.o2_x1000, self.he_x1000) {
            (Some(o2), Some(he)) => {
                Some(Mix::new(o2 as f64 / 1000.0, he as f64 / 1000.0).map_err(corrupt)?)
            }
            (None, None) => None,
            _ => {
                return Err(StorageError::Corrupt(
                    "gas has only one fraction column set".to_string(),
                ))
            }
        };
        match self.setpoint_x10 {
            Some(po2) => {
                let sp = Setpoint::new(po2 as f64 / 10.0, mix).map_err(corrupt)?;
                Ok(Some(sp.into()))
            }
            None => Ok(mix.map(GasSource::Mix)),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecosetRecord {
    pub id: Option<DecosetId>,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecosetItemRecord {
    pub id: Option<DecosetItemId>,
    pub decoset_id: DecosetId,
    pub max_depth_m: i64,
    pub gas: GasColumns,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DiveRecord {
    pub id: Option<DiveId>,
    pub mission_id: Option<MissionId>,
    pub mission_order: u32,
    pub name: String,
    pub units: UnitSystem,
    pub altitude_m: f64,
    pub acclimatization_time: f64,
    pub surface_interval: f64,
    pub decoset_id: DecosetId,
    pub deco_config: Vec<u8>,
    pub final_deco_state: Vec<u8>,
    pub final_cns: f64,
    pub final_otu: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProfileItemRecord {
    pub id: Option<ProfileItemId>,
    pub dive_id: DiveId,
    pub order: u32,
    pub depth_m: Option<f64>,
    pub segtime: Option<f64>,
    pub time_type: Option<i64>,
    pub gas: GasColumns,
    pub depth_change_time: Option<f64>,
    pub source: i64,
    pub active: bool,
    pub valid: i64,
}

/// Persistence consumed by the planner.
///
/// Every backend enforces the same rules: the back-gas decoset is never
/// modified, deleting a decoset moves its dives to back gas, and deleting a
/// dive deletes its profile items.
pub trait Storage {
    fn fetch_decoset(&self, id: DecosetId) -> Result<Option<DecosetRecord>, StorageError>;
    fn list_decosets(&self) -> Result<Vec<DecosetRecord>, StorageError>;
    fn fetch_decoset_items(&self, id: DecosetId) -> Result<Vec<DecosetItemRecord>, StorageError>;
    fn save_decoset(&mut self, decoset: &DecosetRecord) -> Result<DecosetId, StorageError>;
    /// Insert or replace the rule at the item's depth.
    fn save_decoset_item(&mut self, item: &DecosetItemRecord)
        -> Result<DecosetItemId, StorageError>;
    fn delete_decoset_item(&mut self, id: DecosetId, max_depth_m: i64) -> Result<(), StorageError>;
    fn delete_decoset(&mut self, id: DecosetId) -> Result<(), StorageError>;

    fn fetch_dive(&self, id: DiveId) -> Result<Option<DiveRecord>, StorageError>;
    /// The dive before `dive` in its mission, if any.
    fn fetch_previous_dive(&self, dive: &DiveRecord) -> Result<Option<DiveRecord>, StorageError>;
    fn save_dive(&mut self, dive: &DiveRecord) -> Result<DiveId, StorageError>;
    fn delete_dive(&mut self, id: DiveId) -> Result<(), StorageError>;

    fn fetch_profile_items(&self, dive_id: DiveId) -> Result<Vec<ProfileItemRecord>, StorageError>;
    fn save_profile_item(&mut self, item: &ProfileItemRecord)
        -> Result<ProfileItemId, StorageError>;
    fn delete_profile_item(&mut self, id: ProfileItemId) -> Result<(), StorageError>;

    fn upsert_settings(&mut self, settings: &Settings) -> Result<(), StorageError>;
    fn load_settings(&self, id: &SettingsId) -> Result<Option<Settings>, StorageError>;
}

fn to_meters(depth: f64, units: &Units) -> f64 {
    convert_depth(depth, units.system(), UnitSystem::Metric)
}

impl DiveRecord {
    pub fn from_dive(dive: &Dive) -> Self {
        DiveRecord {
            id: dive.id,
            mission_id: dive.mission_id,
            mission_order: dive.mission_order,
            name: dive.name.clone(),
            units: dive.units.system(),
            altitude_m: dive.altitude,
            acclimatization_time: dive.acclimatization_time,
            surface_interval: dive.surface_interval,
            decoset_id: dive.decoset_id(),
            deco_config: dive.deco_config.clone(),
            final_deco_state: dive.final_deco_state.clone(),
            final_cns: dive.final_cns,
            final_otu: dive.final_otu,
        }
    }

    /// A dive with this record's fields, its profile still empty.
    pub fn to_dive(&self, decoset: Arc<Decoset>) -> Dive {
        let mut dive = Dive::new(self.name.clone(), Units::new(self.units));
        dive.id = self.id;
        dive.mission_id = self.mission_id;
        dive.mission_order = self.mission_order;
        dive.altitude = self.altitude_m;
        dive.acclimatization_time = self.acclimatization_time;
        dive.surface_interval = self.surface_interval;
        dive.set_decoset(decoset);
        dive.deco_config = self.deco_config.clone();
        dive.final_deco_state = self.final_deco_state.clone();
        dive.final_cns = self.final_cns;
        dive.final_otu = self.final_otu;
        dive.mark_clean();
        dive
    }
}

impl ProfileItemRecord {
    pub fn from_item(dive_id: DiveId, item: &ProfileItem, units: &Units) -> Self {
        ProfileItemRecord {
            id: item.id,
            dive_id,
            order: item.order,
            depth_m: item.depth.map(|d| to_meters(d, units)),
            segtime: item.segtime,
            time_type: item.time_type.map(|t| t.code()),
            gas: GasColumns::encode(item.gas_source.as_ref()),
            depth_change_time: item.depth_change_time,
            source: item.source.0,
            active: item.active,
            valid: item.valid.code(),
        }
    }

    pub fn to_item(&self, units: &Units) -> Result<ProfileItem, StorageError> {
        let time_type = match self.time_type {
            Some(code) => Some(TimeType::from_code(code).ok_or_else(|| {
                StorageError::Corrupt(format!("unknown time type {code}"))
            })?),
            None => None,
        };
        let valid = Validity::from_code(self.valid)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown validity {}", self.valid)))?;
        Ok(ProfileItem {
            id: self.id,
            dive_id: Some(self.dive_id),
            order: self.order,
            depth: self.depth_m.map(|d| units.convert_depth(d, UnitSystem::Metric)),
            segtime: self.segtime,
            time_type,
            gas_source: self.gas.decode()?,
            depth_change_time: self.depth_change_time,
            source: ItemSource(self.source),
            active: self.active,
            valid,
        })
    }
}

/// Load a decoset with its rules, depths in `units`.
pub fn load_decoset<S: Storage + ?Sized>(
    store: &S,
    id: DecosetId,
    units: &Units,
) -> Result<Decoset, StorageError> {
    let record = store
        .fetch_decoset(id)?
        .ok_or(StorageError::NotFound {
            kind: "decoset",
            id: id.0,
        })?;
    let mut decoset = Decoset::with_id(id, record.name);
    for row in store.fetch_decoset_items(id)? {
        let gas = row.gas.decode()?.ok_or_else(|| {
            StorageError::Corrupt(format!("decoset {} item without gas", id.0))
        })?;
        decoset.set_gas_source(row.max_depth_m.max(0) as u32, Some(gas));
    }
    Ok(decoset.converted(UnitSystem::Metric, units.system()))
}

/// Write a decoset and replace its rules. Returns the id it was stored under.
pub fn save_decoset<S: Storage + ?Sized>(
    store: &mut S,
    decoset: &Decoset,
    units: &Units,
) -> Result<DecosetId, StorageError> {
    if decoset.is_back_gas() {
        return Err(StorageError::BackGasImmutable);
    }
    let id = store.save_decoset(&DecosetRecord {
        id: decoset.id(),
        name: decoset.name().to_string(),
    })?;
    let metric = decoset.converted(units.system(), UnitSystem::Metric);
    for row in store.fetch_decoset_items(id)? {
        let kept = metric.items().any(|item| item.max_depth as i64 == row.max_depth_m);
        if !kept {
            store.delete_decoset_item(id, row.max_depth_m)?;
        }
    }
    for DecosetItem {
        max_depth,
        gas_source,
    } in metric.items()
    {
        store.save_decoset_item(&DecosetItemRecord {
            id: None,
            decoset_id: id,
            max_depth_m: max_depth as i64,
            gas: GasColumns::encode(Some(&gas_source)),
        })?;
    }
    debug!(decoset = id.0, items = metric.len(), "decoset saved");
    Ok(id)
}

/// Assemble a dive with its decoset, profile and the dive before it.
pub fn load_dive<S: Storage + ?Sized>(store: &S, id: DiveId) -> Result<Dive, StorageError> {
    let record = store.fetch_dive(id)?.ok_or(StorageError::NotFound {
        kind: "dive",
        id: id.0,
    })?;
    assemble_dive(store, record)
}

fn assemble_dive<S: Storage + ?Sized>(store: &S, record: DiveRecord) -> Result<Dive, StorageError> {
    let units = Units::new(record.units);
    let decoset = if record.decoset_id == DecosetId::BACK_GAS {
        Decoset::back_gas()
    } else {
        load_decoset(store, record.decoset_id, &units)?
    };
    let previous = match store.fetch_previous_dive(&record)? {
        Some(prev) => Some(Arc::new(assemble_dive(store, prev)?)),
        None => None,
    };
    let id = record.id.ok_or_else(|| StorageError::Corrupt("dive row without id".to_string()))?;

    let mut dive = record.to_dive(Arc::new(decoset));
    dive.previous = previous;
    let mut rows = store.fetch_profile_items(id)?;
    rows.sort_by_key(|r| r.order);
    dive.profile = rows
        .iter()
        .map(|row| row.to_item(&units))
        .collect::<Result<_, _>>()?;
    debug!(dive = id.0, items = dive.profile.len(), "dive loaded");
    Ok(dive)
}

/// Write a dive and its profile, assigning ids to anything new.
pub fn save_dive<S: Storage + ?Sized>(store: &mut S, dive: &mut Dive) -> Result<DiveId, PlanError> {
    let id = store.save_dive(&DiveRecord::from_dive(dive))?;
    dive.id = Some(id);
    let units = dive.units;
    for (order, item) in dive.profile.iter_mut().enumerate() {
        item.order = order as u32;
        item.dive_id = Some(id);
        let item_id = store.save_profile_item(&ProfileItemRecord::from_item(id, item, &units))?;
        item.id = Some(item_id);
    }
    dive.mark_clean();
    Ok(id)
}
