use std::sync::Arc;

use tracing::debug;

use crate::cns_otu::CnsOtu;
use crate::deco::DecoAlgorithm;
use crate::decoset::Decoset;
use crate::error::PlanError;
use crate::gas::Mix;
use crate::profile::ProfileItem;
use crate::units::Units;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiveId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissionId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecosetId(pub i64);

impl DecosetId {
    /// The reserved, immutable back-gas decoset.
    pub const BACK_GAS: DecosetId = DecosetId(0);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecosetItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileItemId(pub i64);

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SettingsId(pub String);

impl Default for SettingsId {
    fn default() -> Self {
        SettingsId("default".to_string())
    }
}

/// One planned dive: its conditions, profile and end-of-dive results.
#[derive(Clone, Debug)]
pub struct Dive {
    pub id: Option<DiveId>,
    pub mission_id: Option<MissionId>,
    pub mission_order: u32,
    pub name: String,
    pub units: Units,
    /// Metres above sea level.
    pub altitude: f64,
    /// Minutes spent at `altitude` before the dive.
    pub acclimatization_time: f64,
    /// Minutes since the previous dive surfaced.
    pub surface_interval: f64,
    decoset: Arc<Decoset>,
    pub deco_config: Vec<u8>,
    pub final_deco_state: Vec<u8>,
    pub final_cns: f64,
    pub final_otu: f64,
    pub profile: Vec<ProfileItem>,
    pub previous: Option<Arc<Dive>>,
    dirty: bool,
}

impl Dive {
    pub fn new(name: impl Into<String>, units: Units) -> Self {
        Dive {
            id: None,
            mission_id: None,
            mission_order: 0,
            name: name.into(),
            units,
            altitude: 0.0,
            acclimatization_time: 0.0,
            surface_interval: 0.0,
            decoset: Arc::new(Decoset::back_gas()),
            deco_config: Vec::new(),
            final_deco_state: Vec::new(),
            final_cns: 0.0,
            final_otu: 0.0,
            profile: Vec::new(),
            previous: None,
            dirty: false,
        }
    }

    pub fn decoset(&self) -> &Arc<Decoset> {
        &self.decoset
    }

    pub fn decoset_id(&self) -> DecosetId {
        self.decoset.id().unwrap_or(DecosetId::BACK_GAS)
    }

    /// Switch decosets. Every profile item not pinned valid must be recomputed.
    pub fn set_decoset(&mut self, decoset: Arc<Decoset>) {
        if Arc::ptr_eq(&self.decoset, &decoset) {
            return;
        }
        self.decoset = decoset;
        for item in &mut self.profile {
            item.invalidate();
        }
        self.dirty = true;
    }

    /// Whether deco or exposure results changed since the last [`Dive::mark_clean`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Exposure accumulator seeded with the previous dive's finals.
    pub fn build_cns_otu(&self) -> CnsOtu {
        let (cns, otu) = self
            .previous
            .as_ref()
            .map(|p| (p.final_cns, p.final_otu))
            .unwrap_or((0.0, 0.0));
        CnsOtu::new(self.altitude, self.units, cns, otu)
    }

    /// Prepare `alg` for this dive.
    pub fn initialize_deco(&self, alg: &mut dyn DecoAlgorithm) -> Result<(), PlanError> {
        alg.load_config(&self.deco_config)?;
        if let Some(previous) = &self.previous {
            alg.load_state(&previous.final_deco_state)?;
        }
        alg.set_decoset(Arc::clone(&self.decoset));

        let air = Mix::air();
        if let Some(previous) = &self.previous {
            if self.surface_interval > self.acclimatization_time {
                // surfaced at the previous site before travelling here
                alg.surface_interval(
                    previous.altitude,
                    self.surface_interval - self.acclimatization_time,
                    &air,
                )?;
            }
        }
        alg.surface_interval(self.altitude, self.acclimatization_time, &air)?;
        debug!(dive = ?self.id, altitude = self.altitude, "deco initialized");
        Ok(())
    }

    pub fn save_deco(&mut self, alg: &dyn DecoAlgorithm) {
        let state = alg.state();
        if state != self.final_deco_state {
            self.final_deco_state = state;
            self.dirty = true;
        }
    }

    pub fn save_cns_otu(&mut self, state: &CnsOtu) {
        if state.cns() != self.final_cns {
            self.final_cns = state.cns();
            self.dirty = true;
        }
        if state.otu() != self.final_otu {
            self.final_otu = state.otu();
            self.dirty = true;
        }
    }
}
