use std::collections::BTreeMap;

use tracing::debug;

use crate::error::StorageError;
use crate::models::{DecosetId, DecosetItemId, DiveId, ProfileItemId, SettingsId};
use crate::settings::Settings;
use crate::storage::{DecosetItemRecord, DecosetRecord, DiveRecord, ProfileItemRecord, Storage};

/// Store kept entirely in memory. Starts with the back-gas decoset.
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    decosets: BTreeMap<DecosetId, DecosetRecord>,
    decoset_items: BTreeMap<DecosetItemId, DecosetItemRecord>,
    dives: BTreeMap<DiveId, DiveRecord>,
    profile_items: BTreeMap<ProfileItemId, ProfileItemRecord>,
    settings: BTreeMap<String, Settings>,
    next_id: i64,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let mut decosets = BTreeMap::new();
        decosets.insert(
            DecosetId::BACK_GAS,
            DecosetRecord {
                id: Some(DecosetId::BACK_GAS),
                name: "Back gas".to_string(),
            },
        );
        MemoryStorage {
            decosets,
            decoset_items: BTreeMap::new(),
            dives: BTreeMap::new(),
            profile_items: BTreeMap::new(),
            settings: BTreeMap::new(),
            next_id: 1,
        }
    }

    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Storage for MemoryStorage {
    fn fetch_decoset(&self, id: DecosetId) -> Result<Option<DecosetRecord>, StorageError> {
        Ok(self.decosets.get(&id).cloned())
    }

    fn list_decosets(&self) -> Result<Vec<DecosetRecord>, StorageError> {
        Ok(self.decosets.values().cloned().collect())
    }

    fn fetch_decoset_items(&self, id: DecosetId) -> Result<Vec<DecosetItemRecord>, StorageError> {
        let mut items: Vec<_> = self
            .decoset_items
            .values()
            .filter(|item| item.decoset_id == id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.max_depth_m.cmp(&a.max_depth_m));
        Ok(items)
    }

    fn save_decoset(&mut self, decoset: &DecosetRecord) -> Result<DecosetId, StorageError> {
        let id = match decoset.id {
            Some(DecosetId::BACK_GAS) => return Err(StorageError::BackGasImmutable),
            Some(id) => id,
            None => DecosetId(self.allocate()),
        };
        self.decosets.insert(
            id,
            DecosetRecord {
                id: Some(id),
                name: decoset.name.clone(),
            },
        );
        Ok(id)
    }

    fn save_decoset_item(
        &mut self,
        item: &DecosetItemRecord,
    ) -> Result<DecosetItemId, StorageError> {
        if item.decoset_id == DecosetId::BACK_GAS {
            return Err(StorageError::BackGasImmutable);
        }
        if !self.decosets.contains_key(&item.decoset_id) {
            return Err(StorageError::NotFound {
                kind: "decoset",
                id: item.decoset_id.0,
            });
        }
        let existing = self
            .decoset_items
            .values()
            .find(|row| row.decoset_id == item.decoset_id && row.max_depth_m == item.max_depth_m)
            .and_then(|row| row.id);
        let id = match item.id.or(existing) {
            Some(id) => id,
            None => DecosetItemId(self.allocate()),
        };
        self.decoset_items.insert(
            id,
            DecosetItemRecord {
                id: Some(id),
                ..item.clone()
            },
        );
        Ok(id)
    }

    fn delete_decoset_item(&mut self, id: DecosetId, max_depth_m: i64) -> Result<(), StorageError> {
        if id == DecosetId::BACK_GAS {
            return Err(StorageError::BackGasImmutable);
        }
        self.decoset_items
            .retain(|_, row| !(row.decoset_id == id && row.max_depth_m == max_depth_m));
        Ok(())
    }

    fn delete_decoset(&mut self, id: DecosetId) -> Result<(), StorageError> {
        if id == DecosetId::BACK_GAS {
            return Err(StorageError::BackGasImmutable);
        }
        if self.decosets.remove(&id).is_none() {
            return Err(StorageError::NotFound {
                kind: "decoset",
                id: id.0,
            });
        }
        self.decoset_items.retain(|_, row| row.decoset_id != id);
        for dive in self.dives.values_mut() {
            if dive.decoset_id == id {
                dive.decoset_id = DecosetId::BACK_GAS;
            }
        }
        debug!(decoset = id.0, "decoset deleted");
        Ok(())
    }

    fn fetch_dive(&self, id: DiveId) -> Result<Option<DiveRecord>, StorageError> {
        Ok(self.dives.get(&id).cloned())
    }

    fn fetch_previous_dive(&self, dive: &DiveRecord) -> Result<Option<DiveRecord>, StorageError> {
        let Some(mission) = dive.mission_id else {
            return Ok(None);
        };
        Ok(self
            .dives
            .values()
            .filter(|d| d.mission_id == Some(mission) && d.mission_order < dive.mission_order)
            .max_by_key(|d| d.mission_order)
            .cloned())
    }

    fn save_dive(&mut self, dive: &DiveRecord) -> Result<DiveId, StorageError> {
        let id = match dive.id {
            Some(id) => id,
            None => DiveId(self.allocate()),
        };
        self.dives.insert(
            id,
            DiveRecord {
                id: Some(id),
                ..dive.clone()
            },
        );
        Ok(id)
    }

    fn delete_dive(&mut self, id: DiveId) -> Result<(), StorageError> {
        if self.dives.remove(&id).is_none() {
            return Err(StorageError::NotFound {
                kind: "dive",
                id: id.0,
            });
        }
        self.profile_items.retain(|_, row| row.dive_id != id);
        Ok(())
    }

    fn fetch_profile_items(&self, dive_id: DiveId) -> Result<Vec<ProfileItemRecord>, StorageError> {
        let mut items: Vec<_> = self
            .profile_items
            .values()
            .filter(|row| row.dive_id == dive_id)
            .cloned()
            .collect();
        items.sort_by_key(|row| row.order);
        Ok(items)
    }

    fn save_profile_item(
        &mut self,
        item: &ProfileItemRecord,
    ) -> Result<ProfileItemId, StorageError> {
        if !self.dives.contains_key(&item.dive_id) {
            return Err(StorageError::NotFound {
                kind: "dive",
                id: item.dive_id.0,
            });
        }
        let id = match item.id {
            Some(id) => id,
            None => ProfileItemId(self.allocate()),
        };
        self.profile_items.insert(
            id,
            ProfileItemRecord {
                id: Some(id),
                ..item.clone()
            },
        );
        Ok(id)
    }

    fn delete_profile_item(&mut self, id: ProfileItemId) -> Result<(), StorageError> {
        self.profile_items.remove(&id);
        Ok(())
    }

    fn upsert_settings(&mut self, settings: &Settings) -> Result<(), StorageError> {
        self.settings.insert(settings.id.0.clone(), settings.clone());
        Ok(())
    }

    fn load_settings(&self, id: &SettingsId) -> Result<Option<Settings>, StorageError> {
        Ok(self.settings.get(&id.0).cloned())
    }
}
