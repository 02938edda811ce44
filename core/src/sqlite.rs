use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::error::StorageError;
use crate::migrations;
use crate::models::{DecosetId, DecosetItemId, DiveId, MissionId, ProfileItemId, SettingsId};
use crate::settings::Settings;
use crate::storage::{
    DecosetItemRecord, DecosetRecord, DiveRecord, GasColumns, ProfileItemRecord, Storage,
};
use crate::units::UnitSystem;

const DIVE_COLUMNS: &str = "id, mission_id, mission_order, name, units, altitude, \
     acclimatization_time, surface_interval, decoset_id, deco_config, final_deco_state, \
     final_cns, final_otu";

const PROFILE_ITEM_COLUMNS: &str = "id, dive_id, item_order, depth, segtime, time_type, \
     setpoint, o2, he, depth_change_time, source, active, valid";

/// SQLite-backed store.
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::ensure_schema(&mut conn)?;
        Ok(SqliteStorage { conn })
    }
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, message.into())
}

fn unit_system(index: usize, code: i64) -> rusqlite::Result<UnitSystem> {
    UnitSystem::from_code(code)
        .ok_or_else(|| conversion_error(index, format!("unknown unit system {code}")))
}

fn dive_from_row(row: &Row<'_>) -> rusqlite::Result<DiveRecord> {
    Ok(DiveRecord {
        id: Some(DiveId(row.get(0)?)),
        mission_id: row.get::<_, Option<i64>>(1)?.map(MissionId),
        mission_order: row.get(2)?,
        name: row.get(3)?,
        units: unit_system(4, row.get(4)?)?,
        altitude_m: row.get(5)?,
        acclimatization_time: row.get(6)?,
        surface_interval: row.get(7)?,
        decoset_id: DecosetId(row.get(8)?),
        deco_config: row.get::<_, Option<Vec<u8>>>(9)?.unwrap_or_default(),
        final_deco_state: row.get::<_, Option<Vec<u8>>>(10)?.unwrap_or_default(),
        final_cns: row.get(11)?,
        final_otu: row.get(12)?,
    })
}

fn profile_item_from_row(row: &Row<'_>) -> rusqlite::Result<ProfileItemRecord> {
    Ok(ProfileItemRecord {
        id: Some(ProfileItemId(row.get(0)?)),
        dive_id: DiveId(row.get(1)?),
        order: row.get(2)?,
        depth_m: row.get(3)?,
        segtime: row.get(4)?,
        time_type: row.get(5)?,
        gas: GasColumns {
            setpoint_x10: row.get(6)?,
            o2_x1000: row.get(7)?,
            he_x1000: row.get(8)?,
        },
        depth_change_time: row.get(9)?,
        source: row.get(10)?,
        active: row.get(11)?,
        valid: row.get(12)?,
    })
}

impl Storage for SqliteStorage {
    fn fetch_decoset(&self, id: DecosetId) -> Result<Option<DecosetRecord>, StorageError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, name FROM decosets WHERE id = ?1",
                [id.0],
                |row| {
                    Ok(DecosetRecord {
                        id: Some(DecosetId(row.get(0)?)),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn list_decosets(&self) -> Result<Vec<DecosetRecord>, StorageError> {
        let mut stmt = self.conn.prepare("SELECT id, name FROM decosets ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok(DecosetRecord {
                id: Some(DecosetId(row.get(0)?)),
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn fetch_decoset_items(&self, id: DecosetId) -> Result<Vec<DecosetItemRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, decoset_id, max_depth, setpoint, o2, he FROM decoset_items \
             WHERE decoset_id = ?1 ORDER BY max_depth DESC",
        )?;
        let rows = stmt.query_map([id.0], |row| {
            Ok(DecosetItemRecord {
                id: Some(DecosetItemId(row.get(0)?)),
                decoset_id: DecosetId(row.get(1)?),
                max_depth_m: row.get(2)?,
                gas: GasColumns {
                    setpoint_x10: row.get(3)?,
                    o2_x1000: row.get(4)?,
                    he_x1000: row.get(5)?,
                },
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn save_decoset(&mut self, decoset: &DecosetRecord) -> Result<DecosetId, StorageError> {
        match decoset.id {
            Some(DecosetId::BACK_GAS) => Err(StorageError::BackGasImmutable),
            Some(id) => {
                self.conn.execute(
                    "INSERT INTO decosets (id, name) VALUES (?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                    params![id.0, decoset.name],
                )?;
                Ok(id)
            }
            None => {
                self.conn
                    .execute("INSERT INTO decosets (name) VALUES (?1)", [&decoset.name])?;
                Ok(DecosetId(self.conn.last_insert_rowid()))
            }
        }
    }

    fn save_decoset_item(
        &mut self,
        item: &DecosetItemRecord,
    ) -> Result<DecosetItemId, StorageError> {
        if item.decoset_id == DecosetId::BACK_GAS {
            return Err(StorageError::BackGasImmutable);
        }
        if self.fetch_decoset(item.decoset_id)?.is_none() {
            return Err(StorageError::NotFound {
                kind: "decoset",
                id: item.decoset_id.0,
            });
        }
        self.conn.execute(
            "INSERT INTO decoset_items (decoset_id, max_depth, setpoint, o2, he) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(decoset_id, max_depth) DO UPDATE SET \
             setpoint = excluded.setpoint, o2 = excluded.o2, he = excluded.he",
            params![
                item.decoset_id.0,
                item.max_depth_m,
                item.gas.setpoint_x10,
                item.gas.o2_x1000,
                item.gas.he_x1000
            ],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM decoset_items WHERE decoset_id = ?1 AND max_depth = ?2",
            [item.decoset_id.0, item.max_depth_m],
            |row| row.get(0),
        )?;
        Ok(DecosetItemId(id))
    }

    fn delete_decoset_item(&mut self, id: DecosetId, max_depth_m: i64) -> Result<(), StorageError> {
        if id == DecosetId::BACK_GAS {
            return Err(StorageError::BackGasImmutable);
        }
        self.conn.execute(
            "DELETE FROM decoset_items WHERE decoset_id = ?1 AND max_depth = ?2",
            [id.0, max_depth_m],
        )?;
        Ok(())
    }

    fn delete_decoset(&mut self, id: DecosetId) -> Result<(), StorageError> {
        if id == DecosetId::BACK_GAS {
            return Err(StorageError::BackGasImmutable);
        }
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE dives SET decoset_id = ?1 WHERE decoset_id = ?2",
            [DecosetId::BACK_GAS.0, id.0],
        )?;
        tx.execute("DELETE FROM decoset_items WHERE decoset_id = ?1", [id.0])?;
        let deleted = tx.execute("DELETE FROM decosets WHERE id = ?1", [id.0])?;
        if deleted == 0 {
            return Err(StorageError::NotFound {
                kind: "decoset",
                id: id.0,
            });
        }
        tx.commit()?;
        debug!(decoset = id.0, "decoset deleted");
        Ok(())
    }

    fn fetch_dive(&self, id: DiveId) -> Result<Option<DiveRecord>, StorageError> {
        let sql = format!("SELECT {DIVE_COLUMNS} FROM dives WHERE id = ?1");
        Ok(self.conn.query_row(&sql, [id.0], dive_from_row).optional()?)
    }

    fn fetch_previous_dive(&self, dive: &DiveRecord) -> Result<Option<DiveRecord>, StorageError> {
        let Some(mission) = dive.mission_id else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT {DIVE_COLUMNS} FROM dives WHERE mission_id = ?1 AND mission_order < ?2 \
             ORDER BY mission_order DESC LIMIT 1"
        );
        Ok(self
            .conn
            .query_row(&sql, params![mission.0, dive.mission_order], dive_from_row)
            .optional()?)
    }

    fn save_dive(&mut self, dive: &DiveRecord) -> Result<DiveId, StorageError> {
        self.conn.execute(
            "INSERT INTO dives (id, mission_id, mission_order, name, units, altitude, \
             acclimatization_time, surface_interval, decoset_id, deco_config, final_deco_state, \
             final_cns, final_otu) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT(id) DO UPDATE SET \
             mission_id = excluded.mission_id, mission_order = excluded.mission_order, \
             name = excluded.name, units = excluded.units, altitude = excluded.altitude, \
             acclimatization_time = excluded.acclimatization_time, \
             surface_interval = excluded.surface_interval, decoset_id = excluded.decoset_id, \
             deco_config = excluded.deco_config, final_deco_state = excluded.final_deco_state, \
             final_cns = excluded.final_cns, final_otu = excluded.final_otu",
            params![
                dive.id.map(|id| id.0),
                dive.mission_id.map(|id| id.0),
                dive.mission_order,
                dive.name,
                dive.units.code(),
                dive.altitude_m,
                dive.acclimatization_time,
                dive.surface_interval,
                dive.decoset_id.0,
                dive.deco_config,
                dive.final_deco_state,
                dive.final_cns,
                dive.final_otu
            ],
        )?;
        Ok(dive.id.unwrap_or_else(|| DiveId(self.conn.last_insert_rowid())))
    }

    fn delete_dive(&mut self, id: DiveId) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM profile_items WHERE dive_id = ?1", [id.0])?;
        let deleted = tx.execute("DELETE FROM dives WHERE id = ?1", [id.0])?;
        if deleted == 0 {
            return Err(StorageError::NotFound {
                kind: "dive",
                id: id.0,
            });
        }
        tx.commit()?;
        Ok(())
    }

    fn fetch_profile_items(&self, dive_id: DiveId) -> Result<Vec<ProfileItemRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROFILE_ITEM_COLUMNS} FROM profile_items WHERE dive_id = ?1 ORDER BY item_order"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([dive_id.0], profile_item_from_row)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn save_profile_item(
        &mut self,
        item: &ProfileItemRecord,
    ) -> Result<ProfileItemId, StorageError> {
        if self.fetch_dive(item.dive_id)?.is_none() {
            return Err(StorageError::NotFound {
                kind: "dive",
                id: item.dive_id.0,
            });
        }
        self.conn.execute(
            "INSERT INTO profile_items (id, dive_id, item_order, depth, segtime, time_type, \
             setpoint, o2, he, depth_change_time, source, active, valid) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13) \
             ON CONFLICT(id) DO UPDATE SET \
             dive_id = excluded.dive_id, item_order = excluded.item_order, \
             depth = excluded.depth, segtime = excluded.segtime, time_type = excluded.time_type, \
             setpoint = excluded.setpoint, o2 = excluded.o2, he = excluded.he, \
             depth_change_time = excluded.depth_change_time, source = excluded.source, \
             active = excluded.active, valid = excluded.valid",
            params![
                item.id.map(|id| id.0),
                item.dive_id.0,
                item.order,
                item.depth_m,
                item.segtime,
                item.time_type,
                item.gas.setpoint_x10,
                item.gas.o2_x1000,
                item.gas.he_x1000,
                item.depth_change_time,
                item.source,
                item.active,
                item.valid
            ],
        )?;
        Ok(item
            .id
            .unwrap_or_else(|| ProfileItemId(self.conn.last_insert_rowid())))
    }

    fn delete_profile_item(&mut self, id: ProfileItemId) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM profile_items WHERE id = ?1", [id.0])?;
        Ok(())
    }

    fn upsert_settings(&mut self, settings: &Settings) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO settings (id, units, descent_rate, ascent_rate, max_po2_bottom, \
             max_po2_deco, max_cns, max_otu) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
             ON CONFLICT(id) DO UPDATE SET units = excluded.units, \
             descent_rate = excluded.descent_rate, ascent_rate = excluded.ascent_rate, \
             max_po2_bottom = excluded.max_po2_bottom, max_po2_deco = excluded.max_po2_deco, \
             max_cns = excluded.max_cns, max_otu = excluded.max_otu",
            params![
                settings.id.0,
                settings.unit_system.code(),
                settings.descent_rate,
                settings.ascent_rate,
                settings.max_po2_bottom,
                settings.max_po2_deco,
                settings.max_cns,
                settings.max_otu
            ],
        )?;
        Ok(())
    }

    fn load_settings(&self, id: &SettingsId) -> Result<Option<Settings>, StorageError> {
        let settings = self
            .conn
            .query_row(
                "SELECT id, units, descent_rate, ascent_rate, max_po2_bottom, max_po2_deco, \
                 max_cns, max_otu FROM settings WHERE id = ?1",
                [&id.0],
                |row| {
                    Ok(Settings {
                        id: SettingsId(row.get(0)?),
                        unit_system: unit_system(1, row.get(1)?)?,
                        descent_rate: row.get(2)?,
                        ascent_rate: row.get(3)?,
                        max_po2_bottom: row.get(4)?,
                        max_po2_deco: row.get(5)?,
                        max_cns: row.get(6)?,
                        max_otu: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(settings)
    }
}
