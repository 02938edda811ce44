pub mod cns_otu;
pub mod codec;
pub mod deco;
pub mod deco_mock;
pub mod decoset;
pub mod error;
pub mod executor;
pub mod ffi;
pub mod gas;
pub mod localize;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod oxtox;
pub mod profile;
pub mod settings;
pub mod sqlite;
pub mod storage;
pub mod units;

uniffi::setup_scaffolding!();

pub use cns_otu::CnsOtu;
pub use codec::WireGas;
pub use deco::DecoAlgorithm;
pub use decoset::{Decoset, DecosetItem};
pub use error::{PlanError, StorageError};
pub use executor::ProfileExecutor;
pub use gas::{GasSource, Mix, Setpoint};
pub use localize::{English, Localizer, StringToken};
pub use memory::MemoryStorage;
pub use models::{DecosetId, DecosetItemId, Dive, DiveId, MissionId, ProfileItemId, SettingsId};
pub use profile::{merge, ItemSource, ProfileItem, ResolvedItem, TimeType, TravelRates, Validity};
pub use settings::Settings;
pub use sqlite::SqliteStorage;
pub use storage::{load_decoset, load_dive, save_decoset, save_dive, Storage};
pub use units::{UnitSystem, Units};
