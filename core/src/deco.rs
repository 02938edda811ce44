use std::sync::Arc;

use crate::decoset::Decoset;
use crate::error::PlanError;
use crate::gas::{GasSource, Mix};
use crate::profile::{ProfileItem, ResolvedItem};

/// Contract a decompression model fulfils to be driven by the profile executor.
///
/// Configuration and tissue state are opaque byte blobs owned by the
/// implementation; the core only stores and hands them back.
pub trait DecoAlgorithm {
    fn load_config(&mut self, config: &[u8]) -> Result<(), PlanError>;
    fn load_state(&mut self, state: &[u8]) -> Result<(), PlanError>;
    fn state(&self) -> Vec<u8>;

    fn set_decoset(&mut self, decoset: Arc<Decoset>);

    /// Off-gas at the surface of a site at `altitude` metres for `minutes`.
    fn surface_interval(&mut self, altitude: f64, minutes: f64, gas: &Mix)
        -> Result<(), PlanError>;

    /// Process one segment; returns the stops required before it, in order.
    fn run(&mut self, item: &ResolvedItem) -> Result<Vec<ProfileItem>, PlanError>;

    /// Stops required on the final ascent, in order.
    fn surface(&mut self) -> Result<Vec<ProfileItem>, PlanError>;

    /// Minutes since the start of the dive.
    fn runtime(&self) -> f64;

    /// Gas being breathed at the end of the last processed segment.
    fn gas_source(&self) -> GasSource;
}
