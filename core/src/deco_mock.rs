use std::collections::BTreeMap;
use std::sync::Arc;

use crate::deco::DecoAlgorithm;
use crate::decoset::Decoset;
use crate::error::PlanError;
use crate::gas::{GasSource, Mix};
use crate::models::DecosetId;
use crate::profile::{ProfileItem, ResolvedItem, TravelRates};

/// One call received by [`MockDecoAlgorithm`].
#[derive(Clone, Debug, PartialEq)]
pub enum DecoCall {
    LoadConfig(Vec<u8>),
    LoadState(Vec<u8>),
    SetDecoset(Option<DecosetId>),
    SurfaceInterval { altitude: f64, minutes: f64, gas: Mix },
    Run { order: u32, depth: f64 },
    Surface,
}

/// Scripted algorithm: returns canned stops and records every call.
///
/// `stops` is keyed by the index of the `run` call (0 for the first active
/// item). Runtime is tracked from the travel rates so the executor's final
/// ascent timing can be checked.
#[derive(Clone, Debug, Default)]
pub struct MockDecoAlgorithm {
    pub calls: Vec<DecoCall>,
    pub stops: BTreeMap<usize, Vec<ProfileItem>>,
    pub surface_stops: Vec<ProfileItem>,
    pub rates: TravelRates,
    pub state: Vec<u8>,
    pub fail_on_run: Option<usize>,
    runs: usize,
    runtime: f64,
    depth: f64,
    gas: Option<GasSource>,
    decoset: Option<Arc<Decoset>>,
}

impl MockDecoAlgorithm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stop before the `run_index`-th active item.
    pub fn with_stop(mut self, run_index: usize, stop: ProfileItem) -> Self {
        self.stops.entry(run_index).or_default().push(stop);
        self
    }

    pub fn with_surface_stop(mut self, stop: ProfileItem) -> Self {
        self.surface_stops.push(stop);
        self
    }

    pub fn with_state(mut self, state: Vec<u8>) -> Self {
        self.state = state;
        self
    }

    pub fn decoset(&self) -> Option<&Arc<Decoset>> {
        self.decoset.as_ref()
    }

    pub fn surface_intervals(&self) -> Vec<(f64, f64)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                DecoCall::SurfaceInterval {
                    altitude, minutes, ..
                } => Some((*altitude, *minutes)),
                _ => None,
            })
            .collect()
    }

    fn take_stops(&mut self, stops: Vec<ProfileItem>) -> Result<Vec<ProfileItem>, PlanError> {
        let mut out = Vec::with_capacity(stops.len());
        for mut stop in stops {
            let depth = stop
                .depth
                .ok_or_else(|| PlanError::DecoAlgorithm("scripted stop without depth".to_string()))?;
            let travel = stop
                .depth_change_time
                .unwrap_or_else(|| self.rates.travel_time(self.depth, depth));
            stop.depth_change_time = Some(travel);
            self.runtime += travel + stop.segtime.unwrap_or(0.0);
            self.depth = depth;
            if stop.gas_source.is_some() {
                self.gas = stop.gas_source;
            }
            out.push(stop);
        }
        Ok(out)
    }
}

impl DecoAlgorithm for MockDecoAlgorithm {
    fn load_config(&mut self, config: &[u8]) -> Result<(), PlanError> {
        self.calls.push(DecoCall::LoadConfig(config.to_vec()));
        self.runs = 0;
        self.runtime = 0.0;
        self.depth = 0.0;
        self.gas = None;
        Ok(())
    }

    fn load_state(&mut self, state: &[u8]) -> Result<(), PlanError> {
        self.calls.push(DecoCall::LoadState(state.to_vec()));
        Ok(())
    }

    fn state(&self) -> Vec<u8> {
        self.state.clone()
    }

    fn set_decoset(&mut self, decoset: Arc<Decoset>) {
        self.calls.push(DecoCall::SetDecoset(decoset.id()));
        self.decoset = Some(decoset);
    }

    fn surface_interval(
        &mut self,
        altitude: f64,
        minutes: f64,
        gas: &Mix,
    ) -> Result<(), PlanError> {
        self.calls.push(DecoCall::SurfaceInterval {
            altitude,
            minutes,
            gas: *gas,
        });
        Ok(())
    }

    fn run(&mut self, item: &ResolvedItem) -> Result<Vec<ProfileItem>, PlanError> {
        self.calls.push(DecoCall::Run {
            order: item.order,
            depth: item.depth,
        });
        let index = self.runs;
        self.runs += 1;
        if self.fail_on_run == Some(index) {
            return Err(PlanError::DecoAlgorithm(format!(
                "scripted failure on segment {index}"
            )));
        }

        let scripted = self.stops.get(&index).cloned().unwrap_or_default();
        let stopped = !scripted.is_empty();
        let stops = self.take_stops(scripted)?;

        let travel = if stopped {
            self.rates.travel_time(self.depth, item.depth)
        } else {
            item.depth_change_time
        };
        self.runtime += travel + item.time_at_depth();
        self.depth = item.depth;
        self.gas = Some(item.gas_source);
        Ok(stops)
    }

    fn surface(&mut self) -> Result<Vec<ProfileItem>, PlanError> {
        self.calls.push(DecoCall::Surface);
        let stops = self.take_stops(self.surface_stops.clone())?;
        self.runtime += self.rates.travel_time(self.depth, 0.0);
        self.depth = 0.0;
        Ok(stops)
    }

    fn runtime(&self) -> f64 {
        self.runtime
    }

    fn gas_source(&self) -> GasSource {
        self.gas.unwrap_or_else(GasSource::air)
    }
}
