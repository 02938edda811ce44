//! Cursor over a dive profile and the deco run that expands it.

use tracing::{debug, info};

use crate::cns_otu::CnsOtu;
use crate::deco::DecoAlgorithm;
use crate::error::PlanError;
use crate::gas::GasSource;
use crate::models::Dive;
use crate::profile::{merge, ItemSource, ProfileItem, ResolvedItem, TravelRates};
use crate::storage::{self, Storage};

/// Walks and edits a dive's profile on behalf of one author (`source`).
///
/// The cursor only stops on active items; `current` is the item with all
/// inherited fields filled in.
pub struct ProfileExecutor<'a> {
    dive: &'a mut Dive,
    source: ItemSource,
    rates: TravelRates,
    position: Option<usize>,
    current: Option<ResolvedItem>,
    cns_otu: Option<CnsOtu>,
    removed: Vec<ProfileItem>,
}

impl<'a> ProfileExecutor<'a> {
    pub fn new(dive: &'a mut Dive, source: ItemSource) -> Self {
        let rates = TravelRates::for_units(&dive.units);
        ProfileExecutor {
            dive,
            source,
            rates,
            position: None,
            current: None,
            cns_otu: None,
            removed: Vec::new(),
        }
    }

    pub fn with_rates(mut self, rates: TravelRates) -> Self {
        self.rates = rates;
        self
    }

    pub fn source(&self) -> ItemSource {
        self.source
    }

    pub fn set_source(&mut self, source: ItemSource) {
        self.source = source;
    }

    pub fn dive(&self) -> &Dive {
        self.dive
    }

    pub fn count(&self) -> usize {
        self.dive.profile.len()
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn current(&self) -> Option<&ResolvedItem> {
        self.current.as_ref()
    }

    /// Exposure totals from the last completed deco run.
    pub fn cns_otu(&self) -> Option<&CnsOtu> {
        self.cns_otu.as_ref()
    }

    /// Items purged by the last deco run that still have to leave the store.
    pub fn take_removed(&mut self) -> Vec<ProfileItem> {
        std::mem::take(&mut self.removed)
    }

    pub fn move_to_first(&mut self) -> Result<bool, PlanError> {
        self.move_to_position(0)
    }

    /// Advance to the next active item. `false` at the end of the profile.
    pub fn move_to_next(&mut self) -> Result<bool, PlanError> {
        let mut next = self.position.map_or(0, |p| p + 1);
        while next < self.dive.profile.len() {
            let item = &self.dive.profile[next];
            if item.active {
                let resolved = merge(self.current.as_ref(), item, &self.rates)?;
                self.current = Some(resolved);
                self.position = Some(next);
                return Ok(true);
            }
            next += 1;
        }
        Ok(false)
    }

    /// Move to the first active item at or after `position`.
    ///
    /// Inheritance only flows forwards, so moving back replays from the start.
    pub fn move_to_position(&mut self, position: usize) -> Result<bool, PlanError> {
        match self.position {
            Some(p) if p == position => return Ok(true),
            Some(p) if p > position => self.rewind(),
            _ => {}
        }
        while self.position.map_or(true, |p| p < position) {
            if !self.move_to_next()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn rewind(&mut self) {
        self.position = None;
        self.current = None;
    }

    fn resync(&mut self, position: Option<usize>) -> Result<(), PlanError> {
        self.rewind();
        if let Some(p) = position {
            self.move_to_position(p)?;
        }
        Ok(())
    }

    fn renumber(&mut self) {
        for (order, item) in self.dive.profile.iter_mut().enumerate() {
            item.order = order as u32;
        }
    }

    /// Insert `item` after the cursor, authored by this executor.
    ///
    /// Everything from the new item on must be recomputed unless pinned valid.
    pub fn append_item(&mut self, mut item: ProfileItem) {
        item.source = self.source;
        item.dive_id = self.dive.id;
        let at = self.position.map_or(0, |p| p + 1);
        self.dive.profile.insert(at, item);
        for later in &mut self.dive.profile[at..] {
            later.invalidate();
        }
        self.renumber();
        debug!(position = at, source = self.source.0, "profile item appended");
    }

    /// Edit the item under the cursor.
    ///
    /// Our own items are changed in place. Anyone else's is deactivated and
    /// the edit is appended after it instead.
    pub fn replace_item(&mut self, item: ProfileItem) -> Result<(), PlanError> {
        let position = self
            .position
            .ok_or_else(|| PlanError::ProfileInconsistency("no current item".to_string()))?;
        let current = &mut self.dive.profile[position];
        if current.source == self.source {
            current.overlay(&item);
            self.resync(Some(position))
        } else {
            current.active = false;
            self.append_item(item);
            self.resync(Some(position))
        }
    }

    /// Delete every item authored by `source`, restoring what they replaced.
    pub fn remove_source_items(&mut self, source: ItemSource) -> Vec<ProfileItem> {
        let mut removed = Vec::new();
        let mut p = 0;
        while p < self.dive.profile.len() {
            if self.dive.profile[p].source != source {
                p += 1;
                continue;
            }
            if p > 0 {
                let prev = &mut self.dive.profile[p - 1];
                if !prev.active && prev.source != source {
                    prev.active = true;
                }
            }
            removed.push(self.dive.profile.remove(p));
        }
        if !removed.is_empty() {
            self.renumber();
            debug!(count = removed.len(), source = source.0, "profile items removed");
        }
        self.rewind();
        removed
    }

    /// Drop the stops of an earlier deco run.
    ///
    /// Stops never shadow another item, so nothing is reactivated.
    fn purge_deco_items(&mut self) -> Vec<ProfileItem> {
        let (purged, kept): (Vec<ProfileItem>, Vec<ProfileItem>) = std::mem::take(&mut self.dive.profile)
            .into_iter()
            .partition(|item| item.source == ItemSource::DECO);
        self.dive.profile = kept;
        self.renumber();
        self.rewind();
        purged
    }

    fn insert_stop(&mut self, at: usize, mut stop: ProfileItem) -> ProfileItem {
        stop.source = ItemSource::DECO;
        stop.active = true;
        stop.id = None;
        stop.dive_id = self.dive.id;
        self.dive.profile.insert(at, stop.clone());
        stop
    }

    /// Run `alg` over the profile, inserting its stops and recording the
    /// resulting deco state and oxygen exposure on the dive.
    ///
    /// Stops from an earlier run are purged first. A failure aborts the run
    /// with the profile partly expanded.
    pub fn run_deco(&mut self, alg: &mut dyn DecoAlgorithm) -> Result<(), PlanError> {
        let purged = self.purge_deco_items();
        self.removed.extend(purged.into_iter().filter(|item| item.id.is_some()));
        if !self.dive.profile.iter().any(|item| item.active) {
            return Err(PlanError::ProfileInconsistency(
                "profile has no active items".to_string(),
            ));
        }

        let mut cns_otu = self.dive.build_cns_otu();
        self.dive.initialize_deco(alg)?;
        info!(dive = ?self.dive.id, items = self.dive.profile.len(), "running deco");

        let mut previous: Option<ResolvedItem> = None;
        let mut last_gas: Option<GasSource> = None;
        let mut p = 0;
        while p < self.dive.profile.len() {
            if !self.dive.profile[p].active {
                p += 1;
                continue;
            }
            let mut resolved = merge(previous.as_ref(), &self.dive.profile[p], &self.rates)?;
            let mut gas = *last_gas.get_or_insert(resolved.gas_source);

            let stops = alg.run(&resolved)?;
            let stopped = !stops.is_empty();
            for stop in stops {
                let stop = self.insert_stop(p, stop);
                p += 1;
                let stop = merge(previous.as_ref(), &stop, &self.rates)?;
                cns_otu.change_depth(stop.depth, stop.depth_change_time, &gas)?;
                cns_otu.run(stop.time_at_depth(), &stop.gas_source)?;
                gas = stop.gas_source;
                previous = Some(stop);
            }
            if stopped {
                // travel now starts from the last stop
                resolved.start_depth = cns_otu.depth();
                resolved.depth_change_time = self.dive.profile[p]
                    .depth_change_time
                    .unwrap_or_else(|| self.rates.travel_time(resolved.start_depth, resolved.depth));
            }

            cns_otu.change_depth(resolved.depth, resolved.depth_change_time, &gas)?;
            cns_otu.run(resolved.time_at_depth(), &resolved.gas_source)?;
            last_gas = Some(alg.gas_source());
            previous = Some(resolved);
            p += 1;
        }

        let mut gas = last_gas.unwrap_or_else(GasSource::air);
        let mut last_runtime = alg.runtime();
        for stop in alg.surface()? {
            let at = self.dive.profile.len();
            let stop = self.insert_stop(at, stop);
            let stop = merge(previous.as_ref(), &stop, &self.rates)?;
            cns_otu.change_depth(stop.depth, stop.depth_change_time, &gas)?;
            cns_otu.run(stop.time_at_depth(), &stop.gas_source)?;
            gas = stop.gas_source;
            last_runtime += stop.depth_change_time + stop.segtime;
            previous = Some(stop);
        }
        cns_otu.change_depth(0.0, alg.runtime() - last_runtime, &gas)?;

        self.renumber();
        self.dive.save_deco(alg);
        self.dive.save_cns_otu(&cns_otu);
        info!(
            dive = ?self.dive.id,
            runtime = alg.runtime(),
            cns = cns_otu.cns(),
            otu = cns_otu.otu(),
            "deco complete"
        );
        self.cns_otu = Some(cns_otu);
        self.rewind();
        Ok(())
    }

    /// [`run_deco`](Self::run_deco), then write the dive and its expanded profile to `store`.
    pub fn run_deco_and_save<S: Storage + ?Sized>(
        &mut self,
        alg: &mut dyn DecoAlgorithm,
        store: &mut S,
    ) -> Result<(), PlanError> {
        self.run_deco(alg)?;
        for item in self.take_removed() {
            if let Some(id) = item.id {
                store.delete_profile_item(id)?;
            }
        }
        storage::save_dive(store, self.dive)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deco_mock::{DecoCall, MockDecoAlgorithm};
    use crate::gas::Mix;
    use crate::memory::MemoryStorage;
    use crate::profile::Validity;
    use crate::units::Units;

    /// Descent to 30 m, 25 minutes there on air, ascent to the surface.
    fn square_dive() -> Dive {
        let mut dive = Dive::new("square", Units::metric());
        dive.profile = vec![
            ProfileItem::segment(30.0, 0.0, GasSource::air()),
            ProfileItem::new(ItemSource::USER).with_segtime(25.0),
            ProfileItem::new(ItemSource::USER).with_depth(0.0).with_segtime(0.0),
        ];
        dive
    }

    fn stop_at_5m() -> MockDecoAlgorithm {
        MockDecoAlgorithm::new()
            .with_stop(2, ProfileItem::stop(5.0, 3.0, GasSource::air()))
            .with_state(vec![0xde, 0xc0])
    }

    #[test]
    fn test_cursor_skips_inactive_and_inherits() {
        let mut dive = square_dive();
        dive.profile[1].active = false;
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);

        assert!(exec.move_to_first().unwrap());
        assert_eq!(exec.position(), Some(0));
        assert!(exec.move_to_next().unwrap());
        assert_eq!(exec.position(), Some(2));
        let current = exec.current().unwrap();
        assert_eq!(current.depth, 0.0);
        assert_eq!(current.gas_source, GasSource::air());
        assert!(!exec.move_to_next().unwrap());

        // backwards replays from the start
        assert!(exec.move_to_position(0).unwrap());
        assert_eq!(exec.current().unwrap().depth, 30.0);
        assert_eq!(exec.count(), 3);
    }

    #[test]
    fn test_cursor_reports_incomplete_first_item() {
        let mut dive = Dive::new("broken", Units::metric());
        dive.profile = vec![ProfileItem::new(ItemSource::USER).with_depth(10.0)];
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        assert!(matches!(
            exec.move_to_first(),
            Err(PlanError::ProfileInconsistency(_))
        ));
    }

    #[test]
    fn test_append_item_invalidates_later() {
        let mut dive = square_dive();
        dive.profile[2].valid = Validity::AlwaysValid;
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource(7));
        exec.move_to_first().unwrap();
        exec.append_item(ProfileItem::new(ItemSource::USER).with_depth(20.0));

        let profile = &exec.dive().profile;
        assert_eq!(profile.len(), 4);
        assert_eq!(profile[1].source, ItemSource(7));
        assert_eq!(profile[1].order, 1);
        assert_eq!(profile[0].valid, Validity::Valid);
        assert_eq!(profile[1].valid, Validity::Invalid);
        assert_eq!(profile[2].valid, Validity::Invalid);
        assert_eq!(profile[3].valid, Validity::AlwaysValid);
    }

    #[test]
    fn test_replace_own_item_in_place() {
        let mut dive = square_dive();
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        exec.move_to_position(1).unwrap();
        exec.replace_item(ProfileItem::new(ItemSource::USER).with_segtime(40.0))
            .unwrap();
        assert_eq!(exec.count(), 3);
        assert_eq!(exec.current().unwrap().segtime, 40.0);
        assert_eq!(exec.current().unwrap().depth, 30.0);
    }

    #[test]
    fn test_replace_foreign_item_then_remove_restores() {
        let mut dive = square_dive();
        let editor = ItemSource(5);
        let mut exec = ProfileExecutor::new(&mut dive, editor);
        exec.move_to_position(1).unwrap();
        exec.replace_item(ProfileItem::new(ItemSource::USER).with_segtime(40.0))
            .unwrap();

        assert_eq!(exec.count(), 4);
        assert!(!exec.dive().profile[1].active);
        assert_eq!(exec.dive().profile[2].source, editor);
        assert_eq!(exec.position(), Some(2));
        assert_eq!(exec.current().unwrap().segtime, 40.0);

        let removed = exec.remove_source_items(editor);
        assert_eq!(removed.len(), 1);
        assert_eq!(exec.count(), 3);
        assert!(exec.dive().profile[1].active);
        assert_eq!(exec.dive().profile[2].order, 2);
    }

    #[test]
    fn test_remove_keeps_same_source_predecessor_inactive() {
        let mut dive = square_dive();
        let editor = ItemSource(5);
        let mut shadowed = ProfileItem::new(editor).with_segtime(10.0);
        shadowed.active = false;
        dive.profile.insert(1, shadowed);
        dive.profile.insert(2, ProfileItem::new(editor).with_segtime(15.0));
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);

        let removed = exec.remove_source_items(editor);
        assert_eq!(removed.len(), 2);
        assert!(!removed[0].active);
        let profile = &exec.dive().profile;
        assert_eq!(profile.len(), 3);
        assert!(profile.iter().all(|i| i.source == ItemSource::USER && i.active));
    }

    #[test]
    fn test_remove_only_looks_at_immediate_predecessor() {
        let mut dive = square_dive();
        dive.profile[1].source = ItemSource(9);
        dive.profile[1].active = false;
        dive.profile.insert(2, ProfileItem::new(ItemSource::USER).with_segtime(25.0));
        dive.profile.insert(3, ProfileItem::new(ItemSource(5)).with_segtime(5.0));
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);

        assert_eq!(exec.remove_source_items(ItemSource(5)).len(), 1);
        let profile = &exec.dive().profile;
        assert_eq!(profile.len(), 4);
        assert!(!profile[1].active);
        assert!(profile[2].active);
    }

    #[test]
    fn test_replace_without_cursor_fails() {
        let mut dive = square_dive();
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        assert!(exec.replace_item(ProfileItem::new(ItemSource::USER)).is_err());
    }

    #[test]
    fn test_run_deco_inserts_stop_before_ascent() {
        let mut dive = square_dive();
        let mut alg = stop_at_5m();
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        exec.run_deco(&mut alg).unwrap();
        let cns = exec.cns_otu().unwrap().cns();

        let profile = &dive.profile;
        let depths: Vec<Option<f64>> = profile.iter().map(|i| i.depth).collect();
        assert_eq!(depths, vec![Some(30.0), None, Some(5.0), Some(0.0)]);
        assert_eq!(profile[2].source, ItemSource::DECO);
        assert_eq!(profile[2].segtime, Some(3.0));
        let orders: Vec<u32> = profile.iter().map(|i| i.order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3]);

        // descent in 13 steps, 25 minutes at 0.84 bar, ascent to the stop in 11 steps
        assert!((cns - 6.446814264184278).abs() < 1e-9, "cns {cns}");
        assert_eq!(dive.final_cns, cns);
        assert_eq!(dive.final_deco_state, vec![0xde, 0xc0]);
        assert!(dive.is_dirty());
    }

    #[test]
    fn test_run_deco_is_idempotent() {
        let mut dive = square_dive();
        let mut alg = stop_at_5m().with_surface_stop(ProfileItem::stop(3.0, 2.0, GasSource::air()));
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        exec.run_deco(&mut alg).unwrap();
        let first_cns = exec.cns_otu().unwrap().cns();
        let first_otu = exec.cns_otu().unwrap().otu();
        exec.run_deco(&mut alg).unwrap();

        assert_eq!(exec.count(), 5);
        assert_eq!(exec.cns_otu().unwrap().cns(), first_cns);
        assert_eq!(exec.cns_otu().unwrap().otu(), first_otu);
        let deco: Vec<usize> = exec
            .dive()
            .profile
            .iter()
            .enumerate()
            .filter(|(_, i)| i.source == ItemSource::DECO)
            .map(|(p, _)| p)
            .collect();
        assert_eq!(deco, vec![2, 4]);
    }

    #[test]
    fn test_run_deco_twice_keeps_foreign_replacement() {
        let mut dive = square_dive();
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource(5));
        exec.move_to_position(1).unwrap();
        exec.replace_item(ProfileItem::new(ItemSource::USER).with_segtime(20.0))
            .unwrap();
        // stop scripted before the replacement, right after the shadowed original
        let mut alg = MockDecoAlgorithm::new()
            .with_stop(1, ProfileItem::stop(20.0, 1.0, GasSource::air()));

        fn shape(exec: &ProfileExecutor<'_>) -> Vec<(bool, i64)> {
            exec.dive().profile.iter().map(|i| (i.active, i.source.0)).collect()
        }
        exec.run_deco(&mut alg).unwrap();
        let first = shape(&exec);
        let first_cns = exec.cns_otu().unwrap().cns();
        exec.run_deco(&mut alg).unwrap();

        assert_eq!(first, vec![(true, 0), (false, 0), (true, 1), (true, 5), (true, 0)]);
        assert_eq!(shape(&exec), first);
        assert_eq!(exec.cns_otu().unwrap().cns(), first_cns);
        let runs = alg
            .calls
            .iter()
            .filter(|c| matches!(c, DecoCall::Run { .. }))
            .count();
        assert_eq!(runs, 6);
    }

    #[test]
    fn test_run_deco_drives_algorithm_in_order() {
        let mut dive = square_dive();
        let mut alg = stop_at_5m();
        ProfileExecutor::new(&mut dive, ItemSource::USER)
            .run_deco(&mut alg)
            .unwrap();
        let runs: Vec<&DecoCall> = alg
            .calls
            .iter()
            .filter(|c| matches!(c, DecoCall::Run { .. } | DecoCall::Surface))
            .collect();
        assert_eq!(
            runs,
            vec![
                &DecoCall::Run { order: 0, depth: 30.0 },
                &DecoCall::Run { order: 1, depth: 30.0 },
                &DecoCall::Run { order: 2, depth: 0.0 },
                &DecoCall::Surface,
            ]
        );
        assert!(matches!(alg.calls[0], DecoCall::LoadConfig(_)));
    }

    #[test]
    fn test_run_deco_needs_active_item() {
        let mut dive = square_dive();
        for item in &mut dive.profile {
            item.active = false;
        }
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        let err = exec.run_deco(&mut MockDecoAlgorithm::new()).unwrap_err();
        assert!(matches!(err, PlanError::ProfileInconsistency(_)));
    }

    #[test]
    fn test_run_deco_stops_on_po2_violation() {
        let mut dive = Dive::new("hot", Units::metric());
        let ean50: GasSource = Mix::new(0.5, 0.0).unwrap().into();
        dive.profile = vec![ProfileItem::segment(40.0, 10.0, ean50)];
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        let err = exec.run_deco(&mut MockDecoAlgorithm::new()).unwrap_err();
        assert!(matches!(err, PlanError::MaxPo2Exceeded { .. }));
        assert!(exec.cns_otu().is_none());
    }

    #[test]
    fn test_run_deco_propagates_algorithm_failure() {
        let mut dive = square_dive();
        let mut alg = MockDecoAlgorithm::new();
        alg.fail_on_run = Some(1);
        let mut exec = ProfileExecutor::new(&mut dive, ItemSource::USER);
        assert!(matches!(
            exec.run_deco(&mut alg),
            Err(PlanError::DecoAlgorithm(_))
        ));
    }

    #[test]
    fn test_repetitive_dive_carries_exposure() {
        let mut first = square_dive();
        ProfileExecutor::new(&mut first, ItemSource::USER)
            .run_deco(&mut stop_at_5m())
            .unwrap();
        let first_cns = first.final_cns;

        let mut second = square_dive();
        second.surface_interval = 90.0;
        second.previous = Some(std::sync::Arc::new(first));
        ProfileExecutor::new(&mut second, ItemSource::USER)
            .run_deco(&mut stop_at_5m())
            .unwrap();
        assert!((second.final_cns - 2.0 * first_cns).abs() < 1e-9);
    }

    #[test]
    fn test_run_deco_and_save() {
        let mut store = MemoryStorage::new();
        let mut dive = square_dive();
        let mut alg = stop_at_5m();
        ProfileExecutor::new(&mut dive, ItemSource::USER)
            .run_deco_and_save(&mut alg, &mut store)
            .unwrap();
        let id = dive.id.unwrap();
        assert!(!dive.is_dirty());
        assert_eq!(store.fetch_profile_items(id).unwrap().len(), 4);

        // a second run replaces the stored stop rather than adding one
        ProfileExecutor::new(&mut dive, ItemSource::USER)
            .run_deco_and_save(&mut alg, &mut store)
            .unwrap();
        let rows = store.fetch_profile_items(id).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| r.source == 1).count(), 1);

        let loaded = storage::load_dive(&store, id).unwrap();
        assert_eq!(loaded.final_deco_state, vec![0xde, 0xc0]);
        assert_eq!(loaded.final_cns, dive.final_cns);
        assert_eq!(loaded.profile.len(), 4);
    }
}
