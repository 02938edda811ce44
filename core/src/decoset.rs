//! Decosets: which gas to switch to at which depth on ascent.

use std::collections::BTreeMap;

use crate::gas::GasSource;
use crate::models::DecosetId;
use crate::units::{convert_depth, UnitSystem};

/// One switch rule: breathe `gas_source` at `max_depth` and shallower.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecosetItem {
    pub max_depth: u32,
    pub gas_source: GasSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decoset {
    id: Option<DecosetId>,
    name: String,
    // keyed by max depth; iterated in reverse for the descending order
    items: BTreeMap<u32, GasSource>,
}

impl Decoset {
    pub fn new(name: impl Into<String>) -> Self {
        Decoset {
            id: None,
            name: name.into(),
            items: BTreeMap::new(),
        }
    }

    pub fn with_id(id: DecosetId, name: impl Into<String>) -> Self {
        Decoset {
            id: Some(id),
            ..Decoset::new(name)
        }
    }

    /// The reserved decoset holding only the dive's primary gas.
    pub fn back_gas() -> Self {
        Decoset::with_id(DecosetId::BACK_GAS, "Back gas")
    }

    pub fn id(&self) -> Option<DecosetId> {
        self.id
    }

    pub fn set_id(&mut self, id: DecosetId) {
        self.id = Some(id);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_back_gas(&self) -> bool {
        self.id == Some(DecosetId::BACK_GAS)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Items from deepest to shallowest.
    pub fn items(&self) -> impl Iterator<Item = DecosetItem> + '_ {
        self.items
            .iter()
            .rev()
            .map(|(&max_depth, &gas_source)| DecosetItem {
                max_depth,
                gas_source,
            })
    }

    /// The same rules with depths re-expressed in another unit system.
    ///
    /// Depths are rounded half-to-even; rules that collide after rounding
    /// keep the shallower one's gas.
    pub fn converted(&self, from: UnitSystem, to: UnitSystem) -> Decoset {
        let mut out = Decoset {
            id: self.id,
            name: self.name.clone(),
            items: BTreeMap::new(),
        };
        for (&depth, &gas) in self.items.iter().rev() {
            let depth = convert_depth(depth as f64, from, to).round_ties_even().max(0.0);
            out.items.insert(depth as u32, gas);
        }
        out
    }

    /// Gas to breathe at `depth`, or `None` when no rule covers it (stay on back gas).
    pub fn gas_source_at_depth(&self, depth: f64) -> Option<GasSource> {
        let mut last = None;
        for (&max_depth, gas) in self.items.iter().rev() {
            if (max_depth as f64) < depth {
                break;
            }
            last = Some(*gas);
        }
        last
    }

    /// Set the gas used from `depth` up. `None` removes the rule at that depth.
    pub fn set_gas_source(&mut self, depth: u32, source: Option<GasSource>) {
        match source {
            Some(gas) => {
                self.items.insert(depth, gas);
            }
            None => {
                self.items.remove(&depth);
            }
        }
    }

    pub fn add_item(&mut self, item: DecosetItem) {
        self.items.insert(item.max_depth, item.gas_source);
    }
}

impl FromIterator<DecosetItem> for Decoset {
    fn from_iter<T: IntoIterator<Item = DecosetItem>>(iter: T) -> Self {
        let mut decoset = Decoset::new("");
        for item in iter {
            decoset.add_item(item);
        }
        decoset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gas::Mix;
    use proptest::prelude::*;

    fn gas(o2: f64, he: f64) -> GasSource {
        Mix::new(o2, he).unwrap().into()
    }

    fn technical_set() -> Decoset {
        let mut set = Decoset::new("tech");
        set.set_gas_source(36, Some(gas(0.21, 0.35)));
        set.set_gas_source(21, Some(gas(0.50, 0.0)));
        set.set_gas_source(6, Some(gas(1.0, 0.0)));
        set
    }

    #[test]
    fn test_gas_source_at_depth() {
        let set = technical_set();
        assert_eq!(set.gas_source_at_depth(40.0), None);
        assert_eq!(set.gas_source_at_depth(36.0), Some(gas(0.21, 0.35)));
        assert_eq!(set.gas_source_at_depth(21.0), Some(gas(0.50, 0.0)));
        assert_eq!(set.gas_source_at_depth(5.0), Some(gas(1.0, 0.0)));
        assert_eq!(set.gas_source_at_depth(0.0), Some(gas(1.0, 0.0)));
    }

    #[test]
    fn test_items_descending() {
        let depths: Vec<u32> = technical_set().items().map(|i| i.max_depth).collect();
        assert_eq!(depths, vec![36, 21, 6]);
    }

    #[test]
    fn test_replace_and_remove() {
        let mut set = technical_set();
        set.set_gas_source(21, Some(gas(0.32, 0.0)));
        assert_eq!(set.len(), 3);
        assert_eq!(set.gas_source_at_depth(15.0), Some(gas(0.32, 0.0)));

        set.set_gas_source(6, None);
        assert_eq!(set.len(), 2);
        assert_eq!(set.gas_source_at_depth(3.0), Some(gas(0.32, 0.0)));

        // removing a depth that has no rule is a no-op
        set.set_gas_source(9, None);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_back_gas_identity() {
        let set = Decoset::back_gas();
        assert!(set.is_back_gas());
        assert!(set.is_empty());
        assert_eq!(set.gas_source_at_depth(10.0), None);
        assert!(!technical_set().is_back_gas());
    }

    #[test]
    fn test_converted_depths() {
        let feet = technical_set().converted(UnitSystem::Metric, UnitSystem::Imperial);
        let depths: Vec<u32> = feet.items().map(|i| i.max_depth).collect();
        assert_eq!(depths, vec![118, 69, 20]);
        assert_eq!(feet.gas_source_at_depth(20.0), Some(gas(1.0, 0.0)));

        let back = feet.converted(UnitSystem::Imperial, UnitSystem::Metric);
        assert_eq!(back, technical_set());
    }

    proptest! {
        #[test]
        fn prop_lookup_monotonic(depths in proptest::collection::btree_set(1u32..120, 1..6),
                                 a in 0.0f64..130.0, b in 0.0f64..130.0) {
            let mut set = Decoset::new("p");
            for d in &depths {
                set.set_gas_source(*d, Some(gas(0.21, *d as f64 / 200.0)));
            }
            let (shallow, deep) = if a <= b { (a, b) } else { (b, a) };
            let switch_depth = |depth: f64| {
                set.items()
                    .filter(|i| Some(i.gas_source) == set.gas_source_at_depth(depth))
                    .map(|i| i.max_depth)
                    .next()
            };
            if let Some(deep_switch) = switch_depth(deep) {
                let shallow_switch = switch_depth(shallow);
                prop_assert!(shallow_switch.is_some());
                prop_assert!(shallow_switch.unwrap() <= deep_switch);
            }
        }
    }
}
