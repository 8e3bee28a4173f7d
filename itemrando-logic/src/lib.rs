// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod difficulty;

use itemrando_game::{Boss, Cost, Item, NUM_BOSSES, NUM_ITEMS};
use serde::{Deserialize, Serialize};

// Result of evaluating a requirement: whether it can be satisfied at all, and if so the
// cost of the cheapest known way to satisfy it. An unreachable value always carries an
// infinite cost, so that it compares worse than any reachable value.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyValue {
    pub reachable: bool,
    pub cost: Cost,
}

impl DifficultyValue {
    pub const FREE: DifficultyValue = DifficultyValue {
        reachable: true,
        cost: 0.0,
    };
    pub const UNREACHABLE: DifficultyValue = DifficultyValue {
        reachable: false,
        cost: f32::INFINITY,
    };

    pub fn new(reachable: bool, cost: Cost) -> DifficultyValue {
        if reachable {
            DifficultyValue { reachable, cost }
        } else {
            DifficultyValue::UNREACHABLE
        }
    }

    pub fn at_cost(cost: Cost) -> DifficultyValue {
        DifficultyValue::new(true, cost)
    }

    pub fn from_bool(reachable: bool) -> DifficultyValue {
        if reachable {
            DifficultyValue::FREE
        } else {
            DifficultyValue::UNREACHABLE
        }
    }

    // Both needed: the harder of the two is the bottleneck.
    pub fn and(self, other: DifficultyValue) -> DifficultyValue {
        if self.reachable && other.reachable {
            DifficultyValue::at_cost(self.cost.max(other.cost))
        } else {
            DifficultyValue::UNREACHABLE
        }
    }

    // Either one suffices: take the cheapest reachable option.
    pub fn or(self, other: DifficultyValue) -> DifficultyValue {
        match (self.reachable, other.reachable) {
            (true, true) => DifficultyValue::at_cost(self.cost.min(other.cost)),
            (true, false) => self,
            (false, true) => other,
            (false, false) => DifficultyValue::UNREACHABLE,
        }
    }

    pub fn and_all<I: IntoIterator<Item = DifficultyValue>>(values: I) -> DifficultyValue {
        let mut out = DifficultyValue::FREE;
        for v in values {
            out = out.and(v);
            if !out.reachable {
                break;
            }
        }
        out
    }

    pub fn or_all<I: IntoIterator<Item = DifficultyValue>>(values: I) -> DifficultyValue {
        values
            .into_iter()
            .fold(DifficultyValue::UNREACHABLE, DifficultyValue::or)
    }

    pub fn within(&self, ceiling: Cost) -> bool {
        self.reachable && self.cost <= ceiling
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Inventory {
    pub counts: Vec<usize>,
}

impl Default for Inventory {
    fn default() -> Self {
        Inventory {
            counts: vec![0; NUM_ITEMS],
        }
    }
}

impl Inventory {
    pub fn has(&self, item: Item) -> bool {
        self.counts[item as usize] > 0
    }

    pub fn count(&self, item: Item) -> usize {
        self.counts[item as usize]
    }

    pub fn add(&mut self, item: Item) {
        self.counts[item as usize] += 1;
    }

    pub fn energy_reserve_count(&self) -> usize {
        self.count(Item::ETank) + self.count(Item::Reserve)
    }
}

pub type StateFingerprint = [u16; NUM_ITEMS + 1];

// Everything the requirement evaluation depends on, apart from the (fixed) settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct GlobalState {
    pub inventory: Inventory,
    pub bosses_defeated: [bool; NUM_BOSSES],
}

impl GlobalState {
    pub fn collect(&mut self, item: Item) {
        self.inventory.add(item);
    }

    pub fn is_boss_defeated(&self, boss: Boss) -> bool {
        self.bosses_defeated[boss as usize]
    }

    pub fn defeat_boss(&mut self, boss: Boss) {
        self.bosses_defeated[boss as usize] = true;
    }

    pub fn defeated_bosses(&self) -> Vec<Boss> {
        Boss::all()
            .into_iter()
            .filter(|&b| self.is_boss_defeated(b))
            .collect()
    }

    pub fn set_defeated_bosses(&mut self, bosses: &[Boss]) {
        self.bosses_defeated = [false; NUM_BOSSES];
        for &b in bosses {
            self.defeat_boss(b);
        }
    }

    pub fn defeat_all_bosses(&mut self) {
        self.bosses_defeated = [true; NUM_BOSSES];
    }

    // Exact encoding of the state, used as a memoization key.
    pub fn fingerprint(&self) -> StateFingerprint {
        let mut out = [0u16; NUM_ITEMS + 1];
        for i in 0..NUM_ITEMS {
            out[i] = self.inventory.counts[i].min(u16::MAX as usize) as u16;
        }
        for (i, &defeated) in self.bosses_defeated.iter().enumerate() {
            if defeated {
                out[NUM_ITEMS] |= 1 << i;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<DifficultyValue> {
        vec![
            DifficultyValue::FREE,
            DifficultyValue::at_cost(5.0),
            DifficultyValue::at_cost(50.0),
            DifficultyValue::UNREACHABLE,
        ]
    }

    #[test]
    fn test_and_or_laws() {
        let u = DifficultyValue::UNREACHABLE;
        for &a in &samples() {
            assert_eq!(a.and(a), a);
            assert_eq!(a.or(a), a);
            assert_eq!(a.and(u), u);
            assert_eq!(a.or(u), a);
            for &b in &samples() {
                assert_eq!(a.and(b), b.and(a));
                assert_eq!(a.or(b), b.or(a));
                for &c in &samples() {
                    assert_eq!(a.and(b).and(c), a.and(b.and(c)));
                    assert_eq!(a.or(b).or(c), a.or(b.or(c)));
                }
            }
        }
    }

    #[test]
    fn test_bottleneck_costs() {
        let easy = DifficultyValue::at_cost(1.0);
        let hard = DifficultyValue::at_cost(10.0);
        assert_eq!(easy.and(hard).cost, 10.0);
        assert_eq!(easy.or(hard).cost, 1.0);
        assert_eq!(
            DifficultyValue::or_all(vec![hard, DifficultyValue::UNREACHABLE]),
            hard
        );
        assert_eq!(DifficultyValue::and_all(Vec::new()), DifficultyValue::FREE);
        assert_eq!(DifficultyValue::or_all(Vec::new()), DifficultyValue::UNREACHABLE);
        assert!(hard.within(10.0));
        assert!(!hard.within(5.0));
        assert!(!DifficultyValue::UNREACHABLE.within(f32::INFINITY));
    }

    #[test]
    fn test_fingerprint_tracks_state() {
        let mut global = GlobalState::default();
        let empty = global.fingerprint();
        global.collect(Item::Morph);
        let with_morph = global.fingerprint();
        assert_ne!(with_morph, empty);
        global.defeat_boss(Boss::Ridley);
        assert_ne!(global.fingerprint(), with_morph);
        assert_eq!(global.defeated_bosses(), vec![Boss::Ridley]);
        global.set_defeated_bosses(&[]);
        assert_eq!(global.fingerprint(), with_morph);
    }

    #[test]
    fn test_energy_reserves() {
        let mut inventory = Inventory::default();
        inventory.add(Item::ETank);
        inventory.add(Item::ETank);
        inventory.add(Item::Reserve);
        assert_eq!(inventory.energy_reserve_count(), 3);
        assert_eq!(inventory.count(Item::Missile), 0);
    }
}
