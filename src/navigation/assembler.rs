use log::trace;
use std::{collections::HashMap, fmt::Debug, hash::Hash};

use crate::error::Error;

/// Fragments collected for one key
#[derive(Debug, Clone, Default)]
struct Scratch {
    generation: u32,
    /// Latest bytes per fragment id (id - 1)
    slots: Vec<Vec<u8>>,
    /// Present fragments (bit per id)
    present: u32,
    /// Units already released during this generation
    released: Vec<u32>,
}

impl Scratch {
    fn new(max_id: u8, generation: u32) -> Self {
        Self {
            generation,
            slots: vec![Vec::new(); max_id as usize],
            present: 0,
            released: Vec::new(),
        }
    }

    fn invalidate(&mut self, generation: u32) {
        for slot in self.slots.iter_mut() {
            slot.clear();
        }
        self.generation = generation;
        self.present = 0;
        self.released.clear();
    }

    fn assemble(&self, unit: u32) -> Vec<u8> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(i, _)| unit & (1 << (i + 1)) != 0)
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }
}

/// A logical unit made of all its fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Fragment ids of this unit (bit per id)
    pub unit: u32,
    /// Fragments concatenated in id order
    pub bytes: Vec<u8>,
}

/// Collects navigation message fragments (subframes, strings, pages)
/// per key (usually a satellite), releasing logical units once
/// all of their fragments were received within one generation.
#[derive(Debug, Clone)]
pub struct Assembler<K> {
    max_id: u8,
    scratch: HashMap<K, Scratch>,
}

/// Bit mask of fragment ids `first..=last`
pub const fn fragments(first: u8, last: u8) -> u32 {
    let mut mask = 0u32;
    let mut id = first;
    while id <= last {
        mask |= 1 << id;
        id += 1;
    }
    mask
}

impl<K: Copy + Eq + Hash + Debug> Assembler<K> {
    /// Builds an [Assembler] accepting fragment ids 1..=max_id (max. 31)
    pub fn new(max_id: u8) -> Self {
        Self {
            max_id: max_id.min(31),
            scratch: Default::default(),
        }
    }

    /// Stores one fragment. Fragments of a previous generation are
    /// dropped first. Returns the first of `units` completed by this
    /// fragment, if any. A unit is released once per generation, unless
    /// one of its fragments is later received with different content.
    pub fn push(
        &mut self,
        key: K,
        id: u8,
        generation: u32,
        bytes: &[u8],
        units: &[u32],
    ) -> Result<Option<Assembly>, Error> {
        if id == 0 || id > self.max_id {
            return Err(Error::FragmentId(id));
        }
        let max_id = self.max_id;
        let scratch = self
            .scratch
            .entry(key)
            .or_insert_with(|| Scratch::new(max_id, generation));

        if scratch.generation != generation {
            if scratch.present != 0 {
                trace!("{:?} - stale generation {}, dropping fragments", key, scratch.generation);
            }
            scratch.invalidate(generation);
        }

        let bit = 1u32 << id;
        let slot = &mut scratch.slots[id as usize - 1];
        if scratch.present & bit != 0 && slot.as_slice() != bytes {
            // companions were collected along with the previous content
            for unit in units.iter().filter(|unit| *unit & bit != 0) {
                scratch.present &= !unit;
            }
            scratch.released.retain(|unit| unit & bit == 0);
            trace!("{:?} - fragment #{} updated", key, id);
        }
        slot.clear();
        slot.extend_from_slice(bytes);
        scratch.present |= bit;

        for unit in units.iter().copied() {
            if unit & bit == 0 || scratch.present & unit != unit {
                continue;
            }
            if scratch.released.contains(&unit) {
                trace!("{:?} - unit {:#x} already released", key, unit);
                return Ok(None);
            }
            scratch.released.push(unit);
            return Ok(Some(Assembly {
                unit,
                bytes: scratch.assemble(unit),
            }));
        }
        Ok(None)
    }
}
