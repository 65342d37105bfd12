//! Generational arena backing statement handles.

use std::fmt;

/// Slot index plus generation, as handed across a foreign boundary.
///
/// Generation 0 is never issued, so a zeroed id is always invalid. Outside
/// the crate a value can only come from `StatementHandle::into_raw` or
/// [`from_bits`](Self::from_bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl RawHandle {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a single integer, generation in the high half.
    pub fn to_bits(self) -> u64 {
        (u64::from(self.generation) << 32) | u64::from(self.index)
    }

    /// Unpack from [`to_bits`](Self::to_bits). Returns `None` for generation 0.
    pub fn from_bits(bits: u64) -> Option<Self> {
        let generation = (bits >> 32) as u32;
        if generation == 0 {
            return None;
        }
        Some(Self {
            index: bits as u32,
            generation,
        })
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    entry: Option<T>,
}

/// Slots with a free list. Removing an entry advances the slot generation so
/// ids issued before the removal no longer resolve.
pub(crate) struct HandleTable<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
}

fn next_generation(generation: u32) -> u32 {
    let next = generation.wrapping_add(1);
    if next == 0 {
        1
    } else {
        next
    }
}

impl<T> HandleTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn insert(&mut self, entry: T) -> RawHandle {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return RawHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 1,
            entry: Some(entry),
        });
        RawHandle {
            index,
            generation: 1,
        }
    }

    pub(crate) fn get(&self, handle: RawHandle) -> Option<&T> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref()
    }

    pub(crate) fn remove(&mut self, handle: RawHandle) -> Option<T> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let entry = slot.entry.take()?;
        slot.generation = next_generation(slot.generation);
        self.free.push(handle.index);
        self.live -= 1;
        Some(entry)
    }
}
