//! Audio and event buffers, owned by slot arenas and referenced by id.

use crate::events::EventBuffer;
use std::fmt;
use std::marker::PhantomData;
use tactus_shared::RENDER_QUANTUM;

/// Stereo signal of one render quantum.
#[derive(Clone)]
pub struct AudioBuffer {
    left: [f32; RENDER_QUANTUM],
    right: [f32; RENDER_QUANTUM],
}

impl Default for AudioBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [left, right] = self.peaks();
        write!(f, "AudioBuffer(peak {left:.3}/{right:.3})")
    }
}

impl AudioBuffer {
    pub fn new() -> Self {
        Self { left: [0.0; RENDER_QUANTUM], right: [0.0; RENDER_QUANTUM] }
    }

    pub fn clear(&mut self) {
        self.left.fill(0.0);
        self.right.fill(0.0);
    }

    pub fn clear_range(&mut self, from: usize, to: usize) {
        self.left[from..to].fill(0.0);
        self.right[from..to].fill(0.0);
    }

    pub fn left(&self) -> &[f32] {
        &self.left
    }

    pub fn right(&self) -> &[f32] {
        &self.right
    }

    pub fn channels_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.left, &mut self.right)
    }

    pub fn copy_from(&mut self, source: &AudioBuffer, from: usize, to: usize) {
        self.left[from..to].copy_from_slice(&source.left[from..to]);
        self.right[from..to].copy_from_slice(&source.right[from..to]);
    }

    /// Adds `source` with a gain per channel.
    pub fn add_from(&mut self, source: &AudioBuffer, from: usize, to: usize, gain_l: f32, gain_r: f32) {
        for i in from..to {
            self.left[i] += source.left[i] * gain_l;
            self.right[i] += source.right[i] * gain_r;
        }
    }

    pub fn peaks(&self) -> [f32; 2] {
        let peak = |channel: &[f32]| channel.iter().fold(0.0f32, |max, sample| max.max(sample.abs()));
        [peak(&self.left), peak(&self.right)]
    }
}

/// Typed index into an [`Arena`].
pub struct SlotId<T> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SlotId<T> {
    fn new(index: usize) -> Self {
        Self { index, _marker: PhantomData }
    }
}

impl<T> Clone for SlotId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SlotId<T> {}

impl<T> PartialEq for SlotId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for SlotId<T> {}

impl<T> fmt::Debug for SlotId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

pub type BufferId = SlotId<AudioBuffer>;
pub type EventInputId = SlotId<EventBuffer>;

/// Slots are recycled after release, so steady-state rendering never
/// allocates.
#[derive(Debug)]
pub struct Arena<T> {
    slots: Vec<T>,
    free: Vec<usize>,
}

pub type AudioArena = Arena<AudioBuffer>;
pub type EventArena = Arena<EventBuffer>;

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self { slots: Vec::new(), free: Vec::new() }
    }
}

impl<T: Default> Arena<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> SlotId<T> {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = T::default();
                SlotId::new(index)
            }
            None => {
                self.slots.push(T::default());
                SlotId::new(self.slots.len() - 1)
            }
        }
    }

    pub fn release(&mut self, id: SlotId<T>) {
        debug_assert!(!self.free.contains(&id.index), "slot {id:?} released twice");
        self.free.push(id.index);
    }

    pub fn get(&self, id: SlotId<T>) -> &T {
        &self.slots[id.index]
    }

    pub fn get_mut(&mut self, id: SlotId<T>) -> &mut T {
        &mut self.slots[id.index]
    }

    /// Borrows one slot for reading and another for writing.
    pub fn pair_mut(&mut self, source: SlotId<T>, target: SlotId<T>) -> (&T, &mut T) {
        assert_ne!(source, target, "a slot cannot be its own source");
        if source.index < target.index {
            let (head, tail) = self.slots.split_at_mut(target.index);
            (&head[source.index], &mut tail[0])
        } else {
            let (head, tail) = self.slots.split_at_mut(source.index);
            (&tail[0], &mut head[target.index])
        }
    }

    pub fn live(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arena_recycles_slots() {
        let mut arena = AudioArena::new();
        let a = arena.allocate();
        let b = arena.allocate();
        arena.get_mut(a).channels_mut().0[0] = 1.0;
        arena.release(a);
        let c = arena.allocate();
        assert_eq!(a, c);
        assert_eq!(arena.get(c).left()[0], 0.0);
        assert_eq!(arena.live(), 2);
        assert_ne!(b, c);
    }

    #[test]
    fn test_pair_mut() {
        let mut arena = AudioArena::new();
        let a = arena.allocate();
        let b = arena.allocate();
        arena.get_mut(b).channels_mut().1[3] = 0.5;
        let (source, target) = arena.pair_mut(b, a);
        target.add_from(source, 0, RENDER_QUANTUM, 2.0, 2.0);
        assert_eq!(arena.get(a).right()[3], 1.0);
        assert_eq!(arena.get(a).peaks(), [0.0, 1.0]);
    }
}
