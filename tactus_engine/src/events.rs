//! Discrete events carried through event inputs.

use tactus_shared::Ppqn;

pub type NoteId = u64;

/// A sounding note. `duration` may be infinite for live input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    pub id: NoteId,
    pub position: Ppqn,
    pub duration: Ppqn,
    pub pitch: u8,
    pub velocity: f32,
    pub cent: f32,
}

impl NoteEvent {
    pub fn complete(&self) -> Ppqn {
        self.position + self.duration
    }

    pub fn overlaps(&self, position: Ppqn) -> bool {
        self.position <= position && position < self.complete()
    }
}

/// Start and stop of a note, linked by the note's identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteLifecycleEvent {
    Start(NoteEvent),
    Stop { id: NoteId, pitch: u8, position: Ppqn },
}

impl NoteLifecycleEvent {
    pub fn stop(note: &NoteEvent, position: Ppqn) -> Self {
        NoteLifecycleEvent::Stop { id: note.id, pitch: note.pitch, position }
    }

    pub fn position(&self) -> Ppqn {
        match self {
            NoteLifecycleEvent::Start(note) => note.position,
            NoteLifecycleEvent::Stop { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    NoteStart(NoteEvent),
    NoteStop { id: NoteId, pitch: u8, position: Ppqn },
    /// Periodic automation tick.
    Update { position: Ppqn },
    /// Device specific control change.
    Controller { position: Ppqn, parameter: u16, value: f32 },
}

impl Event {
    pub fn position(&self) -> Ppqn {
        match self {
            Event::NoteStart(note) => note.position,
            Event::NoteStop { position, .. } | Event::Update { position } | Event::Controller { position, .. } => *position,
        }
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Event::Update { .. })
    }
}

impl From<NoteLifecycleEvent> for Event {
    fn from(event: NoteLifecycleEvent) -> Self {
        match event {
            NoteLifecycleEvent::Start(note) => Event::NoteStart(note),
            NoteLifecycleEvent::Stop { id, pitch, position } => Event::NoteStop { id, pitch, position },
        }
    }
}

/// Monotonic note identity counter owned by the engine context.
#[derive(Debug, Default)]
pub struct NoteIds {
    next: NoteId,
}

impl NoteIds {
    pub fn next(&mut self) -> NoteId {
        self.next += 1;
        self.next
    }
}

/// Events of one callback, keyed by sub-block index.
///
/// Each block keeps its events sorted by position; ties stay in insertion
/// order. Storage is kept between callbacks so steady-state use does not
/// allocate.
#[derive(Debug, Default)]
pub struct EventBuffer {
    blocks: Vec<Vec<Event>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self { blocks: (0..8).map(|_| Vec::with_capacity(32)).collect() }
    }

    pub fn add(&mut self, index: usize, event: Event) {
        if self.blocks.len() <= index {
            self.blocks.resize_with(index + 1, || Vec::with_capacity(32));
        }
        let events = &mut self.blocks[index];
        let position = event.position();
        let at = events.partition_point(|existing| existing.position() <= position);
        events.insert(at, event);
    }

    pub fn get(&self, index: usize) -> &[Event] {
        self.blocks.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(Vec::is_empty)
    }

    pub fn clear(&mut self) {
        for events in self.blocks.iter_mut() {
            events.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_insertion_keeps_tie_order() {
        let mut buffer = EventBuffer::new();
        buffer.add(0, Event::Update { position: 20.0 });
        buffer.add(0, Event::Controller { position: 10.0, parameter: 1, value: 0.0 });
        buffer.add(0, Event::Controller { position: 10.0, parameter: 2, value: 0.0 });
        buffer.add(12, Event::Update { position: 5.0 });

        let parameters: Vec<_> = buffer
            .get(0)
            .iter()
            .map(|event| match event {
                Event::Controller { parameter, .. } => *parameter,
                _ => 0,
            })
            .collect();
        assert_eq!(parameters, vec![1, 2, 0]);
        assert_eq!(buffer.get(12).len(), 1);
        assert!(buffer.get(40).is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_note_ids_are_unique() {
        let mut ids = NoteIds::default();
        let a = ids.next();
        let b = ids.next();
        assert_ne!(a, b);
    }
}
