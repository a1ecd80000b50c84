//! Tracks open (sounding) events across block boundaries.

use crate::events::{NoteEvent, NoteId};
use tactus_shared::Ppqn;

/// Anything with an identity and a musical time span.
pub trait EventSpan {
    fn id(&self) -> NoteId;
    fn position(&self) -> Ppqn;
    fn duration(&self) -> Ppqn;

    fn complete(&self) -> Ppqn {
        self.position() + self.duration()
    }
}

impl EventSpan for NoteEvent {
    fn id(&self) -> NoteId {
        self.id
    }
    fn position(&self) -> Ppqn {
        self.position
    }
    fn duration(&self) -> Ppqn {
        self.duration
    }
}

/// Open events, kept sorted by descending end position so that the next
/// one to complete sits at the tail.
#[derive(Debug)]
pub struct EventSpanRetainer<E: EventSpan> {
    spans: Vec<E>,
}

impl<E: EventSpan> Default for EventSpanRetainer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventSpan> EventSpanRetainer<E> {
    pub fn new() -> Self {
        Self { spans: Vec::with_capacity(64) }
    }

    /// Retains `span`, replacing an open span with the same identity.
    pub fn add_and_retain(&mut self, span: E) {
        if let Some(existing) = self.spans.iter().position(|open| open.id() == span.id()) {
            self.spans.remove(existing);
        }
        let complete = span.complete();
        let index = self.spans.partition_point(|existing| existing.complete() > complete);
        self.spans.insert(index, span);
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.spans.iter().any(|span| span.id() == id)
    }

    /// Removes and yields, in increasing end order, every span ending at or
    /// before `to`.
    pub fn release_linear_completed(&mut self, to: Ppqn) -> impl Iterator<Item = E> + '_ {
        std::iter::from_fn(move || match self.spans.last() {
            Some(span) if span.complete() <= to => self.spans.pop(),
            _ => None,
        })
    }

    /// Removes and yields every open span.
    pub fn release_all(&mut self) -> impl Iterator<Item = E> + '_ {
        self.spans.drain(..).rev()
    }

    /// Spans containing `position`. Nothing is removed.
    pub fn overlapping(&self, position: Ppqn) -> impl Iterator<Item = &E> + '_ {
        self.spans.iter().filter(move |span| span.position() <= position && position < span.complete())
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn clear(&mut self) {
        self.spans.clear();
    }
}
