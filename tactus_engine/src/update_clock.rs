use crate::block::ProcessInfo;
use crate::buffers::EventInputId;
use crate::events::Event;
use crate::processor::ProcessContext;
use tactus_shared::ppqn::fragments;
use tactus_shared::Ppqn;

/// Emits the periodic automation ticks. Every subscriber's event input
/// receives an update at each multiple of the rate while transporting.
pub struct UpdateClock {
    rate: Ppqn,
    subscribers: Vec<EventInputId>,
}

impl UpdateClock {
    pub fn new(rate: Ppqn) -> Self {
        Self { rate, subscribers: Vec::new() }
    }

    pub fn subscribe(&mut self, input: EventInputId) {
        debug_assert!(!self.subscribers.contains(&input), "{input:?} subscribed twice");
        self.subscribers.push(input);
    }

    pub fn unsubscribe(&mut self, input: EventInputId) {
        self.subscribers.retain(|candidate| *candidate != input);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn process(&mut self, ctx: &mut ProcessContext, info: &ProcessInfo) {
        for block in &info.blocks {
            if !block.flags.transporting() {
                continue;
            }
            for fragment in fragments(block.p0, block.p1, self.rate) {
                for input in &self.subscribers {
                    ctx.events.get_mut(*input).add(block.index, Event::Update { position: fragment.position });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockFlags;
    use crate::processor::harness::{block, Harness};

    #[test]
    fn test_ticks_while_transporting() {
        let mut harness = Harness::new();
        let a = harness.events.allocate();
        let b = harness.events.allocate();
        let mut clock = UpdateClock::new(3.0);
        clock.subscribe(a);
        clock.subscribe(b);
        let mut stopped = block(1, 8.0, 64, 128);
        stopped.flags = BlockFlags::NONE;
        let info = ProcessInfo { blocks: vec![block(0, 0.0, 0, 64), stopped] };
        clock.process(&mut harness.context(), &info);

        let positions: Vec<Ppqn> = harness.events.get(a).get(0).iter().map(Event::position).collect();
        assert_eq!(positions, vec![0.0, 3.0]);
        assert_eq!(harness.events.get(b).get(0).len(), 2);
        assert!(harness.events.get(a).get(1).is_empty());

        clock.unsubscribe(a);
        assert_eq!(clock.subscriber_count(), 1);
    }
}
