//! Best-effort telemetry from the audio thread.
//!
//! Unlike the state snapshot, records may be dropped: a full queue
//! discards new records instead of blocking the producer.

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TelemetryRecord {
    /// Peak levels of the primary output, per channel.
    MasterPeaks([f32; 2]),
    /// Peak levels after a channel strip.
    ChannelPeaks { unit: Uuid, peaks: [f32; 2] },
    NoteOn { unit: Uuid, pitch: u8 },
    NoteOff { unit: Uuid, pitch: u8 },
}

pub struct Telemetry {
    producer: HeapProd<TelemetryRecord>,
    dropped: u64,
}

pub struct TelemetryReceiver {
    consumer: HeapCons<TelemetryRecord>,
}

pub fn channel(capacity: usize) -> (Telemetry, TelemetryReceiver) {
    let (producer, consumer) = HeapRb::<TelemetryRecord>::new(capacity).split();
    (Telemetry { producer, dropped: 0 }, TelemetryReceiver { consumer })
}

impl Telemetry {
    pub fn push(&mut self, record: TelemetryRecord) {
        if self.producer.try_push(record).is_err() {
            self.dropped += 1;
        }
    }

    /// Records lost to a lagging consumer since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl TelemetryReceiver {
    pub fn try_recv(&mut self) -> Option<TelemetryRecord> {
        self.consumer.try_pop()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = TelemetryRecord> + '_ {
        std::iter::from_fn(move || self.consumer.try_pop())
    }
}
