//! Single-slot, latest-value-wins exchange between one writer and one reader.
//!
//! The region starts with one atomic state byte followed by the payload of a
//! fixed-layout [`Schema`]. The state cycles `READ -> WRITING -> WRITTEN ->
//! READING -> READ`. Each side only touches the payload while the state byte
//! says it owns it, so the byte is the only synchronisation needed and
//! neither side ever waits.

use crate::error::{ExchangeError, Result};
use crate::schema::{layout_size, ByteReader, ByteWriter, Schema};
use serde::{Deserialize, Serialize};
use shared_memory::{Shmem, ShmemConf};
use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

pub const READ: u8 = 0;
pub const WRITING: u8 = 1;
pub const WRITTEN: u8 = 2;
pub const READING: u8 = 3;

/// Configuration for an OS shared memory region.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ShmemConfig {
    /// OS-specific name/identifier for the shared memory region
    pub os_id: String,
    /// Size of the region in bytes
    pub size: usize,
}

enum Backing {
    Heap(Box<[UnsafeCell<u8>]>),
    Shared(Shmem),
}

// Access to the bytes is arbitrated by the state byte at offset 0.
unsafe impl Send for Backing {}
unsafe impl Sync for Backing {}

/// A fixed-size memory region shared by exactly one writer and one reader.
#[derive(Clone)]
pub struct ExchangeRegion {
    backing: Arc<Backing>,
}

impl ExchangeRegion {
    /// A zeroed region in this process.
    pub fn heap(size: usize) -> Self {
        let bytes = (0..size).map(|_| UnsafeCell::new(0u8)).collect::<Vec<_>>().into_boxed_slice();
        Self { backing: Arc::new(Backing::Heap(bytes)) }
    }

    /// Creates an OS shared memory mapping another process can open.
    pub fn create_shared(config: &ShmemConfig) -> Result<Self> {
        let shmem = ShmemConf::new()
            .size(config.size)
            .os_id(&config.os_id)
            .create()
            .map_err(|err| ExchangeError::SharedMemory(err.to_string()))?;
        unsafe {
            std::ptr::write_bytes(shmem.as_ptr(), 0, shmem.len());
        }
        Ok(Self { backing: Arc::new(Backing::Shared(shmem)) })
    }

    /// Opens a mapping created by [`ExchangeRegion::create_shared`].
    pub fn open_shared(os_id: &str) -> Result<Self> {
        let shmem = ShmemConf::new()
            .os_id(os_id)
            .open()
            .map_err(|err| ExchangeError::SharedMemory(err.to_string()))?;
        Ok(Self { backing: Arc::new(Backing::Shared(shmem)) })
    }

    pub fn len(&self) -> usize {
        match self.backing.as_ref() {
            Backing::Heap(bytes) => bytes.len(),
            Backing::Shared(shmem) => shmem.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn as_ptr(&self) -> *mut u8 {
        match self.backing.as_ref() {
            Backing::Heap(bytes) => UnsafeCell::raw_get(bytes.as_ptr()),
            Backing::Shared(shmem) => shmem.as_ptr(),
        }
    }
}

/// The region validated for schema `S`.
struct Slot<S: Schema> {
    region: ExchangeRegion,
    payload_size: usize,
    _schema: PhantomData<fn() -> S>,
}

impl<S: Schema> Slot<S> {
    fn new(region: ExchangeRegion) -> Result<Self> {
        let payload_size = layout_size::<S>()?;
        let required = payload_size + 1;
        if region.len() < required {
            return Err(ExchangeError::RegionTooSmall { required, provided: region.len() });
        }
        Ok(Self { region, payload_size, _schema: PhantomData })
    }

    fn state(&self) -> &AtomicU8 {
        // AtomicU8 has the size and alignment of u8.
        unsafe { &*(self.region.as_ptr() as *const AtomicU8) }
    }

    /// # Safety
    /// The caller must own the payload according to the state byte.
    #[allow(clippy::mut_from_ref)]
    unsafe fn payload_mut(&self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.region.as_ptr().add(1), self.payload_size) }
    }

    /// # Safety
    /// The caller must own the payload according to the state byte.
    unsafe fn payload(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.region.as_ptr().add(1), self.payload_size) }
    }
}

/// Writing side. Owned by the audio thread.
pub struct SyncWriter<S: Schema> {
    slot: Slot<S>,
    snapshot: S,
}

impl<S: Schema> SyncWriter<S> {
    pub fn new(region: ExchangeRegion) -> Result<Self> {
        Ok(Self { slot: Slot::new(region)?, snapshot: S::default() })
    }

    /// Publishes a new value unless the reader still holds the previous one.
    ///
    /// `populate` runs only when the slot was acquired.
    pub fn try_write(&mut self, populate: impl FnOnce(&mut S)) -> bool {
        let state = self.slot.state();
        if state.compare_exchange(READ, WRITING, Ordering::Acquire, Ordering::Relaxed).is_err() {
            return false;
        }
        populate(&mut self.snapshot);
        let payload = unsafe { self.slot.payload_mut() };
        self.snapshot.write(&mut ByteWriter::new(payload));
        state.store(WRITTEN, Ordering::Release);
        true
    }
}

/// Reading side. Owned by the controller thread.
pub struct SyncReader<S: Schema> {
    slot: Slot<S>,
    snapshot: S,
}

impl<S: Schema> SyncReader<S> {
    pub fn new(region: ExchangeRegion) -> Result<Self> {
        Ok(Self { slot: Slot::new(region)?, snapshot: S::default() })
    }

    /// Hands the latest unread value to `consumer`, if there is one.
    pub fn try_read(&mut self, consumer: impl FnOnce(&S)) -> bool {
        let state = self.slot.state();
        if state.compare_exchange(WRITTEN, READING, Ordering::Acquire, Ordering::Relaxed).is_err() {
            return false;
        }
        let payload = unsafe { self.slot.payload() };
        self.snapshot.read(&mut ByteReader::new(payload));
        state.store(READ, Ordering::Release);
        consumer(&self.snapshot);
        true
    }
}
