//! Fixed-layout payload schemas.
//!
//! A schema declares its fields up front. The byte layout never changes after
//! construction, which lets the exchange slot reserve the exact payload size
//! once and (de)serialize without allocating. All values are big-endian.

use crate::error::SchemaError;

/// A single field of a fixed-layout schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Floats(usize),
    Doubles(usize),
}

impl Field {
    pub const fn size(&self) -> usize {
        match self {
            Field::Bool | Field::Int8 => 1,
            Field::Int16 => 2,
            Field::Int32 | Field::Float => 4,
            Field::Int64 | Field::Double => 8,
            Field::Floats(n) => 4 * *n,
            Field::Doubles(n) => 8 * *n,
        }
    }
}

/// Sink for schema values.
pub trait Output {
    fn write_bytes(&mut self, bytes: &[u8]);

    fn write_bool(&mut self, value: bool) {
        self.write_bytes(&[value as u8]);
    }
    fn write_i8(&mut self, value: i8) {
        self.write_bytes(&value.to_be_bytes());
    }
    fn write_i16(&mut self, value: i16) {
        self.write_bytes(&value.to_be_bytes());
    }
    fn write_i32(&mut self, value: i32) {
        self.write_bytes(&value.to_be_bytes());
    }
    fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_be_bytes());
    }
    fn write_f32(&mut self, value: f32) {
        self.write_bytes(&value.to_be_bytes());
    }
    fn write_f64(&mut self, value: f64) {
        self.write_bytes(&value.to_be_bytes());
    }
    fn write_f32s(&mut self, values: &[f32]) {
        for value in values {
            self.write_f32(*value);
        }
    }
    fn write_f64s(&mut self, values: &[f64]) {
        for value in values {
            self.write_f64(*value);
        }
    }
}

/// Counts bytes instead of writing them.
#[derive(Debug, Default)]
pub struct ByteCounter {
    count: usize,
}

impl ByteCounter {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Output for ByteCounter {
    fn write_bytes(&mut self, bytes: &[u8]) {
        self.count += bytes.len();
    }
}

/// Writes into a pre-sized byte slice.
pub struct ByteWriter<'a> {
    bytes: &'a mut [u8],
    position: usize,
}

impl<'a> ByteWriter<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl Output for ByteWriter<'_> {
    fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.position + bytes.len();
        self.bytes[self.position..end].copy_from_slice(bytes);
        self.position = end;
    }
}

/// Reads from a byte slice in the order it was written.
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.position..self.position + N]);
        self.position += N;
        out
    }

    pub fn read_bool(&mut self) -> bool {
        self.take::<1>()[0] != 0
    }
    pub fn read_i8(&mut self) -> i8 {
        i8::from_be_bytes(self.take())
    }
    pub fn read_i16(&mut self) -> i16 {
        i16::from_be_bytes(self.take())
    }
    pub fn read_i32(&mut self) -> i32 {
        i32::from_be_bytes(self.take())
    }
    pub fn read_i64(&mut self) -> i64 {
        i64::from_be_bytes(self.take())
    }
    pub fn read_f32(&mut self) -> f32 {
        f32::from_be_bytes(self.take())
    }
    pub fn read_f64(&mut self) -> f64 {
        f64::from_be_bytes(self.take())
    }
    pub fn read_f32s(&mut self, target: &mut [f32]) {
        for value in target.iter_mut() {
            *value = self.read_f32();
        }
    }
    pub fn read_f64s(&mut self, target: &mut [f64]) {
        for value in target.iter_mut() {
            *value = self.read_f64();
        }
    }
}

/// A value with a fixed binary layout.
///
/// `write` must emit exactly the declared [`Schema::FIELDS`], in order, and
/// `read` must consume them in the same order.
pub trait Schema: Default {
    const FIELDS: &'static [Field];

    fn write<O: Output>(&self, output: &mut O);
    fn read(&mut self, input: &mut ByteReader<'_>);
}

/// Payload size of `S`, validated against what its writer actually emits.
pub fn layout_size<S: Schema>() -> Result<usize, SchemaError> {
    if S::FIELDS.is_empty() {
        return Err(SchemaError::Empty);
    }
    let declared: usize = S::FIELDS.iter().map(Field::size).sum();
    let mut counter = ByteCounter::default();
    S::default().write(&mut counter);
    if counter.count() != declared {
        return Err(SchemaError::LayoutMismatch { declared, written: counter.count() });
    }
    Ok(declared)
}

/// Decodes a payload that is expected to hold exactly one `S`.
pub fn decode<S: Schema>(bytes: &[u8], target: &mut S) -> Result<(), SchemaError> {
    let required = layout_size::<S>()?;
    if bytes.len() < required {
        return Err(SchemaError::Truncated { required, available: bytes.len() });
    }
    target.read(&mut ByteReader::new(&bytes[..required]));
    Ok(())
}
