//! Module `buf` implement the encoded byte buffer that carries
//! knowledge across participant boundaries.
//!
//! An [Encoded] value is a growable byte buffer tagged with the type of
//! knowledge it carries, along with a read cursor. Writes append at the
//! end, reads advance the cursor. The engine never interprets the bytes
//! between the primitives; field order is the application's contract.

use std::convert::TryFrom;

use crate::{Error, Result};

/// Fixed width primitive that can ride through an [Encoded] buffer.
///
/// All scalars are written little-endian.
pub trait Scalar: Copy {
    const WIDTH: usize;

    fn write_to(&self, out: &mut Vec<u8>);

    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($t:ty),*) => {$(
        impl Scalar for $t {
            const WIDTH: usize = std::mem::size_of::<$t>();

            fn write_to(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_from(buf: &[u8]) -> $t {
                let mut raw = [0_u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&buf[..Self::WIDTH]);
                <$t>::from_le_bytes(raw)
            }
        }
    )*};
}

impl_scalar![u8, u16, u32, u64, i8, i16, i32, i64, f32, f64];

impl Scalar for bool {
    const WIDTH: usize = 1;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.push(if *self { 1 } else { 0 });
    }

    fn read_from(buf: &[u8]) -> bool {
        buf[0] != 0
    }
}

/// Encoded knowledge, a typed byte stream with a read cursor.
#[derive(Clone)]
pub struct Encoded {
    ktype: String,
    data: Vec<u8>,
    cursor: usize,
}

impl Encoded {
    /// Create an empty buffer carrying knowledge of type `ktype`. The
    /// type tag is fixed for the lifetime of the buffer.
    pub fn new(ktype: &str) -> Encoded {
        Encoded {
            ktype: ktype.to_string(),
            data: Vec::default(),
            cursor: 0,
        }
    }

    /// Reconstruct a buffer from its wire representation, cursor at the
    /// beginning.
    pub fn from_parts(ktype: &str, data: Vec<u8>) -> Encoded {
        Encoded {
            ktype: ktype.to_string(),
            data,
            cursor: 0,
        }
    }

    /// Return the knowledge type this buffer carries.
    pub fn as_type(&self) -> &str {
        &self.ktype
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet consumed by reads.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    /// Rewind the read cursor to the beginning.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl Encoded {
    pub fn write_scalar<T: Scalar>(&mut self, val: T) {
        val.write_to(&mut self.data);
    }

    pub fn read_scalar<T: Scalar>(&mut self) -> Result<T> {
        self.check(T::WIDTH)?;
        let val = T::read_from(&self.data[self.cursor..]);
        self.cursor += T::WIDTH;
        Ok(val)
    }

    /// Append `vals` with a leading element count.
    pub fn write_array<T: Scalar>(&mut self, vals: &[T]) {
        self.write_scalar(vals.len() as u64);
        for val in vals.iter() {
            val.write_to(&mut self.data);
        }
    }

    pub fn read_array<T: Scalar>(&mut self) -> Result<Vec<T>> {
        let n = self.read_count()?;
        self.check(n.saturating_mul(T::WIDTH))?;
        let mut vals = Vec::with_capacity(n);
        for _ in 0..n {
            vals.push(T::read_from(&self.data[self.cursor..]));
            self.cursor += T::WIDTH;
        }
        Ok(vals)
    }

    /// Append raw bytes with a leading count.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_scalar(bytes.len() as u64);
        self.data.extend_from_slice(bytes);
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let n = self.read_count()?;
        self.check(n)?;
        let bytes = self.data[self.cursor..self.cursor + n].to_vec();
        self.cursor += n;
        Ok(bytes)
    }

    pub fn write_str(&mut self, val: &str) {
        self.write_bytes(val.as_bytes());
    }

    pub fn read_str(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        err_at!(FailConvert, String::from_utf8(bytes))
    }

    fn read_count(&mut self) -> Result<usize> {
        let n: u64 = self.read_scalar()?;
        err_at!(FailConvert, usize::try_from(n))
    }

    fn check(&self, want: usize) -> Result<()> {
        if self.remaining() < want {
            err_at!(
                BufferOverrun,
                msg: "type {}, {}/{}", self.ktype, self.remaining(), want
            )
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "buf_test.rs"]
mod buf_test;
