//! Field-level codec shared by both message catalogs

use bytes::{Buf, BufMut, BytesMut};

use animproc_core::{AnimError, AnimResult};

/// Cursor over a received payload; every read is bounds-checked
pub struct WireReader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        WireReader {
            buf,
            total: buf.len(),
        }
    }

    /// Bytes not consumed yet
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Bytes consumed so far
    #[inline]
    pub fn consumed(&self) -> usize {
        self.total - self.buf.remaining()
    }

    #[inline]
    fn need(&self, n: usize) -> AnimResult<()> {
        if self.buf.remaining() < n {
            return Err(AnimError::BufferTooShort {
                expected: self.consumed() + n,
                actual: self.total,
            });
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> AnimResult<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn get_bool(&mut self) -> AnimResult<bool> {
        match self.get_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(AnimError::InvalidWireFormat(format!(
                "bool field holds {}",
                other
            ))),
        }
    }

    pub fn get_u16(&mut self) -> AnimResult<u16> {
        self.need(2)?;
        Ok(self.buf.get_u16_le())
    }

    pub fn get_i16(&mut self) -> AnimResult<i16> {
        self.need(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn get_u32(&mut self) -> AnimResult<u32> {
        self.need(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn get_i32(&mut self) -> AnimResult<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn get_f32(&mut self) -> AnimResult<f32> {
        self.need(4)?;
        Ok(self.buf.get_f32_le())
    }

    pub fn get_slice(&mut self, len: usize) -> AnimResult<&'a [u8]> {
        self.need(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }
}

/// Growable output buffer for one message
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        WireWriter {
            buf: BytesMut::with_capacity(64),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn put_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.buf.put_i16_le(v);
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.put_i32_le(v);
    }

    pub fn put_f32(&mut self, v: f32) {
        self.buf.put_f32_le(v);
    }

    pub fn put_slice(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

impl Default for WireWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A value with a fixed wire shape
pub trait WireField: Sized {
    fn encode(&self, w: &mut WireWriter) -> AnimResult<()>;
    fn decode(r: &mut WireReader<'_>) -> AnimResult<Self>;
}

macro_rules! scalar_field {
    ($($ty:ty => $get:ident, $put:ident;)*) => {
        $(
            impl WireField for $ty {
                #[inline]
                fn encode(&self, w: &mut WireWriter) -> AnimResult<()> {
                    w.$put(*self);
                    Ok(())
                }

                #[inline]
                fn decode(r: &mut WireReader<'_>) -> AnimResult<Self> {
                    r.$get()
                }
            }
        )*
    };
}

scalar_field! {
    u8 => get_u8, put_u8;
    bool => get_bool, put_bool;
    u16 => get_u16, put_u16;
    i16 => get_i16, put_i16;
    u32 => get_u32, put_u32;
    i32 => get_i32, put_i32;
    f32 => get_f32, put_f32;
}

impl<T: WireField + Copy + Default, const N: usize> WireField for [T; N] {
    fn encode(&self, w: &mut WireWriter) -> AnimResult<()> {
        for item in self {
            item.encode(w)?;
        }
        Ok(())
    }

    fn decode(r: &mut WireReader<'_>) -> AnimResult<Self> {
        let mut out = [T::default(); N];
        for slot in out.iter_mut() {
            *slot = T::decode(r)?;
        }
        Ok(out)
    }
}

/// UTF-8 string with a capacity of `N` bytes, sent as `u16` length + bytes
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct FixedString<const N: usize>(String);

impl<const N: usize> FixedString<N> {
    pub const CAPACITY: usize = N;

    /// Wrap `s`, failing if it exceeds the capacity
    pub fn new(s: impl Into<String>) -> AnimResult<Self> {
        let s = s.into();
        if s.len() > N {
            return Err(AnimError::FieldTooLong {
                field: "string",
                len: s.len(),
                capacity: N,
            });
        }
        Ok(FixedString(s))
    }

    /// Wrap `s`, cutting it at the last char boundary that fits
    pub fn truncated(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        FixedString(s[..end].to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<const N: usize> std::fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl<const N: usize> WireField for FixedString<N> {
    fn encode(&self, w: &mut WireWriter) -> AnimResult<()> {
        if self.0.len() > N {
            return Err(AnimError::FieldTooLong {
                field: "string",
                len: self.0.len(),
                capacity: N,
            });
        }
        w.put_u16(self.0.len() as u16);
        w.put_slice(self.0.as_bytes());
        Ok(())
    }

    fn decode(r: &mut WireReader<'_>) -> AnimResult<Self> {
        let len = r.get_u16()? as usize;
        if len > N {
            return Err(AnimError::FieldTooLong {
                field: "string",
                len,
                capacity: N,
            });
        }
        let bytes = r.get_slice(len)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| AnimError::InvalidWireFormat(e.to_string()))?;
        Ok(FixedString(s.to_string()))
    }
}

/// Sequence of at most `N` elements, sent as `u16` count + elements
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoundedVec<T, const N: usize>(Vec<T>);

impl<T, const N: usize> BoundedVec<T, N> {
    pub const CAPACITY: usize = N;

    pub fn new(items: Vec<T>) -> AnimResult<Self> {
        if items.len() > N {
            return Err(AnimError::FieldTooLong {
                field: "array",
                len: items.len(),
                capacity: N,
            });
        }
        Ok(BoundedVec(items))
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.0
    }
}

impl<T: WireField, const N: usize> WireField for BoundedVec<T, N> {
    fn encode(&self, w: &mut WireWriter) -> AnimResult<()> {
        if self.0.len() > N {
            return Err(AnimError::FieldTooLong {
                field: "array",
                len: self.0.len(),
                capacity: N,
            });
        }
        w.put_u16(self.0.len() as u16);
        for item in &self.0 {
            item.encode(w)?;
        }
        Ok(())
    }

    fn decode(r: &mut WireReader<'_>) -> AnimResult<Self> {
        let len = r.get_u16()? as usize;
        if len > N {
            return Err(AnimError::FieldTooLong {
                field: "array",
                len,
                capacity: N,
            });
        }
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode(r)?);
        }
        Ok(BoundedVec(items))
    }
}
