//! Minimal bounds-checked flatbuffer reader.
//!
//! Only the pieces needed to walk a TFLite model are supported: vectors of
//! tables, vectors of scalars, strings and scalar fields. Every
//! offset is validated against the buffer length before it is followed, so a
//! truncated or hostile binary yields `ArtifactInvalid` rather than a panic.

use crate::error::{Result, SporeError};

const UOFFSET_SIZE: usize = 4;

/// A verified view over a complete flatbuffer.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FlatBuffer<'a> {
    buf: &'a [u8],
}

impl<'a> FlatBuffer<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// The 4-byte file identifier following the root offset, if present.
    pub fn file_identifier(&self) -> Option<&'a [u8]> {
        self.buf.get(UOFFSET_SIZE..UOFFSET_SIZE * 2)
    }

    /// The root table.
    pub fn root(&self) -> Result<Table<'a>> {
        let offset = read_u32(self.buf, 0)? as usize;
        Table::at(self.buf, offset)
    }
}

/// A table inside the buffer together with its vtable.
///
/// Fields are addressed by vtable offset (`4 + 2 * field_index`), the same
/// constants the builder side pushes slots with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Table<'a> {
    buf: &'a [u8],
    pos: usize,
    vtable: usize,
    vtable_len: usize,
}

impl<'a> Table<'a> {
    fn at(buf: &'a [u8], pos: usize) -> Result<Self> {
        let soffset = read_i32(buf, pos)? as i64;
        let vtable = pos as i64 - soffset;
        if vtable < 0 {
            return Err(out_of_bounds("vtable", vtable));
        }
        let vtable = vtable as usize;
        let vtable_len = read_u16(buf, vtable)? as usize;
        let object_len = read_u16(buf, vtable + 2)? as usize;
        if vtable_len < 4 || vtable_len % 2 != 0 {
            return Err(SporeError::artifact_invalid(format!(
                "malformed vtable at byte {vtable} (length {vtable_len})"
            )));
        }
        ensure_range(buf, vtable, vtable_len)?;
        ensure_range(buf, pos, object_len)?;
        Ok(Self {
            buf,
            pos,
            vtable,
            vtable_len,
        })
    }

    /// Absolute position of a field, or `None` when it is absent.
    fn field_pos(&self, voffset: u16) -> Result<Option<usize>> {
        let voffset = voffset as usize;
        if voffset + 2 > self.vtable_len {
            return Ok(None);
        }
        match read_u16(self.buf, self.vtable + voffset)? {
            0 => Ok(None),
            field => Ok(Some(self.pos + field as usize)),
        }
    }

    /// Follow a uoffset stored at `pos`.
    fn follow(&self, pos: usize) -> Result<usize> {
        let offset = read_u32(self.buf, pos)? as usize;
        pos.checked_add(offset)
            .filter(|target| *target < self.buf.len())
            .ok_or_else(|| out_of_bounds("offset", (pos + offset) as i64))
    }

    pub fn u32_field(&self, voffset: u16, default: u32) -> Result<u32> {
        match self.field_pos(voffset)? {
            Some(pos) => read_u32(self.buf, pos),
            None => Ok(default),
        }
    }

    pub fn i8_field(&self, voffset: u16, default: i8) -> Result<i8> {
        match self.field_pos(voffset)? {
            Some(pos) => read_u8(self.buf, pos).map(|b| b as i8),
            None => Ok(default),
        }
    }

    pub fn vector(&self, voffset: u16) -> Result<Option<Vector<'a>>> {
        match self.field_pos(voffset)? {
            Some(pos) => Vector::at(self.buf, self.follow(pos)?).map(Some),
            None => Ok(None),
        }
    }

    pub fn string(&self, voffset: u16) -> Result<Option<&'a str>> {
        let Some(vector) = self.vector(voffset)? else {
            return Ok(None);
        };
        let bytes = vector.bytes(1)?;
        std::str::from_utf8(bytes)
            .map(Some)
            .map_err(|e| SporeError::artifact_invalid(format!("string is not UTF-8: {e}")))
    }
}

/// A length-prefixed vector.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Vector<'a> {
    buf: &'a [u8],
    /// Position of the first element.
    start: usize,
    len: usize,
}

impl<'a> Vector<'a> {
    fn at(buf: &'a [u8], pos: usize) -> Result<Self> {
        let len = read_u32(buf, pos)? as usize;
        Ok(Self {
            buf,
            start: pos + UOFFSET_SIZE,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bytes(&self, element_size: usize) -> Result<&'a [u8]> {
        let size = self
            .len
            .checked_mul(element_size)
            .ok_or_else(|| out_of_bounds("vector length", self.len as i64))?;
        ensure_range(self.buf, self.start, size)?;
        Ok(&self.buf[self.start..self.start + size])
    }

    fn element_pos(&self, index: usize, element_size: usize) -> Result<usize> {
        if index >= self.len {
            return Err(SporeError::artifact_invalid(format!(
                "vector index {index} out of range (length {})",
                self.len
            )));
        }
        Ok(self.start + index * element_size)
    }

    pub fn i32_at(&self, index: usize) -> Result<i32> {
        read_i32(self.buf, self.element_pos(index, 4)?)
    }

    pub fn table_at(&self, index: usize) -> Result<Table<'a>> {
        let pos = self.element_pos(index, UOFFSET_SIZE)?;
        let offset = read_u32(self.buf, pos)? as usize;
        Table::at(self.buf, pos + offset)
    }

    /// Every element read as `i32`.
    pub fn to_i32_vec(&self) -> Result<Vec<i32>> {
        (0..self.len).map(|i| self.i32_at(i)).collect()
    }
}

fn ensure_range(buf: &[u8], pos: usize, len: usize) -> Result<()> {
    match pos.checked_add(len) {
        Some(end) if end <= buf.len() => Ok(()),
        _ => Err(out_of_bounds("range", pos as i64)),
    }
}

fn read_array<const N: usize>(buf: &[u8], pos: usize) -> Result<[u8; N]> {
    buf.get(pos..pos.saturating_add(N))
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| out_of_bounds("read", pos as i64))
}

fn read_u8(buf: &[u8], pos: usize) -> Result<u8> {
    read_array::<1>(buf, pos).map(|b| b[0])
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16> {
    read_array(buf, pos).map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], pos: usize) -> Result<u32> {
    read_array(buf, pos).map(u32::from_le_bytes)
}

fn read_i32(buf: &[u8], pos: usize) -> Result<i32> {
    read_array(buf, pos).map(i32::from_le_bytes)
}

fn out_of_bounds(what: &str, pos: i64) -> SporeError {
    SporeError::artifact_invalid(format!("{what} at byte {pos} is out of bounds"))
}
