//! Low-level message layout shared by frontend and backend messages.
//!
//! Every tagged message is a one-byte type tag followed by a big-endian
//! `i32` length that counts itself and the body but not the tag.

use bytes::{Buf, BufMut, BytesMut};

use super::error::{DecodeError, EncodeError};

/// Tag byte plus length field.
pub(crate) const HEADER_LEN: usize = 5;

/// One tagged message borrowed from a larger buffer.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawMessage<'a> {
    pub(crate) tag: u8,
    pub(crate) body: &'a [u8],
}

/// Split the next tagged message off the front of `src`.
pub(crate) fn next_message<'a>(src: &mut &'a [u8]) -> Result<RawMessage<'a>, DecodeError> {
    if src.len() < HEADER_LEN {
        return Err(DecodeError::TruncatedHeader { have: src.len() });
    }
    let tag = src.get_u8();
    let length = src.get_i32();
    let body_len = usize::try_from(length)
        .ok()
        .and_then(|len| len.checked_sub(4))
        .ok_or(DecodeError::InvalidLength { tag, length })?;
    if body_len > src.len() {
        return Err(DecodeError::LengthOverrun {
            tag,
            declared: body_len,
            remaining: src.len(),
        });
    }
    let (body, rest) = src.split_at(body_len);
    *src = rest;
    Ok(RawMessage { tag, body })
}

/// Cursor over a message body that reports errors against its tag.
pub(crate) struct BodyReader<'a> {
    tag: u8,
    buf: &'a [u8],
}

impl<'a> BodyReader<'a> {
    pub(crate) fn new(tag: u8, buf: &'a [u8]) -> Self { Self { tag, buf } }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.len() < needed {
            return Err(DecodeError::TruncatedBody {
                tag: self.tag,
                needed: needed - self.buf.len(),
            });
        }
        Ok(())
    }

    pub(crate) fn tag(&self) -> u8 { self.tag }

    pub(crate) fn u8(&mut self) -> Result<u8, DecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn i16(&mut self) -> Result<i16, DecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16())
    }

    pub(crate) fn i32(&mut self) -> Result<i32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub(crate) fn u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32())
    }

    /// Read a non-negative 16-bit count.
    pub(crate) fn count(&mut self, field: &'static str) -> Result<usize, DecodeError> {
        let raw = self.i16()?;
        usize::try_from(raw).map_err(|_| DecodeError::InvalidValue {
            tag: self.tag,
            field,
            value: i64::from(raw),
        })
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(len)?;
        let (head, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(head)
    }

    /// Read a length-prefixed value where `-1` means SQL `NULL`.
    pub(crate) fn nullable(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        let len = self.i32()?;
        if len == -1 {
            return Ok(None);
        }
        let len = usize::try_from(len).map_err(|_| DecodeError::InvalidValue {
            tag: self.tag,
            field: "value length",
            value: i64::from(len),
        })?;
        Ok(Some(self.bytes(len)?.to_vec()))
    }

    pub(crate) fn cstr(&mut self) -> Result<String, DecodeError> {
        let end = self
            .buf
            .iter()
            .position(|b| *b == 0)
            .ok_or(DecodeError::MissingTerminator { tag: self.tag })?;
        let (raw, rest) = self.buf.split_at(end);
        self.buf = &rest[1..];
        String::from_utf8(raw.to_vec()).map_err(|_| DecodeError::InvalidUtf8 { tag: self.tag })
    }

    /// Take every remaining byte.
    pub(crate) fn rest(&mut self) -> &'a [u8] { std::mem::take(&mut self.buf) }

    /// Fail if any byte was left unread.
    pub(crate) fn finish(self) -> Result<(), DecodeError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(DecodeError::TrailingBytes {
                tag: self.tag,
                count: self.buf.len(),
            })
        }
    }
}

/// Append a message, backfilling its length once the body is written.
///
/// `tag` is `None` for the untagged startup-phase packets.
pub(crate) fn write_message(
    dst: &mut BytesMut,
    tag: Option<u8>,
    body: impl FnOnce(&mut BytesMut) -> Result<(), EncodeError>,
) -> Result<(), EncodeError> {
    if let Some(tag) = tag {
        dst.put_u8(tag);
    }
    let start = dst.len();
    dst.put_i32(0);
    body(dst)?;
    let size = dst.len() - start;
    let length = i32::try_from(size).map_err(|_| EncodeError::Oversized { size })?;
    dst[start..start + 4].copy_from_slice(&length.to_be_bytes());
    Ok(())
}

pub(crate) fn put_cstr(dst: &mut BytesMut, value: &str, field: &'static str) -> Result<(), EncodeError> {
    if value.as_bytes().contains(&0) {
        return Err(EncodeError::InteriorNul { field });
    }
    dst.put_slice(value.as_bytes());
    dst.put_u8(0);
    Ok(())
}

pub(crate) fn put_count(dst: &mut BytesMut, count: usize, field: &'static str) -> Result<(), EncodeError> {
    let count = i16::try_from(count).map_err(|_| EncodeError::TooManyValues { field, count })?;
    dst.put_i16(count);
    Ok(())
}

pub(crate) fn put_nullable(dst: &mut BytesMut, value: Option<&[u8]>) -> Result<(), EncodeError> {
    match value {
        None => dst.put_i32(-1),
        Some(bytes) => {
            let len = i32::try_from(bytes.len())
                .map_err(|_| EncodeError::Oversized { size: bytes.len() })?;
            dst.put_i32(len);
            dst.put_slice(bytes);
        }
    }
    Ok(())
}
