//! Positional pack/unpack driven by a format string.
//!
//! | Code | Field | Wire |
//! |------|-------|------|
//! | `h` | [`Field::I16`] | 2 bytes BE |
//! | `l` | [`Field::I32`] | 4 bytes BE |
//! | `c` | [`Field::U8`]  | 1 byte |
//! | `f` | [`Field::F32`] | 4 bytes, IEEE-754 via [`pack_f32`] |
//! | `d` | [`Field::F64`] | 8 bytes, IEEE-754 via [`pack_f64`] |
//! | `s` | [`Field::Str`] | 2-byte BE length, then the bytes |
//!
//! Digits directly before `s` cap the string length accepted by [`unpack`]:
//! a longer string keeps `max - 1` bytes (room for a terminator on the
//! sending side's C peers) and the rest of it is skipped.

use bytes::BytesMut;

use crate::error::{FrameError, Result};
use crate::wire::{
    get_u16, get_u32, get_u64, pack_f32, pack_f64, put_u16, put_u32, put_u64, unpack_f32,
    unpack_f64,
};

/// One value in a packed record.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    I16(i16),
    I32(i32),
    U8(u8),
    F32(f32),
    F64(f64),
    Str(String),
}

impl Field {
    fn code(&self) -> char {
        match self {
            Field::I16(_) => 'h',
            Field::I32(_) => 'l',
            Field::U8(_) => 'c',
            Field::F32(_) => 'f',
            Field::F64(_) => 'd',
            Field::Str(_) => 's',
        }
    }

    fn wire_size(&self) -> usize {
        match self {
            Field::I16(_) => 2,
            Field::I32(_) | Field::F32(_) => 4,
            Field::U8(_) => 1,
            Field::F64(_) => 8,
            Field::Str(s) => 2 + s.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    code: char,
    max_len: Option<usize>,
}

fn parse_format(format: &str) -> Result<Vec<Slot>> {
    let mut slots = Vec::with_capacity(format.len());
    let mut pending: Option<usize> = None;

    for ch in format.chars() {
        if let Some(digit) = ch.to_digit(10) {
            let current = pending.unwrap_or(0);
            pending = Some(
                current
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit as usize))
                    .ok_or_else(|| FrameError::Format("string bound overflows".into()))?,
            );
            continue;
        }
        match ch {
            'h' | 'l' | 'c' | 'f' | 'd' | 's' => {}
            other => return Err(FrameError::Format(format!("unknown code '{other}'"))),
        }
        if pending.is_some() && ch != 's' {
            return Err(FrameError::Format(format!(
                "length bound only applies to 's', found before '{ch}'"
            )));
        }
        slots.push(Slot {
            code: ch,
            max_len: pending.take().filter(|&max| max > 0),
        });
    }

    if pending.is_some() {
        return Err(FrameError::Format("dangling length bound".into()));
    }
    Ok(slots)
}

/// Pack `fields` according to `format`.
pub fn pack(format: &str, fields: &[Field]) -> Result<BytesMut> {
    let slots = parse_format(format)?;
    if slots.len() != fields.len() {
        return Err(FrameError::Format(format!(
            "format '{format}' expects {} fields, got {}",
            slots.len(),
            fields.len()
        )));
    }

    for (index, (slot, field)) in slots.iter().zip(fields).enumerate() {
        if slot.code != field.code() {
            return Err(FrameError::Format(format!(
                "field {index}: format code '{}' does not match {:?}",
                slot.code, field
            )));
        }
        if let Field::Str(s) = field {
            if s.len() > u16::MAX as usize {
                return Err(FrameError::Format(format!(
                    "field {index}: string of {} bytes exceeds the u16 length prefix",
                    s.len()
                )));
            }
        }
    }

    let size = fields.iter().map(Field::wire_size).sum();
    let mut buf = BytesMut::zeroed(size);
    let mut offset = 0usize;

    for field in fields {
        match field {
            Field::I16(v) => put_u16(&mut buf, offset, *v as u16),
            Field::I32(v) => put_u32(&mut buf, offset, *v as u32),
            Field::U8(v) => buf[offset] = *v,
            Field::F32(v) => put_u32(&mut buf, offset, pack_f32(*v)?),
            Field::F64(v) => put_u64(&mut buf, offset, pack_f64(*v)?),
            Field::Str(s) => {
                put_u16(&mut buf, offset, s.len() as u16);
                buf[offset + 2..offset + 2 + s.len()].copy_from_slice(s.as_bytes());
            }
        }
        offset += field.wire_size();
    }

    Ok(buf)
}

/// Unpack `buf` according to `format`.
///
/// Trailing bytes beyond the format are ignored.
pub fn unpack(format: &str, buf: &[u8]) -> Result<Vec<Field>> {
    let slots = parse_format(format)?;
    let mut fields = Vec::with_capacity(slots.len());
    let mut offset = 0usize;

    for slot in slots {
        let field = match slot.code {
            'h' => {
                need(buf, offset, 2)?;
                Field::I16(get_u16(buf, offset) as i16)
            }
            'l' => {
                need(buf, offset, 4)?;
                Field::I32(get_u32(buf, offset) as i32)
            }
            'c' => {
                need(buf, offset, 1)?;
                Field::U8(buf[offset])
            }
            'f' => {
                need(buf, offset, 4)?;
                Field::F32(unpack_f32(get_u32(buf, offset)))
            }
            'd' => {
                need(buf, offset, 8)?;
                Field::F64(unpack_f64(get_u64(buf, offset)))
            }
            's' => {
                need(buf, offset, 2)?;
                let len = get_u16(buf, offset) as usize;
                need(buf, offset + 2, len)?;
                let keep = match slot.max_len {
                    Some(max) if len > max => max - 1,
                    _ => len,
                };
                let start = offset + 2;
                let text = String::from_utf8_lossy(&buf[start..start + keep]).into_owned();
                offset += 2 + len;
                fields.push(Field::Str(text));
                continue;
            }
            other => return Err(FrameError::Format(format!("unknown code '{other}'"))),
        };
        offset += field.wire_size();
        fields.push(field);
    }

    Ok(fields)
}

fn need(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    if buf.len() < offset + needed {
        return Err(FrameError::Truncated {
            offset,
            needed,
            len: buf.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_mixed_record() {
        let buf = pack(
            "hlcs",
            &[
                Field::I16(-2),
                Field::I32(0x0102_0304),
                Field::U8(0xAB),
                Field::Str("fix".into()),
            ],
        )
        .unwrap();

        assert_eq!(
            buf.as_ref(),
            &[0xFF, 0xFE, 1, 2, 3, 4, 0xAB, 0, 3, b'f', b'i', b'x']
        );
    }

    #[test]
    fn unpacks_what_it_packs() {
        let fields = vec![
            Field::F64(37.7749),
            Field::F32(15.2),
            Field::Str("north".into()),
            Field::I16(i16::MIN),
            Field::I32(-7),
        ];
        let buf = pack("dfshl", &fields).unwrap();
        assert_eq!(unpack("dfshl", &buf).unwrap(), fields);
    }

    #[test]
    fn string_bound_truncates_on_unpack() {
        let buf = pack("sc", &[Field::Str("abcdefgh".into()), Field::U8(9)]).unwrap();
        let fields = unpack("5sc", &buf).unwrap();
        // Four bytes kept, remaining string bytes skipped, next field intact.
        assert_eq!(fields, vec![Field::Str("abcd".into()), Field::U8(9)]);
    }

    #[test]
    fn string_within_bound_is_kept() {
        let buf = pack("s", &[Field::Str("abc".into())]).unwrap();
        assert_eq!(
            unpack("10s", &buf).unwrap(),
            vec![Field::Str("abc".into())]
        );
    }

    #[test]
    fn field_count_mismatch_is_format_error() {
        let err = pack("hh", &[Field::I16(1)]).unwrap_err();
        assert!(matches!(err, FrameError::Format(_)));
    }

    #[test]
    fn field_type_mismatch_is_format_error() {
        let err = pack("f", &[Field::F64(1.0)]).unwrap_err();
        assert!(matches!(err, FrameError::Format(_)));
    }

    #[test]
    fn unknown_code_is_format_error() {
        assert!(matches!(unpack("x", &[0]), Err(FrameError::Format(_))));
        assert!(matches!(unpack("4h", &[0, 0]), Err(FrameError::Format(_))));
        assert!(matches!(unpack("h4", &[0, 0]), Err(FrameError::Format(_))));
    }

    #[test]
    fn short_buffer_is_truncated() {
        let err = unpack("l", &[0, 1]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                offset: 0,
                needed: 4,
                len: 2
            }
        ));

        // String length prefix claims more bytes than present.
        let err = unpack("s", &[0, 9, b'a']).unwrap_err();
        assert!(matches!(err, FrameError::Truncated { .. }));
    }

    #[test]
    fn non_finite_float_is_rejected() {
        let err = pack("f", &[Field::F32(f32::NAN)]).unwrap_err();
        assert!(matches!(err, FrameError::NonFinite { .. }));
    }
}
