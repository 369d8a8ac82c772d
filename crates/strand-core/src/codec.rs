//! Length-prefixed binary value codec
//!
//! Marshals [`Value`] lists into a compact byte form for handoff between
//! execution contexts (e.g. across a pipe). Every value starts with a
//! one-byte type tag. Numbers are f64 little-endian, strings carry a u32
//! little-endian byte length, and tables are framed by two reserved entry
//! counts (array-like and keyed, patched in once the pairs are written)
//! and closed with an end marker.
//!
//! Decoding is strict: truncated input, an unrecognized tag, or a
//! key/value pair cut off by a premature end marker all report an illegal
//! sequence; the decoder never reads past the input.

use crate::value::{Table, Value};

const TAG_END: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_NUMBER: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_TABLE: u8 = 4;

/// Errors from encoding or decoding values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Malformed input at the given byte offset
    #[error("illegal byte sequence at offset {0}")]
    IllegalSequence(usize),

    /// A string or table too large for the wire format's u32 fields
    #[error("value too large to encode ({0})")]
    TooLarge(usize),
}

/// Encode a sequence of values into one byte buffer
pub fn encode(values: &[Value]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for value in values {
        encode_value(&mut out, value)?;
    }
    Ok(out)
}

fn encode_value(out: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
        Value::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&n.to_le_bytes());
        }
        Value::Str(s) => {
            let len = u32::try_from(s.len()).map_err(|_| CodecError::TooLarge(s.len()))?;
            out.push(TAG_STRING);
            out.extend_from_slice(&len.to_le_bytes());
            out.extend_from_slice(s.as_bytes());
        }
        Value::Table(t) => encode_table(out, t)?,
    }
    Ok(())
}

fn encode_table(out: &mut Vec<u8>, table: &Table) -> Result<(), CodecError> {
    out.push(TAG_TABLE);

    // reserve the two entry counts; they are patched in below once the
    // pairs are written
    let counts_at = out.len();
    out.extend_from_slice(&[0u8; 8]);

    let mut narr: u32 = 0;
    let mut nrec: u32 = 0;
    for (key, value) in table.iter() {
        encode_value(out, key)?;
        encode_value(out, value)?;
        if key.is_integer() {
            narr = narr.checked_add(1).ok_or(CodecError::TooLarge(table.len()))?;
        } else {
            nrec = nrec.checked_add(1).ok_or(CodecError::TooLarge(table.len()))?;
        }
    }

    out[counts_at..counts_at + 4].copy_from_slice(&narr.to_le_bytes());
    out[counts_at + 4..counts_at + 8].copy_from_slice(&nrec.to_le_bytes());
    out.push(TAG_END);
    Ok(())
}

/// Decode every value in `data`
///
/// Returns the decoded values in order; the input must be fully
/// consumed.
pub fn decode(data: &[u8]) -> Result<Vec<Value>, CodecError> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (value, next) = decode_value(data, pos)?;
        values.push(value);
        pos = next;
    }
    Ok(values)
}

fn take<'a>(data: &'a [u8], pos: usize, n: usize) -> Result<&'a [u8], CodecError> {
    pos.checked_add(n)
        .and_then(|end| data.get(pos..end))
        .ok_or(CodecError::IllegalSequence(pos))
}

fn take_u32(data: &[u8], pos: usize) -> Result<u32, CodecError> {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(take(data, pos, 4)?);
    Ok(u32::from_le_bytes(raw))
}

fn decode_value(data: &[u8], pos: usize) -> Result<(Value, usize), CodecError> {
    let tag = *data.get(pos).ok_or(CodecError::IllegalSequence(pos))?;
    let pos = pos + 1;

    match tag {
        TAG_BOOL => {
            let byte = take(data, pos, 1)?[0];
            Ok((Value::Bool(byte != 0), pos + 1))
        }
        TAG_NUMBER => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(take(data, pos, 8)?);
            Ok((Value::Number(f64::from_le_bytes(raw)), pos + 8))
        }
        TAG_STRING => {
            let len = take_u32(data, pos)? as usize;
            let pos = pos + 4;
            let bytes = take(data, pos, len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| CodecError::IllegalSequence(pos))?;
            Ok((Value::Str(s.to_string()), pos + len))
        }
        TAG_TABLE => decode_table(data, pos),
        _ => Err(CodecError::IllegalSequence(pos - 1)),
    }
}

fn decode_table(data: &[u8], pos: usize) -> Result<(Value, usize), CodecError> {
    let narr = take_u32(data, pos)? as usize;
    let nrec = take_u32(data, pos + 4)? as usize;
    let mut pos = pos + 8;

    // the counts are wire data: cap the preallocation by what the
    // remaining input could actually hold
    let hint = narr.saturating_add(nrec).min(data.len() - pos);
    let mut table = Table::with_capacity(hint, 0);
    loop {
        match data.get(pos) {
            None => return Err(CodecError::IllegalSequence(pos)),
            Some(&TAG_END) => return Ok((Value::Table(table), pos + 1)),
            Some(_) => {}
        }

        let (key, next) = decode_value(data, pos)?;
        pos = next;

        // a terminator here splits the pair: the key has no value
        match data.get(pos) {
            None | Some(&TAG_END) => return Err(CodecError::IllegalSequence(pos)),
            Some(_) => {}
        }
        let (value, next) = decode_value(data, pos)?;
        pos = next;
        table.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        let mut inner = Table::new();
        inner.insert(1, true);
        inner.insert("deep", 2.5);

        let mut t = Table::new();
        t.insert(1, "first");
        t.insert(2, "second");
        t.insert("name", "strand");
        t.insert("nested", inner);
        t
    }

    #[test]
    fn test_round_trip_scalars() {
        let values = vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::Number(-12.75),
            Value::Str("hello".to_string()),
            Value::Str(String::new()),
        ];

        let bytes = encode(&values).unwrap();
        assert_eq!(decode(&bytes).unwrap(), values);
    }

    #[test]
    fn test_round_trip_nested_table() {
        let values = vec![Value::Table(sample_table()), Value::Number(9.0)];

        let bytes = encode(&values).unwrap();
        assert_eq!(decode(&bytes).unwrap(), values);
    }

    #[test]
    fn test_table_counts_patched_in() {
        let bytes = encode(&[Value::Table(sample_table())]).unwrap();

        // tag, then narr=2 and nrec=2 little-endian
        assert_eq!(bytes[0], TAG_TABLE);
        assert_eq!(u32::from_le_bytes(bytes[1..5].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(bytes[5..9].try_into().unwrap()), 2);
        assert_eq!(*bytes.last().unwrap(), TAG_END);
    }

    #[test]
    fn test_empty_input_decodes_empty() {
        assert_eq!(decode(&[]).unwrap(), Vec::<Value>::new());
    }

    #[test]
    fn test_truncated_input_is_illegal() {
        let bytes = encode(&[Value::Table(sample_table())]).unwrap();

        // every proper prefix must fail cleanly, never read out of bounds
        for cut in 0..bytes.len() {
            if cut == 0 {
                continue;
            }
            assert!(
                matches!(decode(&bytes[..cut]), Err(CodecError::IllegalSequence(_))),
                "prefix of {} bytes decoded",
                cut
            );
        }
    }

    #[test]
    fn test_unknown_tag_is_illegal() {
        assert_eq!(decode(&[0xff]), Err(CodecError::IllegalSequence(0)));
        // a bare end marker is not a value either
        assert_eq!(decode(&[TAG_END]), Err(CodecError::IllegalSequence(0)));
    }

    #[test]
    fn test_pair_split_by_terminator_is_illegal() {
        // table with a key immediately followed by the end marker
        let mut bytes = vec![TAG_TABLE];
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.push(TAG_BOOL);
        bytes.push(1);
        bytes.push(TAG_END);

        assert!(matches!(
            decode(&bytes),
            Err(CodecError::IllegalSequence(_))
        ));
    }

    #[test]
    fn test_string_length_is_checked() {
        // claims 100 bytes but carries 2
        let mut bytes = vec![TAG_STRING];
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(b"ab");

        assert!(matches!(
            decode(&bytes),
            Err(CodecError::IllegalSequence(_))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_illegal() {
        let mut bytes = vec![TAG_STRING];
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe]);

        assert!(matches!(
            decode(&bytes),
            Err(CodecError::IllegalSequence(_))
        ));
    }
}
