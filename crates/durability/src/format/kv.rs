//! Key/value extension lists.
//!
//! ```text
//! repeat { keylen+1: u32, key bytes, NUL, vallen: u32, value bytes }
//! 0: u32
//! ```
//!
//! The zero sentinel is always written, so an empty list is 4 bytes.

use super::cursor::{SliceReader, SliceWriter};
use crate::codec::CodecError;
use fsjournal_core::Dict;

/// Encoded size of `dict`, including the terminator.
pub fn measure(dict: &Dict) -> usize {
    dict.iter()
        .map(|(key, value)| 4 + key.len() + 1 + 4 + value.len())
        .sum::<usize>()
        + 4
}

/// Key that cannot be stored (contains NUL), if any.
pub fn invalid_key(dict: &Dict) -> Option<&str> {
    dict.iter().map(|(k, _)| k).find(|k| k.as_bytes().contains(&0))
}

fn len_u32(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge { len })
}

/// Write `dict` followed by the terminator.
pub fn write(w: &mut SliceWriter<'_>, dict: &Dict) -> Result<(), CodecError> {
    for (key, value) in dict.iter() {
        w.put_u32(len_u32(key.len() + 1)?)?;
        w.put_cstr(key)?;
        w.put_u32(len_u32(value.len())?)?;
        w.put_bytes(value)?;
    }
    w.put_u32(0)
}

/// Read entries up to and including the terminator.
pub fn read(r: &mut SliceReader<'_>) -> Result<Dict, CodecError> {
    let mut dict = Dict::new();
    loop {
        let key_len = r.get_u32()? as usize;
        if key_len == 0 {
            return Ok(dict);
        }
        let offset = r.position();
        let key = r.take(key_len)?;
        let (&nul, key) = key.split_last().unwrap_or((&1, key));
        if nul != 0 || key.contains(&0) {
            return Err(CodecError::Format(format!(
                "key at offset {} is not NUL-terminated",
                offset
            )));
        }
        let key = std::str::from_utf8(key)
            .map_err(|e| CodecError::Format(format!("invalid UTF-8 in key: {}", e)))?;
        let value_len = r.get_u32()? as usize;
        let value = r.take(value_len)?;
        dict.set(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(dict: &Dict) -> Vec<u8> {
        let mut buf = vec![0u8; measure(dict)];
        let mut w = SliceWriter::new(&mut buf);
        write(&mut w, dict).unwrap();
        assert_eq!(w.position(), buf.len());
        buf
    }

    #[test]
    fn test_empty_list_is_sentinel_only() {
        let buf = encode(&Dict::new());
        assert_eq!(buf, 0u32.to_ne_bytes());
        let back = read(&mut SliceReader::new(&buf)).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn test_single_entry_layout() {
        let dict = Dict::new().with("user.x", "v");
        assert_eq!(measure(&dict), 4 + 7 + 4 + 1 + 4);

        let buf = encode(&dict);
        assert_eq!(&buf[..4], &7u32.to_ne_bytes());
        assert_eq!(&buf[4..11], b"user.x\0");
        assert_eq!(&buf[11..15], &1u32.to_ne_bytes());
        assert_eq!(&buf[15..16], b"v");
        assert_eq!(&buf[16..], &0u32.to_ne_bytes());
    }

    #[test]
    fn test_read_stops_at_sentinel() {
        let dict = Dict::new().with("a", "1").with("b", vec![0u8, 1, 2]);
        let mut buf = encode(&dict);
        let consumed = buf.len();
        buf.extend_from_slice(b"trailing");

        let mut r = SliceReader::new(&buf);
        let back = read(&mut r).unwrap();
        assert_eq!(back, dict);
        assert_eq!(r.position(), consumed);
    }

    #[test]
    fn test_read_missing_sentinel() {
        let dict = Dict::new().with("a", "1");
        let buf = encode(&dict);
        let mut r = SliceReader::new(&buf[..buf.len() - 4]);
        assert!(matches!(read(&mut r), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn test_invalid_key_detected() {
        let dict = Dict::new().with("ok", "1").with("bad\0key", "2");
        assert_eq!(invalid_key(&dict), Some("bad\0key"));
        assert_eq!(invalid_key(&Dict::new().with("ok", "1")), None);
    }
}
