use bytes::{Buf, BufMut};

use super::{Error, Result};

fn ensure_remaining(src: &impl Buf, wanted: usize) -> Result<()> {
    if src.remaining() < wanted {
        return Err(Error::OutOfBytes {
            wanted,
            remaining: src.remaining(),
        });
    }
    Ok(())
}

pub fn get_u8(src: &mut impl Buf) -> Result<u8> {
    ensure_remaining(src, 1)?;
    Ok(src.get_u8())
}

pub fn get_bool(src: &mut impl Buf) -> Result<bool> {
    Ok(get_u8(src)? != 0)
}

pub fn get_i32(src: &mut impl Buf) -> Result<i32> {
    ensure_remaining(src, 4)?;
    Ok(src.get_i32())
}

pub fn get_f32(src: &mut impl Buf) -> Result<f32> {
    ensure_remaining(src, 4)?;
    Ok(src.get_f32())
}

/// Reads exactly `len` bytes.
pub fn get_bytes(src: &mut impl Buf, len: usize) -> Result<Vec<u8>> {
    ensure_remaining(src, len)?;
    let mut out = vec![0; len];
    src.copy_to_slice(&mut out);
    Ok(out)
}

/// Reads a fixed width string field and strips trailing zero padding.
pub fn get_padded_string(src: &mut impl Buf, len: usize) -> Result<String> {
    let mut raw = get_bytes(src, len)?;
    let end = raw.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    raw.truncate(end);
    Ok(String::from_utf8(raw)?)
}

/// Writes `value` and pads it with zeros up to `len` bytes.
pub fn put_padded_string(dst: &mut impl BufMut, value: &str, len: usize) {
    let bytes = value.as_bytes();
    let n = bytes.len().min(len);
    dst.put_slice(&bytes[..n]);
    dst.put_bytes(0, len - n);
}

/// Optional page pointers are stored as `i32` where `-1` means none.
pub fn get_page_pointer(src: &mut impl Buf) -> Result<Option<u32>> {
    let raw = get_i32(src)?;
    Ok(u32::try_from(raw).ok())
}

pub fn put_page_pointer(dst: &mut impl BufMut, pointer: Option<u32>) {
    dst.put_i32(pointer.map_or(-1, |p| p as i32));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_string() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        put_padded_string(&mut buf, "crab", 8);
        assert_eq!(buf.len(), 8);

        let mut src = &buf[..];
        assert_eq!(get_padded_string(&mut src, 8)?, "crab");
        assert!(!src.has_remaining());

        Ok(())
    }

    #[test]
    fn test_short_buffer() -> anyhow::Result<()> {
        let buf = [0u8, 1];
        let mut src = &buf[..];

        assert!(matches!(
            get_i32(&mut src),
            Err(Error::OutOfBytes {
                wanted: 4,
                remaining: 2
            })
        ));

        Ok(())
    }

    #[test]
    fn test_page_pointer() -> anyhow::Result<()> {
        let mut buf = Vec::new();
        put_page_pointer(&mut buf, None);
        put_page_pointer(&mut buf, Some(7));

        let mut src = &buf[..];
        assert_eq!(get_page_pointer(&mut src)?, None);
        assert_eq!(get_page_pointer(&mut src)?, Some(7));

        Ok(())
    }
}
