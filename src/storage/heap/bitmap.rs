//! Slot bitmap at the start of every data page. Slot `i` is bit `7 - i % 8`
//! of byte `i / 8`.

#[inline]
fn mask(slot: usize) -> u8 {
    1 << (7 - slot % 8)
}

pub fn is_set(bitmap: &[u8], slot: usize) -> bool {
    bitmap[slot / 8] & mask(slot) != 0
}

pub fn set(bitmap: &mut [u8], slot: usize) {
    bitmap[slot / 8] |= mask(slot);
}

pub fn clear(bitmap: &mut [u8], slot: usize) {
    bitmap[slot / 8] &= !mask(slot);
}

/// Lowest unset slot below `entries`.
pub fn first_free(bitmap: &[u8], entries: usize) -> Option<usize> {
    (0..entries).find(|slot| !is_set(bitmap, *slot))
}

pub fn occupied(bitmap: &[u8], entries: usize) -> impl Iterator<Item = usize> + '_ {
    (0..entries).filter(move |slot| is_set(bitmap, *slot))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_order() -> anyhow::Result<()> {
        let mut bitmap = [0u8; 2];

        set(&mut bitmap, 0);
        set(&mut bitmap, 9);
        assert_eq!(bitmap, [0b1000_0000, 0b0100_0000]);

        assert_eq!(first_free(&bitmap, 16), Some(1));
        assert_eq!(occupied(&bitmap, 16).collect::<Vec<_>>(), vec![0, 9]);

        clear(&mut bitmap, 0);
        assert!(!is_set(&bitmap, 0));
        assert_eq!(first_free(&bitmap, 16), Some(0));

        Ok(())
    }
}
