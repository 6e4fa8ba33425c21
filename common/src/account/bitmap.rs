// Occupancy bitmap of a task queue
//
// Bit `i % 8` (least significant first) of byte `i / 8` is set when slot `i` is
// occupied. Bits at or beyond the queue capacity are never handed out.

// Bytes needed to track `capacity` slots
pub fn bitmap_len(capacity: u16) -> usize {
    (capacity as usize + 7) / 8
}

/// Find the lowest free slot below `capacity`.
///
/// Scans byte by byte, skipping full bytes, then bit by bit inside the first
/// byte that still has room. Returns `None` when every slot is taken.
pub fn first_free_slot(bitmap: &[u8], capacity: u16) -> Option<u16> {
    let capacity = capacity as usize;
    for (byte_index, byte) in bitmap.iter().enumerate() {
        if *byte == u8::MAX {
            continue;
        }

        for bit in 0..8 {
            let slot = byte_index * 8 + bit;
            if slot >= capacity {
                return None;
            }

            if byte & (1 << bit) == 0 {
                return Some(slot as u16);
            }
        }
    }

    // a bitmap shorter than the capacity leaves the tail slots free
    let tracked = bitmap.len() * 8;
    if tracked < capacity {
        return Some(tracked as u16);
    }

    None
}

// Number of occupied slots below `capacity`
pub fn occupied_count(bitmap: &[u8], capacity: u16) -> u32 {
    (0..capacity).filter(|slot| is_occupied(bitmap, *slot)).count() as u32
}

pub fn is_occupied(bitmap: &[u8], slot: u16) -> bool {
    let slot = slot as usize;
    bitmap
        .get(slot / 8)
        .map(|byte| byte & (1 << (slot % 8)) != 0)
        .unwrap_or(false)
}

// Mark a slot, growing the bitmap if needed
pub fn set_occupied(bitmap: &mut Vec<u8>, slot: u16) {
    let slot = slot as usize;
    if bitmap.len() <= slot / 8 {
        bitmap.resize(slot / 8 + 1, 0);
    }
    bitmap[slot / 8] |= 1 << (slot % 8);
}

pub fn clear_occupied(bitmap: &mut [u8], slot: u16) {
    let slot = slot as usize;
    if let Some(byte) = bitmap.get_mut(slot / 8) {
        *byte &= !(1 << (slot % 8));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowest_free_slot_wins() {
        assert_eq!(first_free_slot(&[0b0000_0000], 8), Some(0));
        assert_eq!(first_free_slot(&[0b0000_0101], 8), Some(1));
        assert_eq!(first_free_slot(&[0b0111_1111], 8), Some(7));
        assert_eq!(first_free_slot(&[0xFF, 0b1111_1011], 16), Some(10));
    }

    #[test]
    fn test_full_queue_has_no_slot() {
        assert_eq!(first_free_slot(&[0xFF], 8), None);
        assert_eq!(first_free_slot(&[0xFF, 0xFF], 16), None);
    }

    #[test]
    fn test_bits_beyond_capacity_are_ignored() {
        // capacity 10 tracked in 2 bytes, the 6 high bits of byte 1 are padding
        assert_eq!(first_free_slot(&[0xFF, 0b0000_0011], 10), None);
        assert_eq!(first_free_slot(&[0xFF, 0b0000_0001], 10), Some(9));
    }

    #[test]
    fn test_short_bitmap_leaves_tail_free() {
        assert_eq!(first_free_slot(&[0xFF], 18), Some(8));
        assert_eq!(first_free_slot(&[], 4), Some(0));
    }

    #[test]
    fn test_set_and_clear() {
        let mut bitmap = vec![0u8; bitmap_len(18)];
        assert_eq!(bitmap.len(), 3);
        set_occupied(&mut bitmap, 17);
        assert!(is_occupied(&bitmap, 17));
        assert_eq!(occupied_count(&bitmap, 18), 1);
        clear_occupied(&mut bitmap, 17);
        assert!(!is_occupied(&bitmap, 17));

        set_occupied(&mut bitmap, 30);
        assert_eq!(bitmap.len(), 4);
    }
}
