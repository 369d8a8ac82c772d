//! Dense slot allocator
//!
//! A growable bit vector that hands out small integer identifiers: a set
//! bit means the slot is taken. Capacity is always a whole number of
//! 64-bit words, so growing rounds up to the next word rather than
//! fitting exactly. The only operation that allocates is growth, and the
//! only operation treated as a unit is [`SlotSet::allocate_lowest_free`]
//! (probe and claim in one call).

use std::collections::TryReserveError;

/// Bits per storage word
const WORD_BITS: usize = u64::BITS as usize;

/// Errors from slot allocator operations
#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    /// Position addressed beyond the current capacity
    #[error("position {pos} out of range (capacity {capacity})")]
    OutOfRange {
        /// The offending position
        pos: usize,
        /// Capacity at the time of the call
        capacity: usize,
    },

    /// Growing the backing storage failed
    #[error("allocation failed: {0}")]
    AllocationFailed(#[from] TryReserveError),

    /// Every slot below the current capacity is taken
    ///
    /// Carries the capacity (one past the highest addressable slot);
    /// the allocator never grows on its own in response.
    #[error("no free slot below capacity {capacity}")]
    Exhausted {
        /// Capacity at the time of the call
        capacity: usize,
    },
}

/// Growable bitset with allocate-lowest-free semantics
#[derive(Debug, Clone)]
pub struct SlotSet {
    words: Vec<u64>,
}

fn words_for(nbits: usize) -> usize {
    if nbits < WORD_BITS {
        1
    } else {
        nbits / WORD_BITS + usize::from(nbits % WORD_BITS != 0)
    }
}

impl SlotSet {
    /// Create a slot set with capacity for at least `nbits` slots
    ///
    /// Capacity rounds up to a whole word (minimum one word). All slots
    /// start free.
    pub fn new(nbits: usize) -> Result<Self, SlotError> {
        let len = words_for(nbits);
        let mut words = Vec::new();
        words.try_reserve_exact(len)?;
        words.resize(len, 0);
        Ok(Self { words })
    }

    /// Current capacity in slots (always a multiple of the word width)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Read the bit at `pos`
    pub fn get(&self, pos: usize) -> Result<bool, SlotError> {
        if pos >= self.capacity() {
            return Err(SlotError::OutOfRange {
                pos,
                capacity: self.capacity(),
            });
        }
        Ok((self.words[pos / WORD_BITS] >> (pos % WORD_BITS)) & 1 == 1)
    }

    /// Set the bit at `pos`, growing capacity to cover it if needed
    ///
    /// Growth is the only failure mode; setting a bit below the current
    /// capacity cannot fail.
    pub fn set(&mut self, pos: usize) -> Result<(), SlotError> {
        if pos >= self.capacity() {
            self.resize(pos + 1)?;
        }
        self.words[pos / WORD_BITS] |= 1u64 << (pos % WORD_BITS);
        Ok(())
    }

    /// Clear the bit at `pos`
    pub fn unset(&mut self, pos: usize) -> Result<(), SlotError> {
        if pos >= self.capacity() {
            return Err(SlotError::OutOfRange {
                pos,
                capacity: self.capacity(),
            });
        }
        self.words[pos / WORD_BITS] &= !(1u64 << (pos % WORD_BITS));
        Ok(())
    }

    /// Resize to cover at least `nbits` slots
    ///
    /// Growing zero-fills the new words. Shrinking clears every bit at
    /// or beyond `nbits` before truncating, so bits never survive past
    /// the requested capacity.
    pub fn resize(&mut self, nbits: usize) -> Result<(), SlotError> {
        let len = words_for(nbits);
        let old_len = self.words.len();

        if len > old_len {
            self.words.try_reserve_exact(len - old_len)?;
            self.words.resize(len, 0);
        } else {
            // shrink: drop trailing words, then clear any bits at or
            // beyond the requested capacity in the kept last word
            self.words.truncate(len);
            let keep = nbits % WORD_BITS;
            if keep != 0 {
                self.words[len - 1] &= u64::MAX >> (WORD_BITS - keep);
            } else if nbits == 0 {
                self.words[0] = 0;
            }
        }
        Ok(())
    }

    /// Lowest free slot, without claiming it
    ///
    /// Returns `None` when every slot below the capacity is taken.
    pub fn first_free(&self) -> Option<usize> {
        for (i, &word) in self.words.iter().enumerate() {
            if word != u64::MAX {
                return Some(i * WORD_BITS + (!word).trailing_zeros() as usize);
            }
        }
        None
    }

    /// Claim and return the lowest free slot
    ///
    /// The probe and the set are one operation: once this returns, the
    /// returned position reads as taken. Never grows: a full allocator
    /// reports [`SlotError::Exhausted`] with the capacity, and growth
    /// only ever happens through [`SlotSet::set`].
    pub fn allocate_lowest_free(&mut self) -> Result<usize, SlotError> {
        let pos = self.first_free().ok_or(SlotError::Exhausted {
            capacity: self.capacity(),
        })?;
        self.words[pos / WORD_BITS] |= 1u64 << (pos % WORD_BITS);
        Ok(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rounds_to_word() {
        let bs = SlotSet::new(0).unwrap();
        assert_eq!(bs.capacity(), 64);

        let bs = SlotSet::new(65).unwrap();
        assert_eq!(bs.capacity(), 128);

        let bs = SlotSet::new(128).unwrap();
        assert_eq!(bs.capacity(), 128);
    }

    #[test]
    fn test_get_set_unset() {
        let mut bs = SlotSet::new(64).unwrap();

        assert!(!bs.get(5).unwrap());
        bs.set(5).unwrap();
        assert!(bs.get(5).unwrap());
        bs.unset(5).unwrap();
        assert!(!bs.get(5).unwrap());
    }

    #[test]
    fn test_untouched_bits_read_zero() {
        let mut bs = SlotSet::new(128).unwrap();
        bs.set(3).unwrap();
        bs.set(100).unwrap();

        for pos in 0..128 {
            let expect = pos == 3 || pos == 100;
            assert_eq!(bs.get(pos).unwrap(), expect, "bit {}", pos);
        }
    }

    #[test]
    fn test_get_out_of_range() {
        let bs = SlotSet::new(64).unwrap();
        assert!(matches!(
            bs.get(64),
            Err(SlotError::OutOfRange { pos: 64, capacity: 64 })
        ));
    }

    #[test]
    fn test_unset_out_of_range() {
        let mut bs = SlotSet::new(64).unwrap();
        assert!(matches!(bs.unset(200), Err(SlotError::OutOfRange { .. })));
    }

    #[test]
    fn test_set_grows_word_granular() {
        let mut bs = SlotSet::new(64).unwrap();
        bs.set(7).unwrap();

        bs.set(130).unwrap();
        assert_eq!(bs.capacity(), 192);
        assert!(bs.get(130).unwrap());
        // growth preserves existing bits and zero-fills the rest
        assert!(bs.get(7).unwrap());
        assert!(!bs.get(64).unwrap());
        assert!(!bs.get(191).unwrap());
    }

    #[test]
    fn test_shrink_clears_beyond_capacity() {
        let mut bs = SlotSet::new(192).unwrap();
        bs.set(10).unwrap();
        bs.set(70).unwrap();
        bs.set(150).unwrap();

        bs.resize(70).unwrap();
        assert_eq!(bs.capacity(), 128);
        assert!(bs.get(10).unwrap());
        // bit 70 was at the requested boundary and must be gone
        assert!(!bs.get(70).unwrap());
        assert!(matches!(bs.get(150), Err(SlotError::OutOfRange { .. })));

        // growing again exposes only zeroes
        bs.resize(192).unwrap();
        assert!(!bs.get(70).unwrap());
        assert!(!bs.get(150).unwrap());
    }

    #[test]
    fn test_allocate_lowest_free() {
        let mut bs = SlotSet::new(64).unwrap();

        assert_eq!(bs.allocate_lowest_free().unwrap(), 0);
        assert_eq!(bs.allocate_lowest_free().unwrap(), 1);

        bs.unset(0).unwrap();
        assert_eq!(bs.allocate_lowest_free().unwrap(), 0);
        assert_eq!(bs.allocate_lowest_free().unwrap(), 2);
    }

    #[test]
    fn test_allocate_scans_past_full_words() {
        let mut bs = SlotSet::new(128).unwrap();
        for pos in 0..64 {
            bs.set(pos).unwrap();
        }
        bs.set(64).unwrap();

        assert_eq!(bs.allocate_lowest_free().unwrap(), 65);
    }

    #[test]
    fn test_allocate_never_returns_same_slot_twice() {
        let mut bs = SlotSet::new(64).unwrap();
        let a = bs.allocate_lowest_free().unwrap();
        let b = bs.allocate_lowest_free().unwrap();
        assert_ne!(a, b);
        assert!(bs.get(a).unwrap());
        assert!(bs.get(b).unwrap());
    }

    #[test]
    fn test_exhausted_reports_capacity() {
        let mut bs = SlotSet::new(64).unwrap();
        for _ in 0..64 {
            bs.allocate_lowest_free().unwrap();
        }

        assert!(bs.first_free().is_none());
        match bs.allocate_lowest_free() {
            Err(SlotError::Exhausted { capacity }) => assert_eq!(capacity, 64),
            other => panic!("expected Exhausted, got {:?}", other),
        }
        // exhaustion never auto-grows
        assert_eq!(bs.capacity(), 64);
    }

    #[test]
    fn test_first_free_does_not_claim() {
        let bs = SlotSet::new(64).unwrap();
        assert_eq!(bs.first_free(), Some(0));
        assert_eq!(bs.first_free(), Some(0));
    }
}
