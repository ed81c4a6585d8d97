//! Growable bit set used for node flags
//!
//! Flag indices are not limited to a machine word; storage grows on demand in
//! 32-bit words.

const WORD_BITS: u32 = 32;

/// Bit set addressed by arbitrary `u32` indices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flags {
    words: Vec<u32>,
}

impl Flags {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `flag`; returns true if it changed
    pub fn set(&mut self, flag: u32) -> bool {
        let (word, mask) = Self::locate(flag);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let changed = self.words[word] & mask == 0;
        self.words[word] |= mask;
        changed
    }

    /// Clear `flag`; returns true if it changed
    pub fn reset(&mut self, flag: u32) -> bool {
        let (word, mask) = Self::locate(flag);
        match self.words.get_mut(word) {
            Some(bits) if *bits & mask != 0 => {
                *bits &= !mask;
                true
            }
            _ => false,
        }
    }

    /// Toggle `flag` and return its new value
    pub fn invert(&mut self, flag: u32) -> bool {
        if self.has(flag) {
            self.reset(flag);
            false
        } else {
            self.set(flag);
            true
        }
    }

    /// Whether `flag` is set
    pub fn has(&self, flag: u32) -> bool {
        let (word, mask) = Self::locate(flag);
        self.words.get(word).is_some_and(|bits| bits & mask != 0)
    }

    /// All set flags in ascending order
    pub fn all(&self) -> Vec<u32> {
        let mut result = Vec::new();
        for (index, bits) in self.words.iter().enumerate() {
            let mut remaining = *bits;
            while remaining != 0 {
                let bit = remaining.trailing_zeros();
                result.push(index as u32 * WORD_BITS + bit);
                remaining &= remaining - 1;
            }
        }
        result
    }

    /// Whether no flag is set
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|bits| *bits == 0)
    }

    /// Clear every flag
    pub fn clear(&mut self) {
        self.words.clear();
    }

    fn locate(flag: u32) -> (usize, u32) {
        ((flag / WORD_BITS) as usize, 1 << (flag % WORD_BITS))
    }
}
