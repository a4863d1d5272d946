//! Dense square bit matrix used for ancestor sets.

/// An `n × n` bit matrix stored row-major in 64-bit words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitMatrix {
    size: usize,
    words_per_row: usize,
    words: Vec<u64>,
}

impl BitMatrix {
    pub fn new(size: usize) -> Self {
        let words_per_row = size.div_ceil(64);
        Self {
            size,
            words_per_row,
            words: vec![0; words_per_row * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn locate(&self, row: usize, col: usize) -> (usize, u64) {
        (row * self.words_per_row + col / 64, 1u64 << (col % 64))
    }

    /// Whether bit `(row, col)` is set. Out-of-range positions read as unset.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        if row >= self.size || col >= self.size {
            return false;
        }
        let (word, mask) = self.locate(row, col);
        self.words[word] & mask != 0
    }

    /// Set bit `(row, col)`. Out-of-range positions are ignored.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize) {
        if row >= self.size || col >= self.size {
            return;
        }
        let (word, mask) = self.locate(row, col);
        self.words[word] |= mask;
    }

    /// Overwrite row `to` with the contents of row `from`.
    pub fn copy_row(&mut self, from: usize, to: usize) {
        if from >= self.size || to >= self.size || from == to {
            return;
        }
        let w = self.words_per_row;
        self.words.copy_within(from * w..(from + 1) * w, to * w);
    }

    /// Number of set bits in `row`.
    pub fn row_count(&self, row: usize) -> usize {
        if row >= self.size {
            return 0;
        }
        let w = self.words_per_row;
        self.words[row * w..(row + 1) * w]
            .iter()
            .map(|word| word.count_ones() as usize)
            .sum()
    }
}
