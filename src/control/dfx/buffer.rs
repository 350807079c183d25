//! Fixed-depth stream buffer between the memory and configuration machines.

/// Ring buffer of 32-bit words with explicit read/write pointers.
///
/// Pointers alone cannot tell empty from full when they are equal, so the
/// buffer keeps an explicit `full` flag.
#[derive(Debug, Clone)]
pub struct StreamBuffer {
    words: Vec<u32>,
    read_ptr: usize,
    write_ptr: usize,
    full: bool,
}

impl StreamBuffer {
    /// Create a buffer holding `depth` words.
    pub fn new(depth: usize) -> Self {
        Self {
            words: vec![0; depth.max(1)],
            read_ptr: 0,
            write_ptr: 0,
            full: false,
        }
    }

    /// Depth in words.
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    /// Words currently held.
    pub fn len(&self) -> usize {
        if self.full {
            self.capacity()
        } else if self.write_ptr >= self.read_ptr {
            self.write_ptr - self.read_ptr
        } else {
            self.capacity() - self.read_ptr + self.write_ptr
        }
    }

    /// Free slots.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.full && self.read_ptr == self.write_ptr
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Append a word. Returns false (word dropped) when full.
    pub fn push(&mut self, word: u32) -> bool {
        if self.full {
            return false;
        }
        self.words[self.write_ptr] = word;
        self.write_ptr = (self.write_ptr + 1) % self.capacity();
        self.full = self.write_ptr == self.read_ptr;
        true
    }

    /// Remove the oldest word.
    pub fn pop(&mut self) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        let word = self.words[self.read_ptr];
        self.read_ptr = (self.read_ptr + 1) % self.capacity();
        self.full = false;
        Some(word)
    }

    /// Reset pointers and flag; contents are left stale.
    pub fn reset(&mut self) {
        self.read_ptr = 0;
        self.write_ptr = 0;
        self.full = false;
    }
}
