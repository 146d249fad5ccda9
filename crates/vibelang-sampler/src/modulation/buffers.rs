//! Pre-sized scratch buffers for per-sample modulation spans.

/// A pool of equally sized `f32` buffers.
///
/// Buffers are moved out with [`take`](Self::take) and handed back with
/// [`give`](Self::give); neither allocates once the pool is sized.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<Vec<f32>>,
    block_size: usize,
    capacity: usize,
}

impl BufferPool {
    pub fn new(count: usize, block_size: usize) -> Self {
        Self {
            buffers: (0..count).map(|_| vec![0.0; block_size]).collect(),
            block_size,
            capacity: count,
        }
    }

    /// Resize every pooled buffer. Must not be called while buffers are out.
    pub fn set_block_size(&mut self, block_size: usize) {
        self.block_size = block_size;
        for buffer in &mut self.buffers {
            buffer.resize(block_size, 0.0);
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Borrow a buffer, zeroed over its first `len` frames.
    pub fn take(&mut self, len: usize) -> Option<Vec<f32>> {
        if len > self.block_size {
            log::trace!("span of {} frames exceeds block size {}", len, self.block_size);
            return None;
        }
        let mut buffer = self.buffers.pop()?;
        buffer[..len].fill(0.0);
        Some(buffer)
    }

    /// Hand a buffer back. Buffers beyond the pool's capacity are dropped.
    pub fn give(&mut self, buffer: Vec<f32>) {
        if self.buffers.len() < self.capacity && buffer.len() == self.block_size {
            self.buffers.push(buffer);
        }
    }

    pub fn available(&self) -> usize {
        self.buffers.len()
    }
}
