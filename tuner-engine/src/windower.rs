//! Circular sample buffer that cuts a continuous PCM stream into
//! overlapping analysis windows.

/// Hops never get shorter than this, whatever the window size.
pub const MIN_HOP_SIZE: usize = 256;

/// `max(256, window_size / 4)`
pub fn hop_size_for(window_size: usize) -> usize {
    (window_size / 4).max(MIN_HOP_SIZE)
}

/// Ring buffer holding the newest `window_size` samples.
///
/// `pending` counts samples that arrived since the last extracted window. It
/// never exceeds the capacity: samples overwritten before being analysed are
/// dropped, not queued.
pub struct Windower {
    ring: Box<[f32]>,
    write_index: usize,
    filled: usize,
    pending: usize,
    hop_size: usize,
}

impl Windower {
    /// Creates an empty ring.
    ///
    /// # Arguments
    /// * `window_size` - Ring capacity and length of every extracted window
    /// * `hop_size` - New samples needed between two windows
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        Windower {
            ring: vec![0.0; window_size].into_boxed_slice(),
            write_index: 0,
            filled: 0,
            pending: 0,
            hop_size,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_index = 0;
        self.filled = 0;
        self.pending = 0;
    }

    /// Appends a chunk of any length, overwriting the oldest samples.
    pub fn ingest(&mut self, samples: &[f32]) {
        let capacity = self.capacity();
        if capacity == 0 {
            return;
        }
        // Only the tail of an oversized chunk can survive.
        let skip = samples.len().saturating_sub(capacity);
        for &sample in &samples[skip..] {
            self.ring[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % capacity;
        }
        self.filled = (self.filled + samples.len()).min(capacity);
        self.pending = (self.pending + samples.len()).min(capacity);
    }

    /// Copies the newest window into `out` in chronological order if a full
    /// window is available and at least one hop has accumulated.
    ///
    /// Call repeatedly until it returns `false`; a caller that fell behind gets
    /// several windows from one `ingest`.
    pub fn try_extract(&mut self, out: &mut [f32]) -> bool {
        let capacity = self.capacity();
        if capacity == 0 || self.filled < capacity || self.pending < self.hop_size {
            return false;
        }
        debug_assert_eq!(out.len(), capacity);
        // The oldest sample sits at the write index once the ring is full.
        let (newer, older) = self.ring.split_at(self.write_index);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
        self.pending -= self.hop_size;
        true
    }
}
