// Fixed-capacity frame ring with overwrite-on-full semantics
//
// The ring holds the most recent `capacity` frames in insertion order.
// Appending at capacity evicts exactly the oldest frame; a snapshot is an
// ordered copy and never drains, so capture keeps filling the window while
// and after a flush runs. Callers serialize `append` and `snapshot` with a
// mutex (see CaptureService).

use std::collections::VecDeque;

use super::frame::Frame;
use super::{CaptureError, Result};

/// Ring buffer over captured frames.
pub struct FrameRing {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl FrameRing {
    /// Create a ring holding at most `capacity` frames.
    ///
    /// Zero capacity is a configuration error, not an empty ring.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CaptureError::InvalidCapacity);
        }
        Ok(Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Ring sized for `fps` frames per second over a `secs` window.
    pub fn for_window(fps: f64, secs: f64) -> Result<Self> {
        Self::new((fps * secs).round() as usize)
    }

    /// Append a frame, evicting the single oldest one when full.
    ///
    /// Never fails once the ring is constructed; total size is unchanged
    /// when the ring is already at capacity.
    pub fn append(&mut self, frame: Frame) {
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Ordered copy of the current contents, oldest first.
    ///
    /// Does not clear the ring. An empty ring yields an empty vec; callers
    /// treat that as "nothing to persist".
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fraction of the window currently filled, 0.0 to 1.0.
    pub fn fill_ratio(&self) -> f64 {
        self.frames.len() as f64 / self.capacity as f64
    }

    /// Discard all buffered frames.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame {
            seq,
            width: 4,
            height: 4,
            data: vec![(seq % 256) as u8; Frame::expected_len(4, 4)],
            captured_at: Instant::now(),
        }
    }

    fn seqs(frames: &[Frame]) -> Vec<u64> {
        frames.iter().map(|f| f.seq).collect()
    }

    #[test]
    fn zero_capacity_rejected() {
        assert!(matches!(
            FrameRing::new(0),
            Err(CaptureError::InvalidCapacity)
        ));
        assert!(matches!(
            FrameRing::for_window(30.0, 0.0),
            Err(CaptureError::InvalidCapacity)
        ));
    }

    #[test]
    fn window_sizing_rounds() {
        let ring = FrameRing::for_window(30.0, 15.0).unwrap();
        assert_eq!(ring.capacity(), 450);
        let ring = FrameRing::for_window(29.97, 10.0).unwrap();
        assert_eq!(ring.capacity(), 300);
    }

    #[test]
    fn len_is_min_of_appends_and_capacity() {
        for n in [0u64, 3, 10, 17] {
            let mut ring = FrameRing::new(10).unwrap();
            for seq in 1..=n {
                ring.append(frame(seq));
            }
            assert_eq!(ring.len(), (n as usize).min(10));

            let expect: Vec<u64> = (1..=n).collect::<Vec<u64>>().into_iter().rev().take(10).rev().collect();
            assert_eq!(seqs(&ring.snapshot()), expect);
        }
    }

    #[test]
    fn append_at_capacity_evicts_only_the_oldest() {
        // fps=30, duration=15s from the capture defaults
        let mut ring = FrameRing::new(450).unwrap();
        for seq in 1..=450 {
            ring.append(frame(seq));
        }
        assert_eq!(ring.len(), 450);

        ring.append(frame(451));
        assert_eq!(ring.len(), 450);

        let snap = ring.snapshot();
        assert_eq!(snap[0].seq, 2, "frame 1 must be evicted");
        assert_eq!(snap.last().unwrap().seq, 451);
    }

    #[test]
    fn snapshot_on_empty_is_empty_not_error() {
        let ring = FrameRing::new(5).unwrap();
        assert!(ring.snapshot().is_empty());
        assert!(ring.is_empty());
    }

    #[test]
    fn snapshot_does_not_drain() {
        let mut ring = FrameRing::new(5).unwrap();
        for seq in 1..=3 {
            ring.append(frame(seq));
        }
        let first = ring.snapshot();
        assert_eq!(seqs(&first), vec![1, 2, 3]);
        assert_eq!(ring.len(), 3);

        ring.append(frame(4));
        assert_eq!(seqs(&ring.snapshot()), vec![1, 2, 3, 4]);
    }

    #[test]
    fn clear_and_fill_ratio() {
        let mut ring = FrameRing::new(4).unwrap();
        assert_eq!(ring.fill_ratio(), 0.0);
        ring.append(frame(1));
        ring.append(frame(2));
        assert!((ring.fill_ratio() - 0.5).abs() < f64::EPSILON);
        ring.clear();
        assert!(ring.is_empty());
        assert_eq!(ring.capacity(), 4);
    }
}
