//! Dual-counter frame differencing.
//!
//! In dual counter mode the detector emits two raw frames per exposure,
//! one per counter. The published image is the pixelwise difference of
//! the second frame against the first, floored at zero. Subtraction
//! saturates per pixel lane, so a second counter reading below the first
//! yields zero rather than wrapping.

use xspd_core::{PixelDepth, XspdError};

/// Pairs consecutive raw frames and produces their difference.
pub struct DualCounterDiff {
    depth: PixelDepth,
    frame_bytes: usize,
    pending: Option<Vec<u8>>,
}

impl DualCounterDiff {
    pub fn new(depth: PixelDepth, frame_bytes: usize) -> Self {
        Self {
            depth,
            frame_bytes,
            pending: None,
        }
    }

    /// Drop a half-collected pair, e.g. when acquisition restarts.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Feed one raw frame.
    ///
    /// The first frame of a pair is held; the second completes the pair
    /// and returns `second - first` saturated at zero. Frames whose size
    /// disagrees with the configured geometry are rejected and the pair
    /// state is cleared, so one bad frame cannot poison the next pair.
    pub fn push(&mut self, frame: Vec<u8>) -> Result<Option<Vec<u8>>, XspdError> {
        if frame.len() != self.frame_bytes {
            self.pending = None;
            return Err(XspdError::UnsupportedType(format!(
                "frame of {} bytes does not match configured {} bytes",
                frame.len(),
                self.frame_bytes
            )));
        }

        match self.pending.take() {
            None => {
                self.pending = Some(frame);
                Ok(None)
            }
            Some(first) => Ok(Some(subtract(&frame, &first, self.depth)?)),
        }
    }
}

/// Pixelwise `current - previous`, saturated at zero.
pub fn subtract(current: &[u8], previous: &[u8], depth: PixelDepth) -> Result<Vec<u8>, XspdError> {
    if current.len() != previous.len() {
        return Err(XspdError::UnsupportedType(format!(
            "counter frames differ in size: {} vs {} bytes",
            current.len(),
            previous.len()
        )));
    }
    let bpp = depth.bytes_per_pixel();
    if current.len() % bpp != 0 {
        return Err(XspdError::UnsupportedType(format!(
            "{} bytes is not a whole number of {bpp}-byte pixels",
            current.len()
        )));
    }

    let mut out = Vec::with_capacity(current.len());
    match depth {
        PixelDepth::U8 => {
            for (c, p) in current.iter().zip(previous) {
                out.push(c.saturating_sub(*p));
            }
        }
        PixelDepth::U16 => {
            for (c, p) in current.chunks_exact(2).zip(previous.chunks_exact(2)) {
                let c = u16::from_le_bytes([c[0], c[1]]);
                let p = u16::from_le_bytes([p[0], p[1]]);
                out.extend_from_slice(&c.saturating_sub(p).to_le_bytes());
            }
        }
        PixelDepth::U32 => {
            for (c, p) in current.chunks_exact(4).zip(previous.chunks_exact(4)) {
                let c = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                let p = u32::from_le_bytes([p[0], p[1], p[2], p[3]]);
                out.extend_from_slice(&c.saturating_sub(p).to_le_bytes());
            }
        }
    }
    Ok(out)
}
