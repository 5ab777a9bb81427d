//! Streaming frame formats.
//!
//! A frame arrives as a 3-part ZeroMQ message: a topic stub, a fixed
//! 8-byte header of four little-endian `u16` fields, and the payload
//! (raw or compressed). This module holds the header parser, the pixel
//! formats the detector can stream, and the decoded frame handed to
//! consumers.

use serde::{Deserialize, Serialize};

use crate::error::XspdError;

/// Fixed-size header carried in part 1 of every frame message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_number: u16,
    pub trigger_number: u16,
    pub status_code: u16,
    pub declared_size: u16,
}

impl FrameHeader {
    /// Wire length of the header in bytes.
    pub const WIRE_LEN: usize = 8;

    /// Parse the header from the raw bytes of message part 1.
    ///
    /// Trailing bytes beyond the four fields are ignored; a short part is
    /// a per-frame protocol violation.
    pub fn parse(bytes: &[u8]) -> Result<Self, XspdError> {
        if bytes.len() < Self::WIRE_LEN {
            return Err(XspdError::Receive(format!(
                "frame header too short: {} bytes, expected {}",
                bytes.len(),
                Self::WIRE_LEN
            )));
        }
        let field = |i: usize| u16::from_le_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        Ok(Self {
            frame_number: field(0),
            trigger_number: field(1),
            status_code: field(2),
            declared_size: field(3),
        })
    }
}

/// Pixel storage format for a streamed frame.
///
/// The detector reports a logical `bit_depth` (1, 6, 12 or 24); transport
/// widens each to the next unsigned integer lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelDepth {
    U8,
    U16,
    U32,
}

impl PixelDepth {
    /// Bytes per pixel for this format.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelDepth::U8 => 1,
            PixelDepth::U16 => 2,
            PixelDepth::U32 => 4,
        }
    }

    /// Map the detector's `bit_depth` variable to a storage format.
    pub fn from_bit_depth(bits: u32) -> Result<Self, XspdError> {
        match bits {
            1 | 6 => Ok(PixelDepth::U8),
            12 => Ok(PixelDepth::U16),
            24 => Ok(PixelDepth::U32),
            other => Err(XspdError::UnsupportedBitDepth(other)),
        }
    }
}

/// A fully decoded (and, in DUAL counter mode, differenced) frame.
///
/// Pixel data is stored as raw little-endian bytes; `depth` says how to
/// interpret them.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub depth: PixelDepth,
    pub frame_number: u16,
    pub trigger_number: u16,
    pub data: Vec<u8>,
}

impl FrameData {
    /// Total payload size expected for the given geometry and format.
    pub fn expected_bytes(width: u32, height: u32, depth: PixelDepth) -> usize {
        width as usize * height as usize * depth.bytes_per_pixel()
    }

    /// Pixel value at (x, y), widened to u32.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y * self.width + x) as usize;
        match self.depth {
            PixelDepth::U8 => self.data.get(idx).map(|&v| v as u32),
            PixelDepth::U16 => {
                let start = idx * 2;
                let bytes = self.data.get(start..start + 2)?;
                Some(u16::from_le_bytes([bytes[0], bytes[1]]) as u32)
            }
            PixelDepth::U32 => {
                let start = idx * 4;
                let bytes = self.data.get(start..start + 4)?;
                Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
        }
    }
}
