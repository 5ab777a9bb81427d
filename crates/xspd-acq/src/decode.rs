//! Payload decompression.
//!
//! Whatever the codec, the output must be exactly the geometry-derived
//! frame size; anything else is a corrupt frame and the caller drops it.

use std::io::Read;

use xspd_core::{Compressor, XspdError};

/// Decode one frame payload into raw pixel bytes.
///
/// `expected` is `width * height * bytes_per_pixel` for the current
/// settings. A size mismatch in any codec yields
/// [`XspdError::Decompression`].
pub fn decode_frame(
    payload: &[u8],
    compressor: Compressor,
    expected: usize,
) -> Result<Vec<u8>, XspdError> {
    let decoded = match compressor {
        Compressor::None => payload.to_vec(),
        Compressor::Zlib => inflate_zlib(payload, expected)?,
        Compressor::Blosc => decompress_blosc(payload)?,
    };

    if decoded.len() != expected {
        return Err(XspdError::Decompression {
            expected,
            actual: decoded.len(),
            detail: format!("compressor {compressor}"),
        });
    }
    Ok(decoded)
}

fn inflate_zlib(payload: &[u8], expected: usize) -> Result<Vec<u8>, XspdError> {
    let mut out = Vec::with_capacity(expected);
    // Cap the inflate at one byte past the frame size so an oversized or
    // hostile stream is cut off instead of materialized in full; the extra
    // byte keeps the caller's size check able to tell "too big" apart.
    let mut decoder = flate2::read::ZlibDecoder::new(payload).take(expected as u64 + 1);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| XspdError::Decompression {
            expected,
            actual: out.len(),
            detail: format!("zlib: {e}"),
        })?;
    Ok(out)
}

#[cfg(feature = "blosc")]
fn decompress_blosc(payload: &[u8]) -> Result<Vec<u8>, XspdError> {
    // SAFETY: decompress_bytes validates the blosc header before touching
    // the payload; an undersized or corrupt buffer returns Err.
    unsafe {
        blosc::decompress_bytes::<u8>(payload).map_err(|_| XspdError::Decompression {
            expected: 0,
            actual: payload.len(),
            detail: "blosc: header validation or decompression failed".to_string(),
        })
    }
}

#[cfg(not(feature = "blosc"))]
fn decompress_blosc(_payload: &[u8]) -> Result<Vec<u8>, XspdError> {
    Err(XspdError::FeatureNotEnabled("blosc"))
}
