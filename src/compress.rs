//! Optional per-member payload compression.
//!
//! A compressed payload is framed so it can be recognized when the
//! archive is read back: the 8 marker bytes `!<zlib>\n`, a big-endian u32
//! inflated length, then a zlib stream of the original bytes. Standard ar
//! tools still list such archives; only the payload interpretation
//! differs.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

pub(crate) const COMPRESSED_MAGIC: &[u8; 8] = b"!<zlib>\n";

const FRAME_HEADER: usize = COMPRESSED_MAGIC.len() + 4;

pub(crate) fn is_frame(stored: &[u8]) -> bool {
    stored.starts_with(COMPRESSED_MAGIC)
}

/// Inflated length recorded in the frame header.
pub(crate) fn frame_inflated_len(stored: &[u8]) -> Result<u64> {
    if stored.len() < FRAME_HEADER {
        return Err(Error::format("compressed member frame is truncated"));
    }
    let len = u32::from_be_bytes(stored[8..12].try_into().expect("sliced 4 bytes"));
    Ok(u64::from(len))
}

pub(crate) fn deflate_frame(logical: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(logical.len())
        .map_err(|_| Error::format("member too large for the compressed frame"))?;

    let mut frame = Vec::with_capacity(FRAME_HEADER + logical.len() / 2);
    frame.extend_from_slice(COMPRESSED_MAGIC);
    frame.extend_from_slice(&len.to_be_bytes());

    let mut encoder = ZlibEncoder::new(frame, Compression::default());
    encoder.write_all(logical)?;
    Ok(encoder.finish()?)
}

pub(crate) fn inflate_frame(stored: &[u8]) -> Result<Vec<u8>> {
    let expected = frame_inflated_len(stored)?;
    let mut logical = Vec::with_capacity(expected as usize);
    ZlibDecoder::new(&stored[FRAME_HEADER..]).read_to_end(&mut logical)?;
    if logical.len() as u64 != expected {
        return Err(Error::format(format!(
            "compressed member inflated to {} bytes, frame promised {expected}",
            logical.len()
        )));
    }
    Ok(logical)
}

/// Inflates just enough of a frame to sniff content flags.
pub(crate) fn inflate_frame_head(stored: &[u8], max: usize) -> Result<Vec<u8>> {
    let expected = frame_inflated_len(stored)?.min(max as u64) as usize;
    let mut head = vec![0u8; expected];
    let mut decoder = ZlibDecoder::new(&stored[FRAME_HEADER..]);
    decoder
        .read_exact(&mut head)
        .map_err(|e| Error::format(format!("corrupt compressed member: {e}")))?;
    Ok(head)
}
