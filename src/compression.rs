//! Decompression support.

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use std::io::Read;

use crate::error::ReductionError;
use crate::store::Location;

/// Compression algorithm of an input object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Compression {
    Gzip,
}

impl Compression {
    /// Infer the compression of an object from its name.
    pub fn from_location(location: &Location) -> Option<Self> {
        if location.name().ends_with(".gz") {
            Some(Compression::Gzip)
        } else {
            None
        }
    }
}

/// Decompresses some Bytes and returns the uncompressed data.
///
/// # Arguments
///
/// * `compression`: Compression algorithm
/// * `data`: Compressed data
pub fn decompress(compression: Compression, data: &Bytes) -> Result<Bytes, ReductionError> {
    match compression {
        Compression::Gzip => decompress_flate2_gzip(data),
    }
}

fn decompress_flate2_gzip(data: &Bytes) -> Result<Bytes, ReductionError> {
    // Concatenated gzip members are decoded as one stream.
    let mut decoder = MultiGzDecoder::<&[u8]>::new(data);
    let mut buf = Vec::with_capacity(data.len());
    decoder
        .read_to_end(&mut buf)
        .map_err(ReductionError::Decompression)?;
    Ok(buf.into())
}
