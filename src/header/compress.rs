//! zlib compression of header blocks.
//!
//! Each direction of a connection carries one continuous zlib stream;
//! every header block is flushed with Z_SYNC_FLUSH so the receiver can
//! decode it without waiting for stream end. Both sides prime their
//! streams with the SPDY/3 preset dictionary.
//!
//! The plaintext block layout is a big-endian pair count followed by
//! length-prefixed name/value strings; multiple values for one name are
//! joined with NUL.

use bytes::{Buf, Bytes};
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use super::Headers;
use super::dictionary::DICTIONARY;

/// Header block codec errors.
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("header block compression failed")]
    Compress(#[from] flate2::CompressError),
    #[error("header block decompression failed")]
    Decompress(#[from] flate2::DecompressError),
    #[error("truncated header block")]
    Truncated,
    #[error("header name or value is not valid UTF-8")]
    InvalidString,
}

/// Compresses header blocks onto one outbound zlib stream.
pub struct Compressor {
    raw: Compress,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor {
    pub fn new() -> Self {
        let mut raw = Compress::new(Compression::default(), true);
        raw.set_dictionary(&DICTIONARY)
            .expect("preset dictionary rejected by fresh deflate stream");
        Self { raw }
    }

    /// Serialise and compress a header map into a wire header block.
    pub fn compress(&mut self, headers: &Headers) -> Result<Bytes, HeaderError> {
        let plain = encode_block(headers);
        let mut out = Vec::with_capacity(plain.len() + 64);
        let base_in = self.raw.total_in();
        loop {
            let consumed = (self.raw.total_in() - base_in) as usize;
            self.raw
                .compress_vec(&plain[consumed..], &mut out, FlushCompress::Sync)?;
            let consumed = (self.raw.total_in() - base_in) as usize;
            // Spare output capacity after a sync flush means the flush
            // completed; a full buffer means deflate wants more room.
            if consumed == plain.len() && out.len() < out.capacity() {
                break;
            }
            out.reserve(out.capacity().max(64));
        }
        Ok(Bytes::from(out))
    }
}

/// Decompresses header blocks from one inbound zlib stream.
pub struct Decompressor {
    raw: Decompress,
}

impl Default for Decompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Decompressor {
    pub fn new() -> Self {
        Self {
            raw: Decompress::new(true),
        }
    }

    /// Decompress and parse a wire header block into a header map.
    pub fn decompress(&mut self, block: &[u8]) -> Result<Headers, HeaderError> {
        let mut out = Vec::with_capacity(block.len().max(64) * 4);
        let base_in = self.raw.total_in();
        loop {
            let consumed = (self.raw.total_in() - base_in) as usize;
            let produced = out.len();
            match self
                .raw
                .decompress_vec(&block[consumed..], &mut out, FlushDecompress::Sync)
            {
                Ok(_) => {
                    let now_consumed = (self.raw.total_in() - base_in) as usize;
                    if now_consumed == block.len() && out.len() < out.capacity() {
                        break;
                    }
                    if now_consumed == consumed && out.len() == produced {
                        // Inflate stalled with input left over.
                        return Err(HeaderError::Truncated);
                    }
                    out.reserve(out.capacity().max(256));
                }
                // A fresh zlib stream asks for the preset dictionary
                // before the first block decodes.
                Err(e) if e.needs_dictionary().is_some() => {
                    self.raw.set_dictionary(&DICTIONARY)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        decode_block(&out)
    }
}

fn encode_block(headers: &Headers) -> Vec<u8> {
    let mut block = Vec::with_capacity(64);
    block.extend_from_slice(&(headers.len() as u32).to_be_bytes());
    for (name, values) in headers.iter() {
        block.extend_from_slice(&(name.len() as u32).to_be_bytes());
        block.extend_from_slice(name.as_bytes());
        let joined = values.join("\0");
        block.extend_from_slice(&(joined.len() as u32).to_be_bytes());
        block.extend_from_slice(joined.as_bytes());
    }
    block
}

fn decode_block(mut block: &[u8]) -> Result<Headers, HeaderError> {
    if block.remaining() < 4 {
        return Err(HeaderError::Truncated);
    }
    let count = block.get_u32();
    let mut headers = Headers::new();
    for _ in 0..count {
        let name = read_string(&mut block)?;
        let value = read_string(&mut block)?;
        for part in value.split('\0') {
            headers.add(&name, part);
        }
    }
    Ok(headers)
}

fn read_string(block: &mut &[u8]) -> Result<String, HeaderError> {
    if block.remaining() < 4 {
        return Err(HeaderError::Truncated);
    }
    let len = block.get_u32() as usize;
    if block.remaining() < len {
        return Err(HeaderError::Truncated);
    }
    let raw = block.copy_to_bytes(len);
    String::from_utf8(raw.to_vec()).map_err(|_| HeaderError::InvalidString)
}
