//! Pass-through streams that hash every byte they move.
//!
//! Hashing is fused into the read or write itself so each file is touched by
//! exactly one I/O pass.

use crate::crypto::Hasher;
use std::io::{self, Read, Write};

/// Wraps a reader and hashes everything read through it.
pub struct HashingReader<R> {
    inner: R,
    hasher: Hasher,
    bytes: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R, hasher: Hasher) -> Self {
        Self {
            inner,
            hasher,
            bytes: 0,
        }
    }

    /// Number of bytes read so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    /// Consume the stream and return the raw digest.
    pub fn finalize(self) -> Vec<u8> {
        self.hasher.finalize()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}

/// Wraps a writer and hashes everything written through it.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
    bytes: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W, hasher: Hasher) -> Self {
        Self {
            inner,
            hasher,
            bytes: 0,
        }
    }

    /// Number of bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    /// Flush the inner writer and return it together with the raw digest.
    pub fn finish(mut self) -> io::Result<(W, Vec<u8>)> {
        self.inner.flush()?;
        Ok((self.inner, self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Only the bytes the inner writer accepted are hashed.
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Algorithm, CryptoHelper};

    #[test]
    fn test_reader_hash_matches_direct_hash() {
        let helper = CryptoHelper::new(Algorithm::Blake3, None);
        let data = b"some repository content".to_vec();

        let mut reader = HashingReader::new(&data[..], helper.hasher());
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out, data);
        assert_eq!(reader.bytes_read(), data.len() as u64);
        assert_eq!(helper.to_hex(&reader.finalize()), helper.hash_bytes(&data));
    }

    #[test]
    fn test_writer_hash_matches_direct_hash() {
        let helper = CryptoHelper::new(Algorithm::Sha256, None);
        let mut writer = HashingWriter::new(Vec::new(), helper.hasher());
        writer.write_all(b"first ").unwrap();
        writer.write_all(b"second").unwrap();
        assert_eq!(writer.bytes_written(), 12);

        let (out, digest) = writer.finish().unwrap();
        assert_eq!(out, b"first second");
        assert_eq!(helper.to_hex(&digest), helper.hash_bytes(b"first second"));
    }

    #[test]
    fn test_empty_stream() {
        let helper = CryptoHelper::default();
        let reader = HashingReader::new(io::empty(), helper.hasher());
        assert_eq!(helper.to_hex(&reader.finalize()), helper.hash_bytes(b""));
    }
}
