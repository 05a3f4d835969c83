use std::collections::BTreeMap;
use std::io::{self, Read};

use crate::{FinalData, HashKind, MultiHasher, Result};

/// Streaming reader that hashes data as it passes through.
/// Wraps any `Read` source so bytes are touched once for both uses.
pub struct VerifiedReader<R> {
    reader: R,
    hasher: MultiHasher,
}

impl<R> VerifiedReader<R> {
    pub fn new(reader: R, hasher: MultiHasher) -> Self { Self { reader, hasher } }

    pub fn bytes_read(&self) -> u64 { self.hasher.bytes_hashed() }

    pub fn finish(self) -> FinalData { self.hasher.finalize() }

    /// Finalizes and checks the result against `expected`.
    pub fn finish_against(self, expected: &BTreeMap<HashKind, String>) -> Result<FinalData> {
        let data = self.finish();
        data.compare(expected)?;
        Ok(data)
    }
}

impl<R: Read> Read for VerifiedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}
