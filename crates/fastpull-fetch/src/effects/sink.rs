use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::path::Path;

use fastpull_verify::{FinalData, HashKind, MultiHasher};
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt, BufWriter};

use crate::error::Result;

/// Temp file plus hash state for one download, kept across attempts so a
/// resumed body continues where the previous attempt stopped.
pub(crate) struct Sink {
    writer:   BufWriter<File>,
    path:     TempPath,
    kinds:    BTreeSet<HashKind>,
    hasher:   MultiHasher,
    received: u64,
    /// URL the current bytes came from. Resuming against another URL is not
    /// attempted.
    source:   Option<String>,
}

impl Sink {
    pub(crate) fn create(dir: &Path, kinds: BTreeSet<HashKind>, chunk_size: usize) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let (file, path) = tempfile::Builder::new()
            .prefix("fetch-")
            .suffix(".tmp")
            .tempfile_in(dir)?
            .into_parts();
        Ok(Self {
            writer: BufWriter::with_capacity(chunk_size.max(1), File::from_std(file)),
            path,
            hasher: MultiHasher::new(&kinds),
            kinds,
            received: 0,
            source: None,
        })
    }

    pub(crate) fn received(&self) -> u64 { self.received }

    /// Offset to resume from when the next attempt targets `url`, if any.
    pub(crate) fn resume_offset(&self, url: &str) -> Option<u64> {
        (self.received > 0 && self.source.as_deref() == Some(url)).then_some(self.received)
    }

    pub(crate) fn set_source(&mut self, url: &str) { self.source = Some(url.to_string()); }

    pub(crate) async fn write(&mut self, chunk: &[u8]) -> Result<()> {
        self.writer.write_all(chunk).await?;
        self.hasher.update(chunk);
        self.received += chunk.len() as u64;
        Ok(())
    }

    pub(crate) async fn flush(&mut self) -> Result<()> {
        self.writer.flush().await?;
        Ok(())
    }

    /// Drops everything received so far.
    pub(crate) async fn reset(&mut self) -> Result<()> {
        self.writer.flush().await?;
        let file = self.writer.get_mut();
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        self.hasher = MultiHasher::new(&self.kinds);
        self.received = 0;
        self.source = None;
        Ok(())
    }

    /// Flushes to disk and closes the file.
    pub(crate) async fn finish(mut self) -> Result<(TempPath, FinalData)> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        drop(self.writer);
        Ok((self.path, self.hasher.finalize()))
    }
}
