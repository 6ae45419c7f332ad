//! Deflate-compressed zip bundles.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Incrementally built zip archive.
pub struct Bundle {
    writer: ZipWriter<File>,
    options: SimpleFileOptions,
    entries: usize,
}

impl Bundle {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            writer: ZipWriter::new(file),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            entries: 0,
        })
    }

    pub fn add_bytes(&mut self, name: &str, contents: &[u8]) -> Result<()> {
        self.writer
            .start_file(name, self.options)
            .with_context(|| format!("start archive entry {name}"))?;
        self.writer
            .write_all(contents)
            .with_context(|| format!("write archive entry {name}"))?;
        self.entries += 1;
        Ok(())
    }

    /// Copy a file on disk into the archive under `name`.
    pub fn add_file(&mut self, name: &str, source: &Path) -> Result<()> {
        let contents = fs::read(source).with_context(|| format!("read {}", source.display()))?;
        self.add_bytes(name, &contents)
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn finish(self) -> Result<()> {
        self.writer.finish().context("finish archive")?;
        Ok(())
    }
}
