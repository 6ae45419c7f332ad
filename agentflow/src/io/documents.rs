//! Reference documents feeding the context retriever.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::retrieval::{SourceDocument, SourceKind};

/// Load `design/*.md` then `contracts/*.md`, each in sorted filename order.
pub fn load_documents(design_dir: &Path, contracts_dir: &Path) -> Result<Vec<SourceDocument>> {
    let mut docs = load_kind(design_dir, SourceKind::Design)?;
    docs.extend(load_kind(contracts_dir, SourceKind::Contract)?);
    Ok(docs)
}

fn load_kind(dir: &Path, kind: SourceKind) -> Result<Vec<SourceDocument>> {
    markdown_files(dir)?
        .into_iter()
        .map(|path| {
            let content =
                fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(SourceDocument {
                kind,
                name,
                content,
            })
        })
        .collect()
}

/// Sorted `*.md` files directly inside `dir`. A missing directory is empty.
pub fn markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let path = entry
            .with_context(|| format!("read dir entry in {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
