//! Pending review documents under `review/`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::artifacts::write_text;

pub fn write_review_doc(path: &Path, contents: &str) -> Result<()> {
    write_text(path, contents)?;
    debug!(path = %path.display(), "wrote review document");
    Ok(())
}

/// Move a pending review document to its finalized location.
///
/// Returns `false` when no pending document exists.
pub fn finalize_review_doc(pending: &Path, finalized: &Path) -> Result<bool> {
    if !pending.is_file() {
        return Ok(false);
    }
    if let Some(parent) = finalized.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::rename(pending, finalized).with_context(|| {
        format!(
            "move review document {} to {}",
            pending.display(),
            finalized.display()
        )
    })?;
    debug!(from = %pending.display(), to = %finalized.display(), "finalized review document");
    Ok(true)
}

/// Delete a pending review document. Missing documents are ignored.
pub fn discard_review_doc(pending: &Path) -> Result<()> {
    if pending.is_file() {
        fs::remove_file(pending)
            .with_context(|| format!("remove review document {}", pending.display()))?;
        debug!(path = %pending.display(), "discarded review document");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalize_moves_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pending = temp.path().join("review/api.md");
        let finalized = temp.path().join("done/api.md");
        write_review_doc(&pending, "# Review").expect("write");

        assert!(finalize_review_doc(&pending, &finalized).expect("finalize"));
        assert!(!pending.exists());
        assert_eq!(fs::read_to_string(&finalized).expect("read"), "# Review");
        assert!(!finalize_review_doc(&pending, &finalized).expect("finalize again"));
    }

    #[test]
    fn discard_tolerates_missing_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let pending = temp.path().join("review/api.md");
        discard_review_doc(&pending).expect("discard missing");
        write_review_doc(&pending, "# Review").expect("write");
        discard_review_doc(&pending).expect("discard");
        assert!(!pending.exists());
    }
}
