use std::path::Path;

use super::constants::CATALOG_SENTINEL;
use crate::error::Result;

/// Immediate entries of `root`, in directory iteration order
pub async fn list_entries(root: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(root).await?;

    while let Some(entry) = dir.next_entry().await? {
        entries.push(entry.file_name().to_string_lossy().into_owned());
    }

    Ok(entries)
}

/// Newline-joined names followed by the sentinel
pub fn encode_listing(entries: &[String]) -> Vec<u8> {
    let mut out = entries.join("\n").into_bytes();
    out.extend_from_slice(CATALOG_SENTINEL);
    out
}

/// Split a listing body (sentinel already removed) into names
pub fn decode_listing(body: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(body);
    text.lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reassembles a legacy catalog from fragmented reads
#[derive(Debug, Default)]
pub struct CatalogAccumulator {
    buffer: Vec<u8>,
}

impl CatalogAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one read; true once the sentinel closes the buffer
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        self.buffer.extend_from_slice(chunk);
        self.is_complete()
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.ends_with(CATALOG_SENTINEL)
    }

    /// Names of a completed listing, `None` while the sentinel is missing
    pub fn finish(self) -> Option<Vec<String>> {
        let body = self.buffer.strip_suffix(CATALOG_SENTINEL)?;
        Some(decode_listing(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_listing_appends_sentinel() {
        let entries = vec!["report.pdf".to_string(), "data".to_string()];
        assert_eq!(encode_listing(&entries), b"report.pdf\ndata<<EOF>>".to_vec());
        assert_eq!(encode_listing(&[]), b"<<EOF>>".to_vec());
    }

    #[test]
    fn test_accumulator_handles_split_sentinel() {
        let mut acc = CatalogAccumulator::new();
        assert!(!acc.push(b"a.txt\nb"));
        assert!(!acc.push(b".txt<<E"));
        assert!(acc.push(b"OF>>"));

        assert_eq!(acc.finish().unwrap(), vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_accumulator_empty_listing() {
        let mut acc = CatalogAccumulator::new();
        assert!(acc.push(b"<<EOF>>"));
        assert!(acc.finish().unwrap().is_empty());
    }

    #[test]
    fn test_accumulator_incomplete() {
        let mut acc = CatalogAccumulator::new();
        acc.push(b"a.txt\n");
        assert!(acc.finish().is_none());
    }

    #[tokio::test]
    async fn test_list_entries_is_not_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.pdf"), b"pdf").unwrap();
        std::fs::create_dir_all(dir.path().join("data").join("nested")).unwrap();
        std::fs::write(dir.path().join("data").join("inner.txt"), b"x").unwrap();

        let mut entries = list_entries(dir.path()).await.unwrap();
        entries.sort();
        assert_eq!(entries, vec!["data", "report.pdf"]);
    }
}
