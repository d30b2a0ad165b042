// src/files.rs
//! Feed documents on disk: one `<sid>.xml` per source (raw) and per derived feed (rendered),
//! all under `<data_root>/feeds`.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct FeedFiles {
    dir: PathBuf,
}

impl FeedFiles {
    pub fn new(data_root: impl AsRef<Path>) -> Self {
        Self {
            dir: data_root.as_ref().join("feeds"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, sid: &str) -> PathBuf {
        self.dir.join(format!("{sid}.xml"))
    }

    /// Idempotent.
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Replace the document for `sid` and return its size in bytes.
    pub async fn write(&self, sid: &str, bytes: &[u8]) -> io::Result<u64> {
        let path = self.path_for(sid);
        let tmp = path.with_extension("xml.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        self.size(sid).await
    }

    pub async fn read(&self, sid: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.path_for(sid)).await
    }

    pub async fn exists(&self, sid: &str) -> bool {
        tokio::fs::try_exists(self.path_for(sid))
            .await
            .unwrap_or(false)
    }

    pub async fn size(&self, sid: &str) -> io::Result<u64> {
        Ok(tokio::fs::metadata(self.path_for(sid)).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_reports_byte_length() {
        let tmp = tempfile::tempdir().unwrap();
        let files = FeedFiles::new(tmp.path());
        files.ensure_dir().await.unwrap();
        files.ensure_dir().await.unwrap();

        assert!(!files.exists("abc").await);
        let size = files.write("abc", "<rss>ü</rss>".as_bytes()).await.unwrap();
        assert_eq!(size, "<rss>ü</rss>".len() as u64);
        assert!(files.exists("abc").await);
        assert_eq!(files.read("abc").await.unwrap(), "<rss>ü</rss>".as_bytes());
        assert!(!files.dir().join("abc.xml.tmp").exists());
    }
}
