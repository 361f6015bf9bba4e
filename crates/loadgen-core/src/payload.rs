//! Shared synthetic message content.
//!
//! Every publish unit of a run sends the same payload bytes. The content
//! is loaded once on first use, no matter how many units race for it, and
//! handed out as cheap [`Bytes`] clones afterwards.

use bytes::Bytes;
use std::path::PathBuf;
use tokio::sync::OnceCell;
use tracing::info;

/// Content embedded in the binary, used when no payload file is given.
static DEFAULT_CONTENT: &[u8] = include_bytes!("messagecontent.txt");

/// Lazily loaded, immutable payload content.
#[derive(Debug)]
pub struct SharedPayload {
    source: Option<PathBuf>,
    cell: OnceCell<Bytes>,
}

impl SharedPayload {
    /// Use the built-in content.
    pub fn builtin() -> Self {
        Self {
            source: None,
            cell: OnceCell::new(),
        }
    }

    /// Read the content from a file on first use.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Some(path.into()),
            cell: OnceCell::new(),
        }
    }

    /// Use the given bytes directly. Handy in tests.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            source: None,
            cell: OnceCell::new_with(Some(bytes.into())),
        }
    }

    /// Get the content, loading it on first call.
    ///
    /// Concurrent first calls perform a single load; everyone gets a clone
    /// of the same bytes. The content is never re-read once loaded.
    pub async fn get(&self) -> Result<Bytes, std::io::Error> {
        let bytes = self
            .cell
            .get_or_try_init(|| async {
                match &self.source {
                    Some(path) => {
                        let data = tokio::fs::read(path).await?;
                        info!("Loaded payload content from {:?} ({} bytes)", path, data.len());
                        Ok::<_, std::io::Error>(Bytes::from(data))
                    }
                    None => Ok(Bytes::from_static(DEFAULT_CONTENT)),
                }
            })
            .await?;
        Ok(bytes.clone())
    }
}

impl Default for SharedPayload {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_builtin_content_is_nonempty() {
        let payload = SharedPayload::builtin();
        let bytes = payload.get().await.unwrap();
        assert!(!bytes.is_empty());
        assert_eq!(bytes, Bytes::from_static(DEFAULT_CONTENT));
    }

    #[tokio::test]
    async fn test_file_content_loaded_once() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "payload from disk").unwrap();
        file.flush().unwrap();

        let payload = SharedPayload::from_file(file.path());
        let first = payload.get().await.unwrap();
        assert_eq!(first, Bytes::from_static(b"payload from disk"));

        // Deleting the file no longer matters once the content is cached.
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());

        let second = payload.get().await.unwrap();
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_missing_file_surfaces_error() {
        let payload = SharedPayload::from_file("/nonexistent/payload.txt");
        assert!(payload.get().await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_first_access_yields_same_bytes() {
        let payload = std::sync::Arc::new(SharedPayload::from_bytes("shared"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let payload = std::sync::Arc::clone(&payload);
            handles.push(tokio::spawn(async move { payload.get().await.unwrap() }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert!(results.iter().all(|b| b == &results[0]));
    }
}
