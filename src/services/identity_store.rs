use super::IdentityStore;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

/// Reads the kiosk UUID from a device-local file. Read-only: never repairs the value.
pub struct FileIdentityStore {
    path: PathBuf,
}

impl FileIdentityStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn load(&self) -> std::io::Result<Option<String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let value = contents.trim();
                debug!("Read kiosk identity from {:?}", self.path);
                if value.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(value.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Fixed identity value, for demos and tests
pub struct StaticIdentityStore {
    value: Option<String>,
}

impl StaticIdentityStore {
    pub fn new(value: Option<String>) -> Self {
        Self { value }
    }
}

#[async_trait]
impl IdentityStore for StaticIdentityStore {
    async fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileIdentityStore::new(dir.path().join("kiosk-id"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_value_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk-id");
        std::fs::write(&path, "  3f2504e0-4f89-11d3-9a0c-0305e82c3301\n").unwrap();

        let store = FileIdentityStore::new(&path);
        assert_eq!(
            store.load().await.unwrap().as_deref(),
            Some("3f2504e0-4f89-11d3-9a0c-0305e82c3301")
        );
    }

    #[tokio::test]
    async fn test_blank_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kiosk-id");
        std::fs::write(&path, "\n\n").unwrap();

        let store = FileIdentityStore::new(path);
        assert_eq!(store.load().await.unwrap(), None);
    }
}
