use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

const PREFIX: &str = "minimax-voice-";
const SHORT_LEN: usize = 6;

/// Voice identifier derived from file contents only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceId {
    digest: blake3::Hash,
}

impl VoiceId {
    #[cfg(test)]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            digest: blake3::hash(bytes),
        }
    }

    /// The identifier submitted to the clone endpoint.
    pub fn remote(&self) -> String {
        format!("{PREFIX}{}", self.digest.to_hex())
    }

    /// Truncated form for log lines.
    pub fn short(&self) -> String {
        let hex = self.digest.to_hex();
        format!("{PREFIX}{}", &hex[hex.len() - SHORT_LEN..])
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.remote())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("failed to hash {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("hashing task was interrupted")]
    Interrupted,
}

pub fn derive_blocking(path: &Path) -> Result<VoiceId, FingerprintError> {
    let io_err = |source| FingerprintError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(file).map_err(io_err)?;
    Ok(VoiceId {
        digest: hasher.finalize(),
    })
}

pub async fn derive(path: &Path) -> Result<VoiceId, FingerprintError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || derive_blocking(&path))
        .await
        .map_err(|_| FingerprintError::Interrupted)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn identical_contents_share_an_identifier() {
        let temp = TempDir::new().unwrap();
        let first = temp.path().join("first.mp3");
        let second = temp.path().join("renamed copy.wav");
        fs::write(&first, b"same audio bytes").unwrap();
        fs::write(&second, b"same audio bytes").unwrap();

        let a = derive_blocking(&first).unwrap();
        let b = derive_blocking(&second).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, VoiceId::from_bytes(b"same audio bytes"));
    }

    #[test]
    fn different_contents_differ() {
        assert_ne!(VoiceId::from_bytes(b"one"), VoiceId::from_bytes(b"two"));
    }

    #[test]
    fn remote_form_keeps_the_full_digest() {
        let id = VoiceId::from_bytes(b"voice");
        let remote = id.remote();
        assert!(remote.starts_with(PREFIX));
        assert_eq!(remote.len(), PREFIX.len() + 64);
        assert!(remote.ends_with(&id.short()[PREFIX.len()..]));
        assert_eq!(id.short().len(), PREFIX.len() + SHORT_LEN);
    }

    #[test]
    fn missing_file_fails() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            derive_blocking(&temp.path().join("nope.mp3")),
            Err(FingerprintError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn async_derivation_matches_blocking() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.m4a");
        fs::write(&path, vec![7u8; 100_000]).unwrap();
        assert_eq!(derive(&path).await.unwrap(), derive_blocking(&path).unwrap());
    }
}
