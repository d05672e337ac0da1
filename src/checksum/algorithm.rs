//! Content digests used for change detection.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;

const READ_BUFFER_SIZE: usize = 8192;

/// Hash function used to fingerprint tracked files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Sha256,
    Md5,
}

impl ChecksumAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "sha256",
            ChecksumAlgorithm::Md5 => "md5",
        }
    }

    /// Hex digest of an in-memory buffer.
    pub fn digest(self, bytes: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
            ChecksumAlgorithm::Md5 => hex::encode(Md5::digest(bytes)),
        }
    }

    /// Hex digest of a file, streamed in fixed-size chunks.
    pub async fn digest_file(self, path: &Path) -> std::io::Result<String> {
        match self {
            ChecksumAlgorithm::Sha256 => hash_file::<Sha256>(path).await,
            ChecksumAlgorithm::Md5 => hash_file::<Md5>(path).await,
        }
    }
}

async fn hash_file<D: Digest + Send>(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = file.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            other => Err(format!("unsupported checksum algorithm: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            ChecksumAlgorithm::Sha256.digest(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            ChecksumAlgorithm::Md5.digest(b"abc"),
            "900150983cd24fb0d6963f7d28e17f72"
        );
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("SHA256".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Sha256));
        assert_eq!("md5".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Md5));
        assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let parsed: ChecksumAlgorithm = serde_json::from_str("\"md5\"").unwrap();
        assert_eq!(parsed, ChecksumAlgorithm::Md5);
        assert_eq!(serde_json::to_string(&ChecksumAlgorithm::Sha256).unwrap(), "\"sha256\"");
    }

    #[tokio::test]
    async fn test_file_digest_matches_buffer_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        // spans several read chunks
        let content: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &content).unwrap();

        for algorithm in [ChecksumAlgorithm::Sha256, ChecksumAlgorithm::Md5] {
            assert_eq!(
                algorithm.digest_file(&path).await.unwrap(),
                algorithm.digest(&content)
            );
        }
    }

    #[tokio::test]
    async fn test_missing_file_digest_errors() {
        let result = ChecksumAlgorithm::Sha256
            .digest_file(Path::new("/no/such/file"))
            .await;
        assert!(result.is_err());
    }
}
