use std::io::Read;
use std::path::Path;

use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::domain::{HashKind, Hashes};

const BUF_SIZE: usize = 64 * 1024;

/// Incremental hasher computing a chosen set of digests in one pass.
/// CRC32 is always computed.
pub struct MultiHasher {
    crc: crc32fast::Hasher,
    md5: Option<Md5>,
    sha1: Option<Sha1>,
    sha256: Option<Sha256>,
    len: u64,
}

impl MultiHasher {
    pub fn new(kinds: &[HashKind]) -> Self {
        Self {
            crc: crc32fast::Hasher::new(),
            md5: kinds.contains(&HashKind::Md5).then(Md5::new),
            sha1: kinds.contains(&HashKind::Sha1).then(Sha1::new),
            sha256: kinds.contains(&HashKind::Sha256).then(Sha256::new),
            len: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.crc.update(data);
        if let Some(h) = self.md5.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha1.as_mut() {
            h.update(data);
        }
        if let Some(h) = self.sha256.as_mut() {
            h.update(data);
        }
        self.len += data.len() as u64;
    }

    /// Returns (bytes hashed, digests).
    pub fn finish(self) -> (u64, Hashes) {
        let mut hashes = Hashes::default();
        hashes.set(HashKind::Crc32, format!("{:08x}", self.crc.finalize()));
        if let Some(h) = self.md5 {
            hashes.set(HashKind::Md5, format!("{:x}", h.finalize()));
        }
        if let Some(h) = self.sha1 {
            hashes.set(HashKind::Sha1, format!("{:x}", h.finalize()));
        }
        if let Some(h) = self.sha256 {
            hashes.set(HashKind::Sha256, format!("{:x}", h.finalize()));
        }
        (self.len, hashes)
    }
}

/// Hash everything a reader yields, streaming in 64KB chunks.
pub fn hash_reader<R: Read>(mut reader: R, kinds: &[HashKind]) -> std::io::Result<(u64, Hashes)> {
    let mut hasher = MultiHasher::new(kinds);
    let mut buf = vec![0u8; BUF_SIZE];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hasher.finish())
}

/// Hash a file's contents without loading it entirely into memory.
pub fn hash_file(path: &Path, kinds: &[HashKind]) -> std::io::Result<(u64, Hashes)> {
    let file = std::fs::File::open(path)?;
    hash_reader(std::io::BufReader::with_capacity(BUF_SIZE, file), kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_crc32_always_present() {
        let (len, hashes) = hash_reader(&b"hello world"[..], &[]).unwrap();
        assert_eq!(len, 11);
        assert_eq!(hashes.crc32.as_deref(), Some("0d4a1185"));
        assert!(hashes.md5.is_none());
        assert!(hashes.sha1.is_none());
        assert!(hashes.sha256.is_none());
    }

    #[test]
    fn test_all_kinds_known_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.bin");
        fs::write(&path, b"hello world").unwrap();

        let (_, hashes) = hash_file(&path, &HashKind::ALL).unwrap();
        assert_eq!(hashes.md5.as_deref(), Some("5eb63bbbe01eeed093cb22bb8f5acdc3"));
        assert_eq!(
            hashes.sha1.as_deref(),
            Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed")
        );
        assert_eq!(
            hashes.sha256.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
    }

    #[test]
    fn test_empty_input() {
        let (len, hashes) = hash_reader(&b""[..], &[HashKind::Sha256]).unwrap();
        assert_eq!(len, 0);
        assert_eq!(hashes.crc32.as_deref(), Some("00000000"));
        assert_eq!(
            hashes.sha256.as_deref(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn test_consistency_across_chunking() {
        let data = vec![7u8; BUF_SIZE * 2 + 13];
        let (_, streamed) = hash_reader(&data[..], &[HashKind::Sha1]).unwrap();

        let mut one_shot = MultiHasher::new(&[HashKind::Sha1]);
        one_shot.update(&data);
        let (_, direct) = one_shot.finish();
        assert_eq!(streamed, direct);
    }

    #[test]
    fn test_nonexistent_file() {
        let result = hash_file(Path::new("/nonexistent/file.bin"), &[]);
        assert!(result.is_err());
    }
}
