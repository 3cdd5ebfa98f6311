//! Candidate Files
//!
//! A candidate is a single file offered by one source for one archive path.
//! Its content is opaque. The resolver only ever compares contents for
//! equality, and reports digest them.

use sha2::Digest;

use crate::platform::android::Abi;

/// File Content
///
/// Shared, immutable file content. Cloning is cheap, so the same content
/// can be referenced by the candidate set and the resolution.
#[derive(Clone, Debug)]
pub struct Content(std::sync::Arc<[u8]>);

impl Content {
    /// Return the content as byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Return the content size in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the content is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Compute the lower-case hex SHA-256 digest of the content.
    pub fn digest(&self) -> String {
        hex::encode(sha2::Sha256::digest(self.as_bytes()))
    }
}

impl PartialEq for Content {
    fn eq(&self, other: &Self) -> bool {
        std::sync::Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Content {
}

impl PartialOrd for Content {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Content {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_bytes().cmp(other.as_bytes())
    }
}

impl From<Vec<u8>> for Content {
    fn from(v: Vec<u8>) -> Self {
        Self(v.into())
    }
}

impl From<&[u8]> for Content {
    fn from(v: &[u8]) -> Self {
        Self(v.into())
    }
}

impl From<&str> for Content {
    fn from(v: &str) -> Self {
        Self(v.as_bytes().into())
    }
}

/// Candidate File
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CandidateFile {
    /// Archive path, `/`-separated, relative to the archive root.
    pub path: String,
    /// Identifier of the contributing source.
    pub source: String,
    pub content: Content,
}

impl CandidateFile {
    /// Create a new candidate.
    pub fn new(
        path: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<Content>,
    ) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            content: content.into(),
        }
    }

    /// Return the ABI of the candidate, if it is a native library.
    pub fn abi(&self) -> Option<Abi> {
        Abi::from_archive_path(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify content equality
    //
    // Content compares by bytes, regardless of whether the two values share
    // their allocation.
    #[test]
    fn content_eq() {
        let a = Content::from("blob");
        let b = Content::from(b"blob".to_vec());

        assert_eq!(a, a.clone());
        assert_eq!(a, b);
        assert_ne!(a, Content::from("blob2"));
        assert!(Content::from("a") < Content::from("b"));
        assert_eq!(a.len(), 4);
        assert!(Content::from("").is_empty());
    }

    // Verify content digests
    #[test]
    fn content_digest() {
        assert_eq!(
            Content::from("").digest(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );
    }

    // Verify ABI detection of candidates
    #[test]
    fn candidate_abi() {
        let c = CandidateFile::new("lib/armeabi-v7a/libx.so", "a", "x");
        assert_eq!(c.abi(), Some(Abi::ArmeabiV7a));

        let c = CandidateFile::new("res/a.png", "a", "x");
        assert_eq!(c.abi(), None);
    }
}
