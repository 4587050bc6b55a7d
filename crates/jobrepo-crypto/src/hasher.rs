use jobrepo_types::ObjectId;
use sha1::{Digest, Sha1};

use crate::canonical::{canonical_json, CanonicalError};

/// Build the canonical frame of an object: `"<kind> <byteLength>\0<body>"`.
///
/// This is the exact byte sequence git hashes for loose objects.
pub fn frame(kind: &str, body: &[u8]) -> Vec<u8> {
    let header = format!("{kind} {}\0", body.len());
    let mut out = Vec::with_capacity(header.len() + body.len());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(body);
    out
}

/// Split a framed object back into its kind tag and body.
///
/// Returns `None` if the header is malformed or the declared length does not
/// match the body.
pub fn unframe(bytes: &[u8]) -> Option<(&str, &[u8])> {
    let nul = bytes.iter().position(|b| *b == 0)?;
    let header = std::str::from_utf8(&bytes[..nul]).ok()?;
    let (kind, len) = header.split_once(' ')?;
    let len: usize = len.parse().ok()?;
    let body = &bytes[nul + 1..];
    (body.len() == len).then_some((kind, body))
}

/// SHA-1 content hasher keyed by object kind.
///
/// Each hasher carries the kind tag (`"blob"`, `"tree"`, `"commit"`) written
/// into the frame header before hashing, so a blob and a tree with identical
/// bodies hash differently.
pub struct ContentHasher {
    kind: &'static str,
}

impl ContentHasher {
    /// Hasher for blob objects.
    pub const BLOB: Self = Self { kind: "blob" };
    /// Hasher for tree objects.
    pub const TREE: Self = Self { kind: "tree" };
    /// Hasher for commit objects.
    pub const COMMIT: Self = Self { kind: "commit" };

    /// Create a hasher for a custom kind tag.
    pub const fn new(kind: &'static str) -> Self {
        Self { kind }
    }

    /// Hash an object body: SHA-1 over its frame.
    pub fn hash(&self, body: &[u8]) -> ObjectId {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", self.kind, body.len()).as_bytes());
        hasher.update(body);
        ObjectId::from_hash(hasher.finalize().into())
    }

    /// Hash the canonical JSON encoding of a serializable value.
    pub fn hash_json<T: serde::Serialize>(&self, value: &T) -> Result<ObjectId, CanonicalError> {
        let text = canonical_json(value)?;
        Ok(self.hash(text.as_bytes()))
    }

    /// Verify that a body produces the expected object ID.
    pub fn verify(&self, body: &[u8], expected: &ObjectId) -> bool {
        self.hash(body) == *expected
    }

    /// Raw SHA-1 of arbitrary bytes without framing.
    pub fn raw_hash(data: &[u8]) -> ObjectId {
        ObjectId::from_hash(Sha1::digest(data).into())
    }

    /// The kind tag used by this hasher.
    pub fn kind(&self) -> &str {
        self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout() {
        assert_eq!(frame("blob", b"abc"), b"blob 3\0abc".to_vec());
        assert_eq!(frame("tree", b""), b"tree 0\0".to_vec());
    }

    #[test]
    fn frame_counts_bytes_not_chars() {
        let body = "é".as_bytes();
        assert_eq!(frame("blob", body)[..7], *b"blob 2\0");
    }

    #[test]
    fn unframe_roundtrip() {
        let framed = frame("commit", b"tree x\n");
        let (kind, body) = unframe(&framed).unwrap();
        assert_eq!(kind, "commit");
        assert_eq!(body, b"tree x\n");
    }

    #[test]
    fn unframe_rejects_length_mismatch() {
        assert!(unframe(b"blob 5\0abc").is_none());
        assert!(unframe(b"no header").is_none());
    }

    #[test]
    fn matches_git_blob_ids() {
        // `git hash-object` of an empty file and of "hello world\n".
        assert_eq!(
            ContentHasher::BLOB.hash(b"").to_hex(),
            "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391"
        );
        assert_eq!(
            ContentHasher::BLOB.hash(b"hello world\n").to_hex(),
            "3b18e512dba79e4c8300dd08aeb37f8e728b8dad"
        );
    }

    #[test]
    fn matches_git_empty_tree() {
        assert_eq!(
            ContentHasher::TREE.hash(b"").to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
    }

    #[test]
    fn hash_equals_raw_hash_of_frame() {
        let body = b"some body";
        assert_eq!(
            ContentHasher::BLOB.hash(body),
            ContentHasher::raw_hash(&frame("blob", body))
        );
    }

    #[test]
    fn different_kinds_produce_different_hashes() {
        let body = b"same content";
        assert_ne!(ContentHasher::BLOB.hash(body), ContentHasher::TREE.hash(body));
        assert_ne!(ContentHasher::TREE.hash(body), ContentHasher::COMMIT.hash(body));
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::BLOB.hash(b"original");
        assert!(ContentHasher::BLOB.verify(b"original", &id));
        assert!(!ContentHasher::BLOB.verify(b"tampered", &id));
    }

    #[test]
    fn hash_json_ignores_key_order() {
        let a = serde_json::json!({"name": "a", "type": "phase"});
        let b = serde_json::json!({"type": "phase", "name": "a"});
        assert_eq!(
            ContentHasher::BLOB.hash_json(&a).unwrap(),
            ContentHasher::BLOB.hash_json(&b).unwrap()
        );
    }
}
