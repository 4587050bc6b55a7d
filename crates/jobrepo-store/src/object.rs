use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use jobrepo_crypto::{frame, ContentHasher};
use jobrepo_types::{ObjectId, OBJECT_ID_LEN};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw content (a serialized entity).
    Blob,
    /// Directory listing: sorted entries mapping names to object references.
    Tree,
    /// Snapshot pointer: a tree plus authorship and history metadata.
    Commit,
}

impl ObjectKind {
    /// The tag written into the object frame header.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
        }
    }

    /// Parse a frame header tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "blob" => Some(Self::Blob),
            "tree" => Some(Self::Tree),
            "commit" => Some(Self::Commit),
            _ => None,
        }
    }

    fn hasher(&self) -> &'static ContentHasher {
        match self {
            Self::Blob => &ContentHasher::BLOB,
            Self::Tree => &ContentHasher::TREE,
            Self::Commit => &ContentHasher::COMMIT,
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// A stored object: kind tag + encoded body.
///
/// `StoredObject` is the unit of storage. The store never interprets the
/// body; it is a pure key-value store keyed by content hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// The type of this object.
    pub kind: ObjectKind,
    /// The encoded bytes of the object, without the frame header.
    pub body: Vec<u8>,
}

impl StoredObject {
    /// Create a new stored object from kind and body.
    pub fn new(kind: ObjectKind, body: Vec<u8>) -> Self {
        Self { kind, body }
    }

    /// The framed bytes: `"<kind> <len>\0<body>"`.
    pub fn framed(&self) -> Vec<u8> {
        frame(self.kind.tag(), &self.body)
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        self.kind.hasher().hash(&self.body)
    }

    /// Size of the body in bytes.
    pub fn size(&self) -> usize {
        self.body.len()
    }
}

/// Typed object bodies that can be saved to and loaded from a store.
pub trait ObjectBody: Sized {
    /// The object kind this type encodes to.
    const KIND: ObjectKind;

    /// Encode into the canonical body bytes.
    fn encode(&self) -> StoreResult<Vec<u8>>;

    /// Decode from body bytes. `id` is used for error reporting only.
    fn decode(id: &ObjectId, body: &[u8]) -> StoreResult<Self>;

    /// Convert into a `StoredObject` for storage.
    fn to_stored_object(&self) -> StoreResult<StoredObject> {
        Ok(StoredObject::new(Self::KIND, self.encode()?))
    }

    /// Decode from a `StoredObject`, checking its kind.
    fn from_stored_object(obj: &StoredObject) -> StoreResult<Self> {
        let id = obj.compute_id();
        if obj.kind != Self::KIND {
            return Err(StoreError::KindMismatch {
                id,
                expected: Self::KIND,
                actual: obj.kind,
            });
        }
        Self::decode(&id, &obj.body)
    }
}

fn corrupt(id: &ObjectId, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptObject {
        id: *id,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Raw content object (analogous to git blob).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// The blob content as UTF-8 text, if it is valid.
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }
}

impl ObjectBody for Blob {
    const KIND: ObjectKind = ObjectKind::Blob;

    fn encode(&self) -> StoreResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn decode(_id: &ObjectId, body: &[u8]) -> StoreResult<Self> {
        Ok(Self {
            data: body.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// File mode for a tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryMode {
    /// Normal file (0o100644).
    Regular,
    /// Executable file (0o100755).
    Executable,
    /// Symbolic link (0o120000).
    Symlink,
    /// Subtree (0o040000).
    Tree,
}

impl EntryMode {
    /// Octal mode value.
    pub fn mode_bits(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Tree => 0o040000,
        }
    }

    /// Parse from an octal mode value.
    pub fn from_mode_bits(bits: u32) -> Option<Self> {
        match bits {
            0o100644 => Some(Self::Regular),
            0o100755 => Some(Self::Executable),
            0o120000 => Some(Self::Symlink),
            0o040000 => Some(Self::Tree),
            _ => None,
        }
    }

    /// Returns `true` for subtree entries.
    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.mode_bits())
    }
}

/// A single entry in a tree object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Entry mode (file or subtree).
    pub mode: EntryMode,
    /// Entry name (entity id or table name).
    pub name: String,
    /// Content-addressed ID of the referenced object.
    pub object_id: ObjectId,
}

impl TreeEntry {
    /// Create a new tree entry.
    pub fn new(mode: EntryMode, name: impl Into<String>, object_id: ObjectId) -> Self {
        Self {
            mode,
            name: name.into(),
            object_id,
        }
    }

    // Git orders subtrees as though their name carried a trailing '/'.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.as_bytes().to_vec();
        if self.mode.is_tree() {
            key.push(b'/');
        }
        key
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Directory listing object (analogous to git tree).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tree {
    /// Sorted entries in this directory.
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Create a new tree with the given entries.
    ///
    /// Entries are sorted for deterministic hashing.
    pub fn new(mut entries: Vec<TreeEntry>) -> Self {
        entries.sort();
        Self { entries }
    }

    /// Create an empty tree.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ObjectBody for Tree {
    const KIND: ObjectKind = ObjectKind::Tree;

    fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut entries: Vec<&TreeEntry> = self.entries.iter().collect();
        entries.sort();
        let mut out = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            if entry.name.is_empty() || entry.name.contains(['/', '\0']) {
                return Err(StoreError::Encode(format!(
                    "invalid tree entry name: {:?}",
                    entry.name
                )));
            }
            if i > 0 && entries[i - 1].name == entry.name {
                return Err(StoreError::Encode(format!(
                    "duplicate tree entry: {}",
                    entry.name
                )));
            }
            out.extend_from_slice(format!("{:o} {}\0", entry.mode.mode_bits(), entry.name).as_bytes());
            out.extend_from_slice(entry.object_id.as_bytes());
        }
        Ok(out)
    }

    fn decode(id: &ObjectId, body: &[u8]) -> StoreResult<Self> {
        let mut entries = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|b| *b == b' ')
                .ok_or_else(|| corrupt(id, "tree entry missing mode separator"))?;
            let mode_text = std::str::from_utf8(&rest[..space])
                .map_err(|_| corrupt(id, "tree entry mode is not utf-8"))?;
            let bits = u32::from_str_radix(mode_text, 8)
                .map_err(|_| corrupt(id, format!("bad tree entry mode {mode_text:?}")))?;
            let mode = EntryMode::from_mode_bits(bits)
                .ok_or_else(|| corrupt(id, format!("unknown tree entry mode {mode_text}")))?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|b| *b == 0)
                .ok_or_else(|| corrupt(id, "tree entry missing name terminator"))?;
            let name = std::str::from_utf8(&rest[..nul])
                .map_err(|_| corrupt(id, "tree entry name is not utf-8"))?
                .to_string();
            rest = &rest[nul + 1..];

            if rest.len() < OBJECT_ID_LEN {
                return Err(corrupt(id, format!("truncated hash for entry {name}")));
            }
            let object_id = ObjectId::from_slice(&rest[..OBJECT_ID_LEN])
                .map_err(|e| corrupt(id, e.to_string()))?;
            rest = &rest[OBJECT_ID_LEN..];

            entries.push(TreeEntry {
                mode,
                name,
                object_id,
            });
        }
        Ok(Self::new(entries))
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Author or committer identity with a timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub email: String,
    pub date: DateTime<FixedOffset>,
}

impl Person {
    /// Create a signature stamped with the current UTC time.
    pub fn now(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            date: Utc::now().fixed_offset(),
        }
    }

    fn encode(&self) -> String {
        let offset = self.date.offset().local_minus_utc();
        let sign = if offset < 0 { '-' } else { '+' };
        let minutes = offset.abs() / 60;
        format!(
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.date.timestamp(),
            sign,
            minutes / 60,
            minutes % 60
        )
    }

    fn decode(id: &ObjectId, line: &str) -> StoreResult<Self> {
        let open = line
            .find('<')
            .ok_or_else(|| corrupt(id, format!("bad signature {line:?}")))?;
        let close = line
            .rfind('>')
            .ok_or_else(|| corrupt(id, format!("bad signature {line:?}")))?;
        if close < open {
            return Err(corrupt(id, format!("bad signature {line:?}")));
        }
        let name = line[..open].trim_end().to_string();
        let email = line[open + 1..close].to_string();

        let mut when = line[close + 1..].split_whitespace();
        let seconds: i64 = when
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| corrupt(id, format!("bad signature time {line:?}")))?;
        let tz = when
            .next()
            .ok_or_else(|| corrupt(id, format!("bad signature zone {line:?}")))?;
        let offset = parse_tz(tz).ok_or_else(|| corrupt(id, format!("bad zone {tz:?}")))?;
        let date = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| corrupt(id, format!("bad timestamp {seconds}")))?;

        Ok(Self { name, email, date })
    }
}

fn parse_tz(tz: &str) -> Option<FixedOffset> {
    if tz.len() != 5 {
        return None;
    }
    let sign = match &tz[..1] {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    let hours: i32 = tz[1..3].parse().ok()?;
    let minutes: i32 = tz[3..5].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Immutable snapshot pointer (analogous to git commit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Person,
    pub committer: Person,
    pub message: String,
}

impl Commit {
    /// The first parent, if any. History is linear.
    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }
}

impl ObjectBody for Commit {
    const KIND: ObjectKind = ObjectKind::Commit;

    fn encode(&self) -> StoreResult<Vec<u8>> {
        let mut text = format!("tree {}\n", self.tree);
        for parent in &self.parents {
            text.push_str(&format!("parent {parent}\n"));
        }
        text.push_str(&format!("author {}\n", self.author.encode()));
        text.push_str(&format!("committer {}\n", self.committer.encode()));
        text.push('\n');
        text.push_str(&self.message);
        Ok(text.into_bytes())
    }

    fn decode(id: &ObjectId, body: &[u8]) -> StoreResult<Self> {
        let text = std::str::from_utf8(body).map_err(|_| corrupt(id, "commit is not utf-8"))?;
        let (headers, message) = text
            .split_once("\n\n")
            .ok_or_else(|| corrupt(id, "commit missing message separator"))?;

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        for line in headers.lines() {
            let (key, value) = line
                .split_once(' ')
                .ok_or_else(|| corrupt(id, format!("bad commit header {line:?}")))?;
            match key {
                "tree" => {
                    tree = Some(ObjectId::from_hex(value).map_err(|e| corrupt(id, e.to_string()))?)
                }
                "parent" => parents
                    .push(ObjectId::from_hex(value).map_err(|e| corrupt(id, e.to_string()))?),
                "author" => author = Some(Person::decode(id, value)?),
                "committer" => committer = Some(Person::decode(id, value)?),
                _ => {}
            }
        }

        let author = author.ok_or_else(|| corrupt(id, "commit missing author"))?;
        Ok(Self {
            tree: tree.ok_or_else(|| corrupt(id, "commit missing tree"))?,
            parents,
            committer: committer.unwrap_or_else(|| author.clone()),
            author,
            message: message.to_string(),
        })
    }
}
