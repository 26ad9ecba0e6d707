//! Outlook conversation index values
//!
//! A conversation index starts with a 22 byte header block (reserved byte,
//! five bytes of FILETIME, a GUID) shared by every message of a conversation.
//! Each reply appends a 5 byte child block recording the time elapsed since
//! the header. Outlook exposes the value base64 encoded as `Thread-Index`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt;
use uuid::Uuid;

/// 100ns intervals between 1601-01-01 and the Unix epoch
const FILETIME_UNIX_OFFSET: u64 = 116_444_736_000_000_000;

/// Conversation index of a single message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationIndex(Vec<u8>);

impl ConversationIndex {
    pub const HEADER_LEN: usize = 22;
    pub const CHILD_LEN: usize = 5;

    /// Start a new conversation stamped with the current time
    pub fn new_root() -> Self {
        Self::root_at(Utc::now(), Uuid::new_v4())
    }

    /// Start a new conversation at a given time
    pub fn root_at(time: DateTime<Utc>, guid: Uuid) -> Self {
        let filetime = filetime(time);
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN);
        bytes.push(0x01);
        // bits 16..56 of the FILETIME, big endian
        bytes.extend_from_slice(&filetime.to_be_bytes()[1..6]);
        bytes.extend_from_slice(guid.as_bytes());
        Self(bytes)
    }

    /// Index for a reply to this message, stamped with the current time
    pub fn child(&self) -> Self {
        self.child_at(Utc::now())
    }

    /// Index for a reply to this message at a given time
    pub fn child_at(&self, time: DateTime<Utc>) -> Self {
        let delta = filetime(time).saturating_sub(self.header_filetime());

        let (flag, value) = if delta >> 49 == 0 {
            (0u32, (delta >> 18) as u32 & 0x7FFF_FFFF)
        } else {
            (1u32, (delta >> 23) as u32 & 0x7FFF_FFFF)
        };

        let random: u8 = rand::thread_rng().gen_range(0..16);
        let sequence = (self.depth() as u8).wrapping_add(1) & 0x0F;

        let mut bytes = self.0.clone();
        bytes.extend_from_slice(&((flag << 31) | value).to_be_bytes());
        bytes.push((random << 4) | sequence);
        Self(bytes)
    }

    /// Parse raw bytes, rejecting values that are not a header plus whole child blocks
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() < Self::HEADER_LEN || (bytes.len() - Self::HEADER_LEN) % Self::CHILD_LEN != 0 {
            return None;
        }
        Some(Self(bytes))
    }

    /// Parse the base64 form used by the `Thread-Index` header
    pub fn from_base64(encoded: &str) -> Option<Self> {
        let bytes = STANDARD.decode(encoded.trim()).ok()?;
        Self::from_bytes(bytes)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Conversation GUID from the header block
    pub fn guid(&self) -> Uuid {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(&self.0[6..Self::HEADER_LEN]);
        Uuid::from_bytes(guid)
    }

    /// Number of child blocks
    pub fn depth(&self) -> usize {
        (self.0.len() - Self::HEADER_LEN) / Self::CHILD_LEN
    }

    /// True when both indexes belong to the same conversation
    pub fn same_conversation(&self, other: &ConversationIndex) -> bool {
        self.0[..Self::HEADER_LEN] == other.0[..Self::HEADER_LEN]
    }

    /// True when this index extends `ancestor`
    pub fn is_descendant_of(&self, ancestor: &ConversationIndex) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }

    fn header_filetime(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw[..6].copy_from_slice(&self.0[..6]);
        u64::from_be_bytes(raw)
    }
}

impl fmt::Display for ConversationIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

fn filetime(time: DateTime<Utc>) -> u64 {
    let since_epoch = time.timestamp_nanos_opt().unwrap_or(0).max(0) as u64 / 100;
    since_epoch + FILETIME_UNIX_OFFSET
}
