//! Maildir++ backed mail store
//!
//! The store root is the INBOX. Sub-folders live next to it as `.A.B`
//! directories, one dot per hierarchy level, with each name percent-encoded
//! so dots and slashes inside names survive. Conversation metadata is written
//! as `Thread-Topic` / `Thread-Index` headers, which is how Outlook exposes it
//! in MIME. Delivery goes through `maildirpp`.

use crate::stream::read_to_end;
use crate::{ComStream, ConversationIndex, MailItem, MailStore, StoreError, StoreFolder, StoreResult};
use maildirpp::Maildir;
use mail_parser::MessageParser;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Identifier of the root folder
pub const INBOX: &str = "INBOX";

const FOLDER_NAME: &AsciiSet = &CONTROLS.add(b'.').add(b'/').add(b'%');

const THREAD_HEADERS: [&str; 2] = ["Thread-Topic", "Thread-Index"];

/// Folder inside a Maildir++ store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaildirFolder {
    id: String,
    name: String,
    /// Decoded names from the top level down; empty for the root
    segments: Vec<String>,
    path: PathBuf,
}

impl MaildirFolder {
    fn root(path: &Path) -> Self {
        Self {
            id: INBOX.to_string(),
            name: INBOX.to_string(),
            segments: Vec::new(),
            path: path.to_path_buf(),
        }
    }

    /// Build a sub-folder handle from its directory name (`.A.B`)
    fn from_dir_name(root: &Path, dir_name: &str) -> Option<Self> {
        let encoded = dir_name.strip_prefix('.')?;
        if encoded.is_empty() {
            return None;
        }

        let segments = encoded
            .split('.')
            .map(|s| percent_decode_str(s).decode_utf8().map(|c| c.into_owned()))
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let name = segments.last()?.clone();

        Some(Self {
            id: dir_name.to_string(),
            name,
            segments,
            path: root.join(dir_name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names from the top level down to this folder
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }
}

impl StoreFolder for MaildirFolder {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Message imported into a Maildir++ folder
#[derive(Debug, Clone)]
pub struct MaildirMessage {
    folder: PathBuf,
    /// Content as imported; dropped by `unload` once the message is on disk
    raw: Option<Vec<u8>>,
    subject: Option<String>,
    conversation_index: Option<ConversationIndex>,
    conversation_topic: Option<String>,
    sent: bool,
    /// Maildir id of the delivered file
    id: Option<String>,
}

impl MaildirMessage {
    /// Maildir id of the delivered file, once saved
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Path of the delivered file, looked up in the folder
    pub fn location(&self) -> Option<PathBuf> {
        let id = self.id.as_deref()?;
        Maildir::from(self.folder.clone())
            .find(id)
            .map(|entry| entry.path().clone())
    }

    /// Whether the content is held in memory
    pub fn is_loaded(&self) -> bool {
        self.raw.is_some()
    }

    /// `raw` with this message's thread headers in front
    fn render(&self, raw: &[u8]) -> Vec<u8> {
        if self.conversation_index.is_none() && self.conversation_topic.is_none() {
            return raw.to_vec();
        }

        let eol = line_ending(raw);
        let mut out = Vec::with_capacity(raw.len() + 128);
        if let Some(topic) = &self.conversation_topic {
            let topic = topic.replace(['\r', '\n'], " ");
            out.extend_from_slice(format!("Thread-Topic: {}{}", topic, eol).as_bytes());
        }
        if let Some(index) = &self.conversation_index {
            out.extend_from_slice(format!("Thread-Index: {}{}", index, eol).as_bytes());
        }
        out.extend_from_slice(&strip_fields(raw, &THREAD_HEADERS));
        out
    }

    fn flags(&self) -> &'static str {
        if self.sent {
            "S"
        } else {
            "D"
        }
    }
}

impl MailItem for MaildirMessage {
    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn conversation_index(&self) -> Option<&ConversationIndex> {
        self.conversation_index.as_ref()
    }

    fn set_conversation_index(&mut self, index: ConversationIndex) {
        self.conversation_index = Some(index);
    }

    fn conversation_topic(&self) -> Option<&str> {
        self.conversation_topic.as_deref()
    }

    fn set_conversation_topic(&mut self, topic: Option<String>) {
        self.conversation_topic = topic;
    }

    fn set_sent(&mut self, sent: bool) {
        self.sent = sent;
    }

    fn is_sent(&self) -> bool {
        self.sent
    }

    fn unload(&mut self) {
        if self.id.is_some() {
            self.raw = None;
        }
    }
}

/// Session over a Maildir++ directory tree
pub struct MaildirStore {
    root: PathBuf,
}

impl MaildirStore {
    /// Open an existing Maildir++ root
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        if !is_maildir(root) {
            return Err(StoreError::OpenFailed(format!(
                "{} is not a maildir (expected cur, new and tmp)",
                root.display()
            )));
        }

        info!("Opened maildir store at {}", root.display());
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Create the root directories if needed, then open the store
    pub fn create(root: impl AsRef<Path>) -> StoreResult<Self> {
        Maildir::from(root.as_ref().to_path_buf()).create_dirs()?;
        Self::open(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write the message into `cur`, replacing its previous delivery
    fn deliver(&self, message: &mut MaildirMessage) -> StoreResult<()> {
        let maildir = Maildir::from(message.folder.clone());

        let content = match &message.raw {
            Some(raw) => message.render(raw),
            None => {
                let id = message
                    .id
                    .as_deref()
                    .ok_or_else(|| StoreError::MessageNotFound("message has no content".to_string()))?;
                let entry = maildir
                    .find(id)
                    .ok_or_else(|| StoreError::MessageNotFound(id.to_string()))?;
                message.render(&entry.body()?)
            }
        };

        let id = maildir.store_cur_with_flags(&content, message.flags())?;
        debug!("Saved message {} in {}", id, message.folder.display());

        if let Some(previous) = message.id.replace(id) {
            maildir.delete(&previous)?;
        }
        Ok(())
    }
}

impl MailStore for MaildirStore {
    type Folder = MaildirFolder;
    type Message = MaildirMessage;

    fn folder_by_id(&self, id: &str) -> StoreResult<MaildirFolder> {
        if id.eq_ignore_ascii_case(INBOX) {
            return Ok(MaildirFolder::root(&self.root));
        }

        let folder = MaildirFolder::from_dir_name(&self.root, id)
            .ok_or_else(|| StoreError::FolderNotFound(id.to_string()))?;
        if !is_maildir(folder.path()) {
            return Err(StoreError::FolderNotFound(id.to_string()));
        }
        Ok(folder)
    }

    fn folders(&self) -> StoreResult<Vec<MaildirFolder>> {
        let mut folders = Vec::new();
        for subdir in Maildir::from(self.root.clone()).list_subdirs() {
            let subdir = subdir?;
            let Some(dir_name) = subdir.path().file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(folder) = MaildirFolder::from_dir_name(&self.root, dir_name) {
                if is_maildir(folder.path()) {
                    folders.push(folder);
                }
            }
        }

        folders.sort_by(|a, b| a.segments.cmp(&b.segments));
        folders.insert(0, MaildirFolder::root(&self.root));
        Ok(folders)
    }

    fn child_folders(&self, parent: &MaildirFolder) -> StoreResult<Vec<MaildirFolder>> {
        let depth = parent.segments.len();
        Ok(self
            .folders()?
            .into_iter()
            .filter(|f| f.segments.len() == depth + 1 && f.segments[..depth] == parent.segments[..])
            .collect())
    }

    fn create_folder(&mut self, parent: &MaildirFolder, name: &str) -> StoreResult<MaildirFolder> {
        if name.is_empty() {
            return Err(StoreError::InvalidFolderName(name.to_string()));
        }

        let encoded = utf8_percent_encode(name, FOLDER_NAME).to_string();
        let dir_name = if parent.is_root() {
            format!(".{}", encoded)
        } else {
            format!("{}.{}", parent.id, encoded)
        };

        let mut segments = parent.segments.clone();
        segments.push(name.to_string());
        let folder = MaildirFolder {
            path: self.root.join(&dir_name),
            id: dir_name,
            name: name.to_string(),
            segments,
        };

        Maildir::from(folder.path.clone()).create_dirs()?;
        fs::write(folder.path().join("maildirfolder"), b"")?;

        info!("Created folder {}", folder.segments.join("/"));
        Ok(folder)
    }

    fn import_message(
        &mut self,
        folder: &MaildirFolder,
        source: &mut dyn ComStream,
    ) -> StoreResult<MaildirMessage> {
        let raw = read_to_end(source)?;

        let subject = MessageParser::default()
            .parse(&raw)
            .and_then(|m| m.subject().map(str::to_string));

        Ok(MaildirMessage {
            folder: folder.path.clone(),
            raw: Some(raw),
            subject,
            conversation_index: None,
            conversation_topic: None,
            sent: false,
            id: None,
        })
    }

    fn save(&mut self, message: &mut MaildirMessage) -> StoreResult<()> {
        self.deliver(message)
    }

    fn close(self) -> StoreResult<()> {
        info!("Closed maildir store at {}", self.root.display());
        Ok(())
    }
}

fn is_maildir(path: &Path) -> bool {
    ["cur", "new", "tmp"].iter().all(|d| path.join(d).is_dir())
}

/// Line ending of the first header line, CRLF when there is none
fn line_ending(raw: &[u8]) -> &'static str {
    match raw.iter().position(|&b| b == b'\n') {
        Some(i) if i > 0 && raw[i - 1] == b'\r' => "\r\n",
        Some(_) => "\n",
        None => "\r\n",
    }
}

/// Drop header fields (and their folded continuation lines) by name
fn strip_fields(raw: &[u8], names: &[&str]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut skipping = false;
    let mut offset = 0;

    for line in raw.split_inclusive(|&b| b == b'\n') {
        if line == b"\r\n" || line == b"\n" {
            break;
        }
        offset += line.len();

        if matches!(line.first(), Some(b' ') | Some(b'\t')) {
            if !skipping {
                out.extend_from_slice(line);
            }
            continue;
        }

        let field = line.split(|&b| b == b':').next().unwrap_or_default();
        skipping = names
            .iter()
            .any(|name| field.trim_ascii_end().eq_ignore_ascii_case(name.as_bytes()));
        if !skipping {
            out.extend_from_slice(line);
        }
    }

    out.extend_from_slice(&raw[offset..]);
    out
}
