//! Importing message sources into a mail store
//!
//! Folders named by the index are found or created under the base folder.
//! With threading enabled, thread members are stamped with a conversation
//! index derived from the thread's first message. Members arriving before
//! that message are held until it shows up.

use crate::index::ThreadHint;
use crate::CoreResult;
use olkmigrate_store::{ConversationIndex, MailItem, MailStore, ManagedStream, StoreFolder};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Conversation metadata of a thread's first message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationAnchor {
    pub index: ConversationIndex,
    pub topic: Option<String>,
}

impl ConversationAnchor {
    fn stamp<M: MailItem>(&self, message: &mut M) {
        message.set_conversation_index(self.index.child());
        message.set_conversation_topic(self.topic.clone());
    }
}

/// Linking progress of one thread
#[derive(Debug)]
enum ThreadState<M> {
    Empty,
    /// Saved members waiting for the first message
    Buffering(Vec<M>),
    AnchorKnown(ConversationAnchor),
}

/// Places messages into a store
pub struct Importer<S: MailStore> {
    store: S,
    base_folder: S::Folder,
    /// Resolved folders keyed by lower-cased `/`-joined path
    folders: HashMap<String, S::Folder>,
    threads: HashMap<i64, ThreadState<S::Message>>,
}

impl<S: MailStore> Importer<S> {
    pub fn new(store: S, base_folder: S::Folder) -> Self {
        debug!("Importing under folder {}", base_folder.name());
        Self {
            store,
            base_folder,
            folders: HashMap::new(),
            threads: HashMap::new(),
        }
    }

    /// Start an import under the folder with the given store id
    pub fn with_folder_id(store: S, folder_id: &str) -> CoreResult<Self> {
        let base_folder = store.folder_by_id(folder_id)?;
        Ok(Self::new(store, base_folder))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn base_folder(&self) -> &S::Folder {
        &self.base_folder
    }

    /// Import one message source
    ///
    /// `thread` only takes effect for positive thread ids. A missing or empty
    /// `folder_path` places the message in the base folder.
    pub fn import(
        &mut self,
        path: &Path,
        thread: Option<ThreadHint>,
        folder_path: Option<&[String]>,
    ) -> CoreResult<()> {
        let folder = self.resolve_folder(folder_path)?;

        let mut source = ManagedStream::open_file(path, false, false)?;
        let mut message = self.store.import_message(&folder, &mut source)?;
        source.close();
        message.set_sent(true);

        let hold = match thread {
            Some(hint) if hint.id > 0 => self.link(hint, &mut message)?,
            _ => false,
        };

        self.store.save(&mut message)?;

        if let Some(hint) = thread.filter(|_| hold) {
            debug!("Holding {} until thread {} has an anchor", path.display(), hint.id);
            message.unload();
            let state = self.threads.entry(hint.id).or_insert(ThreadState::Empty);
            if let ThreadState::Buffering(pending) = state {
                pending.push(message);
            } else {
                *state = ThreadState::Buffering(vec![message]);
            }
        }

        Ok(())
    }

    /// Apply thread metadata; returns true when the message must wait for its anchor
    fn link(&mut self, hint: ThreadHint, message: &mut S::Message) -> CoreResult<bool> {
        let state = self.threads.entry(hint.id).or_insert(ThreadState::Empty);

        if let ThreadState::AnchorKnown(anchor) = state {
            if hint.is_first {
                debug!("Thread {} already has an anchor", hint.id);
            }
            anchor.stamp(message);
            return Ok(false);
        }

        if !hint.is_first {
            return Ok(true);
        }

        let anchor = ConversationAnchor {
            index: ConversationIndex::new_root(),
            topic: message.subject().map(str::to_string),
        };
        message.set_conversation_index(anchor.index.clone());
        message.set_conversation_topic(anchor.topic.clone());

        let previous = std::mem::replace(state, ThreadState::AnchorKnown(anchor.clone()));
        if let ThreadState::Buffering(pending) = previous {
            debug!("Linking {} held messages to thread {}", pending.len(), hint.id);
            for mut held in pending {
                anchor.stamp(&mut held);
                self.store.save(&mut held)?;
            }
        }

        Ok(false)
    }

    /// Find or create the folder for a path below the base folder
    fn resolve_folder(&mut self, folder_path: Option<&[String]>) -> CoreResult<S::Folder> {
        let segments = match folder_path {
            Some(segments) if !segments.is_empty() => segments,
            _ => return Ok(self.base_folder.clone()),
        };

        let key = segments.join("/").to_lowercase();
        if let Some(folder) = self.folders.get(&key) {
            return Ok(folder.clone());
        }

        let mut folder = self.base_folder.clone();
        for name in segments {
            let wanted = name.to_lowercase();
            let existing = self
                .store
                .child_folders(&folder)?
                .into_iter()
                .find(|child| child.name().to_lowercase() == wanted);

            folder = match existing {
                Some(child) => child,
                None => self.store.create_folder(&folder, name)?,
            };
        }

        self.folders.insert(key, folder.clone());
        Ok(folder)
    }

    /// Conversation anchor of a thread, once its first message was imported
    pub fn anchor(&self, thread_id: i64) -> Option<&ConversationAnchor> {
        match self.threads.get(&thread_id) {
            Some(ThreadState::AnchorKnown(anchor)) => Some(anchor),
            _ => None,
        }
    }

    /// Number of members of a thread still waiting for its first message
    pub fn pending(&self, thread_id: i64) -> usize {
        match self.threads.get(&thread_id) {
            Some(ThreadState::Buffering(pending)) => pending.len(),
            _ => 0,
        }
    }

    /// Members of all threads whose first message never arrived
    pub fn unanchored(&self) -> usize {
        self.threads
            .values()
            .map(|state| match state {
                ThreadState::Buffering(pending) => pending.len(),
                ThreadState::Empty | ThreadState::AnchorKnown(_) => 0,
            })
            .sum()
    }

    /// Give back the store session
    pub fn into_store(self) -> S {
        let unanchored = self.unanchored();
        if unanchored > 0 {
            warn!("{} threaded messages never saw their first message", unanchored);
        }
        self.store
    }

    /// End the store session
    pub fn close(self) -> CoreResult<()> {
        Ok(self.into_store().close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use olkmigrate_store::{MaildirStore, INBOX};
    use std::fs;
    use std::path::PathBuf;

    fn write_source(dir: &Path, name: &str, subject: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(
            &path,
            format!(
                "Message-ID: <{}@example.com>\r\nSubject: {}\r\n\r\nbody of {}\r\n",
                name, subject, name
            ),
        )
        .unwrap();
        path
    }

    fn importer(root: &Path) -> Importer<MaildirStore> {
        let store = MaildirStore::create(root).unwrap();
        Importer::with_folder_id(store, INBOX).unwrap()
    }

    fn delivered(folder: &Path) -> Vec<String> {
        let mut files: Vec<String> = fs::read_dir(folder.join("cur"))
            .unwrap()
            .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
            .collect();
        files.sort();
        files
    }

    fn header<'a>(content: &'a str, name: &str) -> Option<&'a str> {
        content
            .lines()
            .find_map(|line| line.strip_prefix(name)?.strip_prefix(": "))
    }

    fn path(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_unknown_message_goes_to_base_folder() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let source = write_source(sources.path(), "x", "Unknown");
        importer.import(&source, None, None).unwrap();

        let files = delivered(store.path());
        assert_eq!(files.len(), 1);
        assert!(header(&files[0], "Thread-Index").is_none());
        assert!(header(&files[0], "Thread-Topic").is_none());
        assert_eq!(importer.store().folders().unwrap().len(), 1);
    }

    #[test]
    fn test_messages_are_marked_sent() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        importer
            .import(&write_source(sources.path(), "x", "Sent"), None, None)
            .unwrap();

        let name = fs::read_dir(store.path().join("cur"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .file_name()
            .to_string_lossy()
            .into_owned();
        assert!(name.ends_with(",S"), "{}", name);
    }

    #[test]
    fn test_folders_created_once_and_matched_case_insensitively() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let a = write_source(sources.path(), "a", "A");
        let b = write_source(sources.path(), "b", "B");
        let c = write_source(sources.path(), "c", "C");

        importer.import(&a, None, Some(path(&["Inbox", "2023"]).as_slice())).unwrap();
        importer.import(&b, None, Some(path(&["INBOX", "2023"]).as_slice())).unwrap();
        importer.import(&c, None, Some(path(&["inbox", "Archive.old"]).as_slice())).unwrap();

        let names: Vec<String> = importer
            .store()
            .folders()
            .unwrap()
            .iter()
            .map(|f| f.segments().join("/"))
            .collect();
        assert_eq!(names, vec!["", "Inbox", "Inbox/2023", "Inbox/Archive.old"]);

        let year = importer.store().folder_by_id(".Inbox.2023").unwrap();
        assert_eq!(delivered(year.path()).len(), 2);
    }

    #[test]
    fn test_existing_folder_is_reused() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let root = importer.base_folder().clone();
        let mut store_session = importer.into_store();
        store_session.create_folder(&root, "Projects").unwrap();
        let mut importer = Importer::new(store_session, root);

        let a = write_source(sources.path(), "a", "A");
        importer.import(&a, None, Some(path(&["projects"]).as_slice())).unwrap();

        assert_eq!(importer.store().folders().unwrap().len(), 2);
        let projects = importer.store().folder_by_id(".Projects").unwrap();
        assert_eq!(delivered(projects.path()).len(), 1);
    }

    #[test]
    fn test_members_before_anchor_are_linked_later() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let b = write_source(sources.path(), "b", "Re: Plans");
        let c = write_source(sources.path(), "c", "Re: Re: Plans");
        let a = write_source(sources.path(), "a", "Plans");

        importer.import(&b, Some(ThreadHint { id: 5, is_first: false }), None).unwrap();
        importer.import(&c, Some(ThreadHint { id: 5, is_first: false }), None).unwrap();
        assert_eq!(importer.pending(5), 2);
        assert!(importer.anchor(5).is_none());

        importer.import(&a, Some(ThreadHint { id: 5, is_first: true }), None).unwrap();
        assert_eq!(importer.pending(5), 0);
        assert_eq!(importer.unanchored(), 0);

        let anchor = importer.anchor(5).unwrap().clone();
        assert_eq!(anchor.topic.as_deref(), Some("Plans"));

        let files = delivered(store.path());
        assert_eq!(files.len(), 3);
        for content in &files {
            assert_eq!(header(content, "Thread-Topic"), Some("Plans"));
            let index = ConversationIndex::from_base64(header(content, "Thread-Index").unwrap()).unwrap();
            assert!(index == anchor.index || index.is_descendant_of(&anchor.index));
        }
    }

    #[test]
    fn test_held_members_are_restamped_from_disk() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let b = write_source(sources.path(), "b", "Re: Plans");
        importer.import(&b, Some(ThreadHint { id: 5, is_first: false }), None).unwrap();

        let held = fs::read_dir(store.path().join("cur"))
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        fs::write(&held, "Subject: Re: Plans\r\n\r\nedited on disk\r\n").unwrap();

        let a = write_source(sources.path(), "a", "Plans");
        importer.import(&a, Some(ThreadHint { id: 5, is_first: true }), None).unwrap();

        let files = delivered(store.path());
        assert_eq!(files.len(), 2);
        let restamped = files
            .iter()
            .find(|content| content.contains("Subject: Re: Plans"))
            .unwrap();
        assert!(restamped.starts_with("Thread-Topic: Plans\r\nThread-Index: "));
        assert!(restamped.ends_with("\r\n\r\nedited on disk\r\n"));
    }

    #[test]
    fn test_members_after_anchor_are_linked_immediately() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let a = write_source(sources.path(), "a", "Plans");
        let b = write_source(sources.path(), "b", "Re: Plans");

        importer.import(&a, Some(ThreadHint { id: 7, is_first: true }), None).unwrap();
        importer.import(&b, Some(ThreadHint { id: 7, is_first: false }), None).unwrap();

        let anchor = importer.anchor(7).unwrap().clone();
        assert_eq!(anchor.index.depth(), 0);
        assert_eq!(importer.pending(7), 0);

        let children: Vec<ConversationIndex> = delivered(store.path())
            .iter()
            .filter_map(|c| ConversationIndex::from_base64(header(c, "Thread-Index")?))
            .filter(|index| index.depth() == 1)
            .collect();
        assert_eq!(children.len(), 1);
        assert!(children[0].is_descendant_of(&anchor.index));
    }

    #[test]
    fn test_second_first_message_keeps_anchor() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let a = write_source(sources.path(), "a", "Plans");
        let dup = write_source(sources.path(), "dup", "Other");

        importer.import(&a, Some(ThreadHint { id: 3, is_first: true }), None).unwrap();
        let anchor = importer.anchor(3).unwrap().clone();
        importer.import(&dup, Some(ThreadHint { id: 3, is_first: true }), None).unwrap();

        assert_eq!(importer.anchor(3), Some(&anchor));
        let topics: Vec<String> = delivered(store.path())
            .iter()
            .filter_map(|c| header(c, "Thread-Topic").map(str::to_string))
            .collect();
        assert_eq!(topics, vec!["Plans", "Plans"]);
    }

    #[test]
    fn test_non_positive_thread_ids_are_ignored() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let a = write_source(sources.path(), "a", "Plans");
        let b = write_source(sources.path(), "b", "Re: Plans");
        importer.import(&a, Some(ThreadHint { id: 0, is_first: false }), None).unwrap();
        importer.import(&b, Some(ThreadHint { id: -1, is_first: true }), None).unwrap();

        assert_eq!(importer.pending(0), 0);
        assert!(importer.anchor(-1).is_none());
        for content in delivered(store.path()) {
            assert!(header(&content, "Thread-Index").is_none());
        }
    }

    #[test]
    fn test_unanchored_members_stay_saved() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        let b = write_source(sources.path(), "b", "Re: Lost");
        importer.import(&b, Some(ThreadHint { id: 9, is_first: false }), None).unwrap();

        assert_eq!(importer.unanchored(), 1);
        importer.close().unwrap();
        assert_eq!(delivered(store.path()).len(), 1);
    }

    #[test]
    fn test_missing_source_propagates() {
        let sources = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let mut importer = importer(store.path());

        assert!(importer
            .import(&sources.path().join("gone"), None, None)
            .is_err());
    }
}
