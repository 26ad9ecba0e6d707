//! Mail store session traits
//!
//! The importer only needs a handful of operations from the destination:
//! resolve a folder by id, walk and create child folders, import raw content
//! into a folder, and save messages. Backends implement [`MailStore`].

use crate::{ComStream, ConversationIndex, StoreResult};

/// A folder handle inside a store
pub trait StoreFolder: Clone {
    /// Store-specific identifier accepted by [`MailStore::folder_by_id`]
    fn id(&self) -> &str;

    /// Display name of the folder
    fn name(&self) -> &str;
}

/// A message created in a store but not necessarily saved yet
pub trait MailItem {
    fn subject(&self) -> Option<&str>;

    fn conversation_index(&self) -> Option<&ConversationIndex>;

    fn set_conversation_index(&mut self, index: ConversationIndex);

    fn conversation_topic(&self) -> Option<&str>;

    fn set_conversation_topic(&mut self, topic: Option<String>);

    /// Mark as already sent so the store does not treat it as a draft
    fn set_sent(&mut self, sent: bool);

    fn is_sent(&self) -> bool;

    /// Drop the in-memory content of a saved message
    ///
    /// A later save reads the content back from the store. Has no effect on
    /// a message that was never saved.
    fn unload(&mut self);
}

/// An open session against a mail store
pub trait MailStore {
    type Folder: StoreFolder;
    type Message: MailItem;

    /// Look up a folder by its identifier
    fn folder_by_id(&self, id: &str) -> StoreResult<Self::Folder>;

    /// Every folder of the store, root first
    fn folders(&self) -> StoreResult<Vec<Self::Folder>>;

    /// Direct children of a folder
    fn child_folders(&self, parent: &Self::Folder) -> StoreResult<Vec<Self::Folder>>;

    /// Create and persist a child folder
    fn create_folder(&mut self, parent: &Self::Folder, name: &str) -> StoreResult<Self::Folder>;

    /// Create a message in `folder` from raw RFC 5322 content
    fn import_message(
        &mut self,
        folder: &Self::Folder,
        source: &mut dyn ComStream,
    ) -> StoreResult<Self::Message>;

    /// Persist a message; saving an already saved message overwrites it
    fn save(&mut self, message: &mut Self::Message) -> StoreResult<()>;

    /// End the session
    fn close(self) -> StoreResult<()>;
}
