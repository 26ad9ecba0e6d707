//! Mail store access for olkmigrate
//!
//! Provides the store session traits the importer works against, a Maildir++
//! backend, Outlook conversation index values, and a COM-style stream adapter.

mod conversation;
mod error;
mod maildir;
mod store;
pub mod stream;

pub use conversation::ConversationIndex;
pub use error::{StoreError, StoreResult};
pub use maildir::{MaildirFolder, MaildirMessage, MaildirStore, INBOX};
pub use store::{MailItem, MailStore, StoreFolder};
pub use stream::{AccessMode, ComStream, ManagedStream, StorageType, StreamStat};
