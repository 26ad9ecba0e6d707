//! Core migration logic for olkmigrate
//!
//! Locates exported message sources in an Outlook for Mac profile, loads the
//! profile's SQLite message index, and re-imports each message into a mail
//! store with its original folder and conversation thread.

mod config;
mod error;
mod headers;
mod import;
mod index;
mod locator;
mod migrate;

pub use config::{MigrationConfig, ProfileLayout};
pub use error::{CoreError, CoreResult};
pub use headers::{normalize_message_id, read_message_id};
pub use import::{ConversationAnchor, Importer};
pub use index::{FolderRecord, MailRecord, MessageIndex, Resolution, ThreadHint, ThreadRecord};
pub use locator::MessageLocator;
pub use migrate::{Migration, MigrationSummary};
