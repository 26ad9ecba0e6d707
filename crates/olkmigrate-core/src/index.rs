//! In-memory message index loaded from `Outlook.sqlite`
//!
//! The profile database is read once, before any message is processed, into
//! three maps: folders by record id, messages by normalized Message-ID, and
//! per-thread aggregates. Reconciliation then happens entirely in memory.

use crate::config::ProfileLayout;
use crate::headers::normalize_message_id;
use crate::{CoreError, CoreResult};
use futures::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

const FOLDERS_QUERY: &str = "SELECT Record_RecordId, Folder_ParentID, Folder_Name FROM Folders \
     WHERE Folder_Name IS NOT NULL";

const MAIL_QUERY: &str = "SELECT Message_MessageID, Record_RecordID, Record_FolderID, Threads_ThreadID FROM Mail \
     WHERE Message_MessageID IS NOT NULL \
     AND Record_RecordID IS NOT NULL \
     AND Record_FolderID IS NOT NULL \
     AND Threads_ThreadID IS NOT NULL";

/// Folder row from the `Folders` table
#[derive(Debug, Clone)]
pub struct FolderRecord {
    pub parent_id: Option<i64>,
    pub name: String,
    /// Root-to-leaf names, filled on first resolution
    path: Option<Arc<[String]>>,
}

/// Message row from the `Mail` table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailRecord {
    pub record_id: i64,
    pub folder_id: i64,
    pub thread_id: i64,
    /// Set once a message source resolved to this record
    pub seen: bool,
}

/// Aggregate over all indexed messages sharing a thread id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadRecord {
    pub count: u32,
    /// Lowest record id in the thread, taken as the thread starter
    pub first_record_id: i64,
}

/// Thread membership of a resolved message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHint {
    pub id: i64,
    pub is_first: bool,
}

/// What the index knows about a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Present only for threads with more than one message
    pub thread: Option<ThreadHint>,
    /// Present when the message's folder is in the index
    pub folder_path: Option<Arc<[String]>>,
}

/// Folder tree, messages and thread aggregates of one profile
#[derive(Debug, Default)]
pub struct MessageIndex {
    folders: HashMap<i64, FolderRecord>,
    /// Keyed by lower-cased normalized Message-ID
    messages: HashMap<String, MailRecord>,
    threads: HashMap<i64, ThreadRecord>,
}

impl MessageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the index of a profile directory
    pub async fn open(profile: impl AsRef<Path>, layout: &ProfileLayout) -> CoreResult<Self> {
        let db_path = profile.as_ref().join(&layout.database_file);
        if !db_path.is_file() {
            return Err(CoreError::DatabaseNotFound(db_path.display().to_string()));
        }
        Self::load(&db_path).await
    }

    /// Load folders and messages from an Outlook SQLite database
    pub async fn load(db_path: &Path) -> CoreResult<Self> {
        info!("Loading message index from {}", db_path.display());

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let mut index = Self::new();

        debug!("Loading folders");
        {
            let mut rows = sqlx::query(FOLDERS_QUERY).fetch(&pool);
            while let Some(row) = rows.try_next().await? {
                index.insert_folder(row.try_get(0)?, row.try_get(1)?, row.try_get(2)?);
            }
        }

        debug!("Loading emails");
        {
            let mut rows = sqlx::query(MAIL_QUERY).fetch(&pool);
            while let Some(row) = rows.try_next().await? {
                let message_id: String = row.try_get(0)?;
                index.insert_mail(&message_id, row.try_get(1)?, row.try_get(2)?, row.try_get(3)?);
            }
        }

        pool.close().await;

        info!(
            "Loaded {} folders and {} messages in {} threads",
            index.folders.len(),
            index.messages.len(),
            index.threads.len()
        );
        Ok(index)
    }

    /// Add a folder; a folder id already present keeps its first record
    pub fn insert_folder(&mut self, id: i64, parent_id: Option<i64>, name: String) {
        self.folders.entry(id).or_insert(FolderRecord {
            parent_id,
            name,
            path: None,
        });
    }

    /// Add a message and fold it into its thread aggregate
    ///
    /// Returns false, changing nothing, when the normalized id is already indexed.
    pub fn insert_mail(&mut self, message_id: &str, record_id: i64, folder_id: i64, thread_id: i64) -> bool {
        let key = normalize_message_id(message_id).to_lowercase();
        if self.messages.contains_key(&key) {
            return false;
        }

        self.messages.insert(
            key,
            MailRecord {
                record_id,
                folder_id,
                thread_id,
                seen: false,
            },
        );

        self.threads
            .entry(thread_id)
            .and_modify(|thread| {
                thread.count += 1;
                if record_id < thread.first_record_id {
                    thread.first_record_id = record_id;
                }
            })
            .or_insert(ThreadRecord {
                count: 1,
                first_record_id: record_id,
            });

        true
    }

    /// Number of distinct indexed messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    pub fn message(&self, message_id: &str) -> Option<&MailRecord> {
        self.messages.get(&message_id.to_lowercase())
    }

    pub fn thread(&self, thread_id: i64) -> Option<&ThreadRecord> {
        self.threads.get(&thread_id)
    }

    /// Indexed messages no message source resolved to
    pub fn unseen(&self) -> impl Iterator<Item = (&str, &MailRecord)> {
        self.messages
            .iter()
            .filter(|(_, mail)| !mail.seen)
            .map(|(id, mail)| (id.as_str(), mail))
    }

    /// Look up a normalized Message-ID
    ///
    /// Marks the message as seen. A thread is reported only when more than
    /// one indexed message belongs to it.
    pub fn resolve(&mut self, message_id: &str) -> Option<Resolution> {
        if message_id.is_empty() {
            return None;
        }

        let mail = self.messages.get_mut(&message_id.to_lowercase())?;
        mail.seen = true;
        let (record_id, folder_id, thread_id) = (mail.record_id, mail.folder_id, mail.thread_id);

        let thread = self
            .threads
            .get(&thread_id)
            .filter(|thread| thread.count > 1)
            .map(|thread| ThreadHint {
                id: thread_id,
                is_first: thread.first_record_id == record_id,
            });

        Some(Resolution {
            thread,
            folder_path: self.folder_path(folder_id),
        })
    }

    /// Root-to-leaf folder names for a folder id, computed once per folder
    ///
    /// A cyclic parent chain stops at the first folder seen twice.
    pub fn folder_path(&mut self, folder_id: i64) -> Option<Arc<[String]>> {
        if let Some(path) = &self.folders.get(&folder_id)?.path {
            return Some(Arc::clone(path));
        }

        let mut names = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(folder_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                warn!("Folder {} has a cyclic parent chain at folder {}", folder_id, id);
                break;
            }
            let Some(folder) = self.folders.get(&id) else {
                break;
            };
            names.push(folder.name.clone());
            current = folder.parent_id;
        }

        names.reverse();
        let path: Arc<[String]> = names.into();

        if let Some(folder) = self.folders.get_mut(&folder_id) {
            folder.path = Some(Arc::clone(&path));
        }
        Some(path)
    }
}
