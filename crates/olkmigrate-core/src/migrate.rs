//! The migration pass
//!
//! Walks every message source once, in directory order, resolves it against
//! the index and hands it to the importer.

use crate::config::MigrationConfig;
use crate::headers::read_message_id;
use crate::import::Importer;
use crate::index::{MessageIndex, ThreadHint};
use crate::locator::MessageLocator;
use crate::CoreResult;
use olkmigrate_store::MailStore;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

const PROGRESS_INTERVAL: usize = 100;

/// Counters of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Message sources found on disk
    pub processed: usize,
    /// Sources whose Message-ID is in the index
    pub matched: usize,
    /// Sources imported without index metadata
    pub unresolved: usize,
    /// Sources whose Message-ID could not be read
    pub extract_failures: usize,
    /// Distinct messages in the index
    pub indexed: usize,
    /// Indexed messages no source resolved to
    pub unseen: usize,
    pub dry_run: bool,
}

impl MigrationSummary {
    /// Processed sources relative to indexed messages, 0 for an empty index
    pub fn coverage_percent(&self) -> f64 {
        if self.indexed == 0 {
            return 0.0;
        }
        self.processed as f64 / self.indexed as f64 * 100.0
    }
}

impl fmt::Display for MigrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Found {} out of {} ({:.2}%)",
            group_thousands(self.processed),
            group_thousands(self.indexed),
            self.coverage_percent()
        )
    }
}

/// Format with `,` between groups of three digits
fn group_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// One run over a profile
pub struct Migration {
    locator: MessageLocator,
    index: MessageIndex,
    create_threads: bool,
}

impl Migration {
    pub fn new(locator: MessageLocator, index: MessageIndex, create_threads: bool) -> Self {
        Self {
            locator,
            index,
            create_threads,
        }
    }

    /// Validate the profile and load its index
    pub async fn prepare(config: &MigrationConfig) -> CoreResult<Self> {
        let profile = config.profile_path()?;
        let locator = MessageLocator::open(profile, &config.layout)?;
        let index = MessageIndex::open(profile, &config.layout).await?;
        Ok(Self::new(locator, index, config.create_threads))
    }

    pub fn index(&self) -> &MessageIndex {
        &self.index
    }

    /// Import every message source through `importer`
    pub fn run<S: MailStore>(&mut self, importer: &mut Importer<S>) -> CoreResult<MigrationSummary> {
        info!("Importing messages from {}", self.locator.sources_dir().display());
        self.process(false, |path, thread, folder_path| {
            importer.import(path, thread, folder_path)
        })
    }

    /// Resolve every message source without touching a store
    pub fn reconcile(&mut self) -> CoreResult<MigrationSummary> {
        info!("Reconciling messages in {}", self.locator.sources_dir().display());
        self.process(true, |path, thread, folder_path| {
            debug!(
                "{} -> {} (thread {:?})",
                path.display(),
                folder_path.map(|p| p.join("/")).unwrap_or_default(),
                thread
            );
            Ok(())
        })
    }

    fn process<F>(&mut self, dry_run: bool, mut sink: F) -> CoreResult<MigrationSummary>
    where
        F: FnMut(&Path, Option<ThreadHint>, Option<&[String]>) -> CoreResult<()>,
    {
        let mut summary = MigrationSummary {
            dry_run,
            ..Default::default()
        };

        for path in self.locator.messages() {
            let path = path?;
            summary.processed += 1;

            let message_id = match read_message_id(&path) {
                Ok(id) => id,
                Err(e) => {
                    warn!("{}", e);
                    summary.extract_failures += 1;
                    None
                }
            };

            let resolution = message_id.as_deref().and_then(|id| self.index.resolve(id));
            let (thread, folder_path) = match resolution {
                Some(resolution) => {
                    summary.matched += 1;
                    (
                        resolution.thread.filter(|_| self.create_threads),
                        resolution.folder_path,
                    )
                }
                None => {
                    debug!("No index entry for {}", path.display());
                    summary.unresolved += 1;
                    (None, None)
                }
            };

            sink(&path, thread, folder_path.as_deref())?;

            if summary.processed % PROGRESS_INTERVAL == 0 {
                info!("Processed {} messages", summary.processed);
            }
        }

        summary.indexed = self.index.message_count();
        summary.unseen = self.index.unseen().count();

        info!(
            "Done: {} processed, {} matched, {} unresolved",
            summary.processed, summary.matched, summary.unresolved
        );
        if summary.unseen > 0 {
            warn!("{} indexed messages have no message source", summary.unseen);
        }

        Ok(summary)
    }
}
