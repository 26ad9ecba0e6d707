//! Message source discovery inside an Outlook profile

use crate::config::ProfileLayout;
use crate::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Finds exported message sources under a profile directory
#[derive(Debug, Clone)]
pub struct MessageLocator {
    sources_dir: PathBuf,
    extension: String,
}

impl MessageLocator {
    /// Validate the profile layout
    pub fn open(profile: impl AsRef<Path>, layout: &ProfileLayout) -> CoreResult<Self> {
        let profile = profile.as_ref();
        if !profile.is_dir() {
            return Err(CoreError::InvalidProfile(format!(
                "{} is not a directory",
                profile.display()
            )));
        }

        let sources_dir = profile.join(&layout.sources_dir);
        if !sources_dir.is_dir() {
            return Err(CoreError::InvalidProfile(format!(
                "{} has no \"{}\" directory",
                profile.display(),
                layout.sources_dir
            )));
        }

        debug!("Message sources at {}", sources_dir.display());
        Ok(Self {
            sources_dir,
            extension: layout.message_extension.clone(),
        })
    }

    pub fn sources_dir(&self) -> &Path {
        &self.sources_dir
    }

    /// Walk the sources directory recursively, yielding matching files in walk order
    pub fn messages(&self) -> impl Iterator<Item = CoreResult<PathBuf>> + '_ {
        WalkDir::new(&self.sources_dir)
            .into_iter()
            .filter_map(move |entry| match entry {
                Ok(entry) if entry.file_type().is_file() && self.matches(entry.path()) => {
                    Some(Ok(entry.into_path()))
                }
                Ok(_) => None,
                Err(e) => Some(Err(e.into())),
            })
    }

    fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}
