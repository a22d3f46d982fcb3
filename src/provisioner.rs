use std::sync::Arc;

use tracing::{debug, info};

use crate::config::AppConfig;
use crate::drive::{ObjectStore, RemoteEntry};
use crate::error::AppResult;
use crate::models::Participant;

/// Resolves or lazily creates the per-participant folder in the object store.
///
/// Folders live under `section root / birth year / participant name`, but the
/// year bucket is a browsing convenience, not identity: a folder found under
/// the wrong year is still the participant's folder as long as it hangs off
/// the right section root. Participants whose birth date was corrected keep
/// their folder that way.
pub struct FolderProvisioner {
    config: Arc<AppConfig>,
    drive: Arc<dyn ObjectStore>,
}

impl FolderProvisioner {
    pub fn new(config: Arc<AppConfig>, drive: Arc<dyn ObjectStore>) -> Self {
        Self { config, drive }
    }

    /// Returns the participant folder id, creating the year and participant
    /// folders when absent. Concurrent first-time provisioning can produce a
    /// duplicate folder; wasteful but harmless, since classification matches
    /// by name and parent chain.
    pub async fn resolve_or_create(&self, participant: &Participant) -> AppResult<String> {
        let section_root = self
            .config
            .section_root(&participant.section_slug)?
            .to_string();

        // Name-first search across all year buckets, verified by grandparent.
        for candidate in self.drive.find_folders_named(&participant.full_name).await? {
            let Some(parent_id) = candidate.parent_id.as_deref() else {
                continue;
            };
            let Some(parent) = self.drive.entry(parent_id).await? else {
                continue;
            };
            if parent.parent_id.as_deref() == Some(section_root.as_str()) {
                debug!(
                    participant = %participant.full_name,
                    folder_id = %candidate.id,
                    year_bucket = %parent.name,
                    "resolved existing participant folder"
                );
                return Ok(candidate.id);
            }
        }

        let year_name = participant.birth_year().to_string();
        let year_id = match self.find_child_folder(&section_root, &year_name).await? {
            Some(existing) => existing.id,
            None => {
                let created = self.drive.create_folder(&year_name, &section_root).await?;
                debug!(section = %participant.section_slug, year = %year_name, "created year bucket");
                created.id
            }
        };

        let created = self
            .drive
            .create_folder(&participant.full_name, &year_id)
            .await?;
        info!(
            participant = %participant.full_name,
            section = %participant.section_slug,
            folder_id = %created.id,
            "provisioned participant folder"
        );
        Ok(created.id)
    }

    async fn find_child_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> AppResult<Option<RemoteEntry>> {
        let children = self.drive.list_children(parent_id).await?;
        Ok(children
            .into_iter()
            .find(|entry| entry.is_folder() && entry.name == name))
    }
}
