//! Writes a normalized lead to the CRM.
//!
//! The sync runs the CRM calls one after another:
//!
//! 1. List the existing tags and create the missing ones
//! 2. Find the contact by email, then create it or merge-patch its fields
//! 3. Optionally remove stale assessment tags from the contact
//! 4. Assign the resolved tags that are not on the contact yet
//! 5. Re-fetch the contact so the caller sees the final remote state
//!
//! Nothing is rolled back if a later step fails. Tag failures either abort the
//! sync or are collected as [`SyncIssue`]s, depending on the [`TagPolicy`].

use crate::config::{SyncConfig, TagPolicy};
use crate::errors::SyncError;
use crate::lead::Lead;
use crate::metrics_defs::{CONTACTS_CREATED, TAG_ISSUES, TAGS_CREATED};
use crm::types::{Contact, ContactId, ContactUpdate, FieldValue, NewContact, Tag, TagId};
use crm::{Crm, CrmError};
use serde::Serialize;
use shared::counter;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    CreateTag,
    RemoveTag,
    AssignTag,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::CreateTag => "create_tag",
            SyncStage::RemoveTag => "remove_tag",
            SyncStage::AssignTag => "assign_tag",
        }
    }
}

/// A tag operation that failed but was skipped under the lenient policy
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncIssue {
    pub stage: SyncStage,
    pub tag: String,
    pub message: String,
}

#[derive(Clone, Debug)]
pub struct SyncOutcome {
    /// Contact as returned by the CRM after all updates
    pub contact: Contact,
    /// Whether the contact was created by this sync
    pub created: bool,
    pub created_tag_ids: Vec<TagId>,
    /// Tags newly assigned by this sync. Tags already on the contact are not included.
    pub assigned_tag_ids: Vec<TagId>,
    pub removed_tag_ids: Vec<TagId>,
    pub issues: Vec<SyncIssue>,
}

#[derive(Clone)]
pub struct LeadSync {
    crm: Arc<dyn Crm>,
    config: SyncConfig,
    assessment_tags: HashSet<String>,
}

impl LeadSync {
    pub fn new(crm: Arc<dyn Crm>, config: SyncConfig) -> Self {
        let assessment_tags = config.assessment_set();
        Self {
            crm,
            config,
            assessment_tags,
        }
    }

    pub async fn sync(&self, lead: &Lead) -> Result<SyncOutcome, SyncError> {
        let mut issues = Vec::new();

        let (resolved, created_tag_ids) = self.resolve_tags(&lead.tag_names, &mut issues).await?;
        let (contact_id, current_tags, created) = self.upsert_contact(lead).await?;

        let removed_tag_ids = if self.config.remove_stale_tags {
            self.remove_stale_tags(contact_id, &current_tags, &resolved, &mut issues)
                .await?
        } else {
            Vec::new()
        };

        let assigned_tag_ids = self
            .assign_tags(contact_id, &current_tags, &resolved, &mut issues)
            .await?;

        let contact = self.crm.get_contact(contact_id).await?;

        tracing::info!(
            contact_id,
            created,
            assigned = assigned_tag_ids.len(),
            removed = removed_tag_ids.len(),
            issues = issues.len(),
            "Lead synced"
        );

        Ok(SyncOutcome {
            contact,
            created,
            created_tag_ids,
            assigned_tag_ids,
            removed_tag_ids,
            issues,
        })
    }

    /// Maps every requested name to a tag id, creating the missing tags.
    /// Names are matched ignoring case and each missing name is created once.
    async fn resolve_tags(
        &self,
        names: &[String],
        issues: &mut Vec<SyncIssue>,
    ) -> Result<(Vec<Tag>, Vec<TagId>), SyncError> {
        if names.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let mut by_name: HashMap<String, TagId> = HashMap::new();
        for tag in self.crm.list_tags().await? {
            by_name.entry(tag.name.trim().to_lowercase()).or_insert(tag.id);
        }

        let mut resolved: Vec<Tag> = Vec::with_capacity(names.len());
        let mut created = Vec::new();

        for name in names {
            let key = name.to_lowercase();
            if let Some(&id) = by_name.get(&key) {
                if !resolved.iter().any(|t| t.id == id) {
                    resolved.push(Tag {
                        id,
                        name: name.clone(),
                    });
                }
                continue;
            }

            match self.crm.create_tag(name).await {
                Ok(tag) => {
                    tracing::debug!(tag = %tag.name, id = tag.id, "Created tag");
                    counter!(TAGS_CREATED).increment(1);
                    by_name.insert(key, tag.id);
                    created.push(tag.id);
                    resolved.push(tag);
                }
                Err(e) => self.tolerate(SyncStage::CreateTag, name, e, issues)?,
            }
        }

        Ok((resolved, created))
    }

    fn contact_fields(&self, lead: &Lead) -> Vec<FieldValue> {
        let mut fields = Vec::new();
        if let Some(first_name) = &lead.first_name {
            fields.push(FieldValue::new(
                &self.config.first_name_field_slug,
                first_name,
            ));
        }
        if let Some(score) = &lead.score {
            fields.push(FieldValue::new(&self.config.score_field_slug, score));
        }
        fields
    }

    /// Returns the contact id, the tags it carried before this sync and
    /// whether it was created.
    async fn upsert_contact(&self, lead: &Lead) -> Result<(ContactId, Vec<Tag>, bool), SyncError> {
        let fields = self.contact_fields(lead);
        let first_name = lead.first_name.clone();

        match self.crm.find_contact_by_email(&lead.email).await? {
            Some(existing) => {
                let update = ContactUpdate { first_name, fields };
                if !update.is_empty() {
                    self.crm.update_contact(existing.id, &update).await?;
                }
                tracing::debug!(contact_id = existing.id, "Updated existing contact");
                Ok((existing.id, existing.tags, false))
            }
            None => {
                let contact = self
                    .crm
                    .create_contact(&NewContact {
                        email: lead.email.clone(),
                        first_name,
                        fields,
                    })
                    .await?;
                counter!(CONTACTS_CREATED).increment(1);
                tracing::debug!(contact_id = contact.id, "Created contact");
                Ok((contact.id, contact.tags, true))
            }
        }
    }

    /// Removes assessment tags that the contact carries but that are not part
    /// of this sync. Other tags are never touched.
    async fn remove_stale_tags(
        &self,
        contact_id: ContactId,
        current: &[Tag],
        resolved: &[Tag],
        issues: &mut Vec<SyncIssue>,
    ) -> Result<Vec<TagId>, SyncError> {
        let mut removed = Vec::new();

        let stale = current.iter().filter(|tag| {
            self.assessment_tags
                .contains(&tag.name.trim().to_lowercase())
                && !resolved.iter().any(|r| r.id == tag.id)
        });

        for tag in stale {
            match self.crm.remove_tag(contact_id, tag.id).await {
                Ok(()) => removed.push(tag.id),
                Err(e) => self.tolerate(SyncStage::RemoveTag, &tag.name, e, issues)?,
            }
        }

        Ok(removed)
    }

    async fn assign_tags(
        &self,
        contact_id: ContactId,
        current: &[Tag],
        resolved: &[Tag],
        issues: &mut Vec<SyncIssue>,
    ) -> Result<Vec<TagId>, SyncError> {
        let mut assigned = Vec::new();

        for tag in resolved {
            if current.iter().any(|t| t.id == tag.id) {
                continue;
            }
            match self.crm.assign_tag(contact_id, tag.id).await {
                Ok(()) => assigned.push(tag.id),
                Err(e) => self.tolerate(SyncStage::AssignTag, &tag.name, e, issues)?,
            }
        }

        Ok(assigned)
    }

    fn tolerate(
        &self,
        stage: SyncStage,
        tag: &str,
        error: CrmError,
        issues: &mut Vec<SyncIssue>,
    ) -> Result<(), SyncError> {
        match self.config.tag_policy {
            TagPolicy::Strict => Err(error.into()),
            TagPolicy::Lenient => {
                tracing::warn!(stage = stage.as_str(), tag, error = %error, "Skipping failed tag operation");
                counter!(TAG_ISSUES, "stage" => stage.as_str()).increment(1);
                issues.push(SyncIssue {
                    stage,
                    tag: tag.to_string(),
                    message: error.to_string(),
                });
                Ok(())
            }
        }
    }
}
