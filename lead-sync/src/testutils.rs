use async_trait::async_trait;
use crm::types::{
    Contact, ContactField, ContactId, ContactUpdate, NewContact, Tag, TagId,
};
use crm::{Crm, CrmError};
use http::{Method, StatusCode};
use serde_json::Map;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct FakeState {
    tags: Vec<Tag>,
    contacts: Vec<Contact>,
    next_id: u64,
    calls: Vec<String>,
    failing_tag_names: HashSet<String>,
    failing_assignments: HashSet<TagId>,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn contact_mut(&mut self, id: ContactId) -> Result<&mut Contact, CrmError> {
        self.contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| rejected(Method::GET, format!("/contacts/{id}"), StatusCode::NOT_FOUND))
    }
}

fn rejected(method: Method, path: String, status: StatusCode) -> CrmError {
    CrmError::Upstream {
        method,
        path,
        status,
        body: r#"{"detail":"rejected by fake"}"#.to_string(),
    }
}

/// In-memory CRM that records every call it receives.
#[derive(Default)]
pub struct FakeCrm {
    state: Mutex<FakeState>,
}

impl FakeCrm {
    pub fn with_tags(names: &[&str]) -> Self {
        let crm = FakeCrm::default();
        {
            let mut state = crm.state.lock().unwrap();
            for name in names {
                let id = state.next_id();
                state.tags.push(Tag {
                    id,
                    name: name.to_string(),
                });
            }
        }
        crm
    }

    /// Adds a contact carrying the named tags, which must already exist.
    pub fn add_contact(&self, email: &str, tag_names: &[&str]) -> ContactId {
        let mut state = self.state.lock().unwrap();
        let tags = tag_names
            .iter()
            .map(|name| {
                state
                    .tags
                    .iter()
                    .find(|t| t.name == *name)
                    .cloned()
                    .unwrap()
            })
            .collect();
        let id = state.next_id();
        state.contacts.push(Contact {
            id,
            email: email.to_string(),
            first_name: None,
            fields: vec![],
            tags,
            extra: Map::new(),
        });
        id
    }

    pub fn fail_tag_creation(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_tag_names.insert(name.to_string());
    }

    pub fn fail_tag_assignment(&self, tag_id: TagId) {
        let mut state = self.state.lock().unwrap();
        state.failing_assignments.insert(tag_id);
    }

    pub fn tag_id(&self, name: &str) -> Option<TagId> {
        let state = self.state.lock().unwrap();
        state
            .tags
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.id)
    }

    /// Number of calls made to the named operation
    pub fn count(&self, operation: &str) -> usize {
        let state = self.state.lock().unwrap();
        state
            .calls
            .iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: String) -> std::sync::MutexGuard<'_, FakeState> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        state
    }
}

#[async_trait]
impl Crm for FakeCrm {
    async fn list_tags(&self) -> Result<Vec<Tag>, CrmError> {
        let state = self.record("list_tags".into());
        Ok(state.tags.clone())
    }

    async fn create_tag(&self, name: &str) -> Result<Tag, CrmError> {
        let mut state = self.record(format!("create_tag:{name}"));
        if state.failing_tag_names.contains(name) {
            return Err(rejected(
                Method::POST,
                "/tags".into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ));
        }
        let tag = Tag {
            id: state.next_id(),
            name: name.to_string(),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    async fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, CrmError> {
        let state = self.record(format!("find_contact:{email}"));
        Ok(state
            .contacts
            .iter()
            .find(|c| c.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_contact(&self, id: ContactId) -> Result<Contact, CrmError> {
        let mut state = self.record(format!("get_contact:{id}"));
        state.contact_mut(id).map(|c| c.clone())
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<Contact, CrmError> {
        let mut state = self.record(format!("create_contact:{}", contact.email));
        let created = Contact {
            id: state.next_id(),
            email: contact.email.clone(),
            first_name: contact.first_name.clone(),
            fields: contact
                .fields
                .iter()
                .map(|f| ContactField {
                    slug: f.slug.clone(),
                    value: Some(f.value.clone()),
                })
                .collect(),
            tags: vec![],
            extra: Map::new(),
        };
        state.contacts.push(created.clone());
        Ok(created)
    }

    async fn update_contact(
        &self,
        id: ContactId,
        update: &ContactUpdate,
    ) -> Result<Contact, CrmError> {
        let mut state = self.record(format!("update_contact:{id}"));
        let contact = state.contact_mut(id)?;
        if let Some(first_name) = &update.first_name {
            contact.first_name = Some(first_name.clone());
        }
        for field in &update.fields {
            contact.fields.retain(|f| f.slug != field.slug);
            contact.fields.push(ContactField {
                slug: field.slug.clone(),
                value: Some(field.value.clone()),
            });
        }
        Ok(contact.clone())
    }

    async fn assign_tag(&self, contact_id: ContactId, tag_id: TagId) -> Result<(), CrmError> {
        let mut state = self.record(format!("assign_tag:{contact_id}:{tag_id}"));
        if state.failing_assignments.contains(&tag_id) {
            return Err(rejected(
                Method::POST,
                format!("/contacts/{contact_id}/tags"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ));
        }
        let tag = state
            .tags
            .iter()
            .find(|t| t.id == tag_id)
            .cloned()
            .ok_or_else(|| {
                rejected(
                    Method::POST,
                    format!("/contacts/{contact_id}/tags"),
                    StatusCode::NOT_FOUND,
                )
            })?;
        let contact = state.contact_mut(contact_id)?;
        if !contact.has_tag(tag_id) {
            contact.tags.push(tag);
        }
        Ok(())
    }

    async fn remove_tag(&self, contact_id: ContactId, tag_id: TagId) -> Result<(), CrmError> {
        let mut state = self.record(format!("remove_tag:{contact_id}:{tag_id}"));
        let contact = state.contact_mut(contact_id)?;
        contact.tags.retain(|t| t.id != tag_id);
        Ok(())
    }
}
