use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub type TagId = u64;
pub type ContactId = u64;

pub const FIRST_NAME_SLUG: &str = "first_name";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
}

/// Custom field value on a contact.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ContactField {
    pub slug: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Contact {
    pub id: ContactId,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default)]
    pub fields: Vec<ContactField>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Any other attributes returned by the CRM, passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Contact {
    pub fn field(&self, slug: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.slug == slug)
            .and_then(|f| f.value.as_deref())
    }

    /// Top-level first name, falling back to the `first_name` custom field.
    pub fn first_name(&self) -> Option<&str> {
        self.first_name
            .as_deref()
            .or_else(|| self.field(FIRST_NAME_SLUG))
    }

    pub fn has_tag(&self, tag_id: TagId) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }
}

/// One page of a collection endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct FieldValue {
    pub slug: String,
    pub value: String,
}

impl FieldValue {
    pub fn new(slug: impl Into<String>, value: impl Into<String>) -> Self {
        FieldValue {
            slug: slug.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct NewTag<'a> {
    pub name: &'a str,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct NewContact {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldValue>,
}

/// Body of a merge-patch update. Only the listed fields are touched.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ContactUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldValue>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.fields.is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct AssignTag {
    #[serde(rename = "tagId")]
    pub tag_id: TagId,
}

// Field values come back as strings, numbers or null depending on the field type.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}
