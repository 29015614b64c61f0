use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};

use crate::config::{TestDataSettings, TestUser};
use crate::models::{DynamicKind, Prospect, Schema, SchemaNode};
use crate::utils::error::{AppError, Result};
use crate::utils::slug;

/// Hands out contacts that never repeat within one factory: every field is
/// derived from a monotonic counter plus a tag (organization id or test
/// run id).
#[derive(Debug)]
pub struct ContactFactory {
    settings: TestDataSettings,
    tag: String,
    next_index: AtomicU64,
}

impl ContactFactory {
    pub fn new(settings: TestDataSettings, tag: impl Into<String>, first_index: u64) -> Self {
        Self {
            settings,
            tag: tag.into(),
            next_index: AtomicU64::new(first_index.max(1)),
        }
    }

    /// Factory for the manual sender, numbering from the organization's
    /// stored prospect index.
    pub fn for_organization(org_id: &str, first_index: u64) -> Self {
        let settings = TestDataSettings {
            first_name_pattern: "Prospect".to_string(),
            last_name_pattern: "Test".to_string(),
            email_domain: "example.com".to_string(),
            phone_area_code: "555".to_string(),
        };
        Self::new(settings, org_id, first_index)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn peek_next_index(&self) -> u64 {
        self.next_index.load(Ordering::SeqCst)
    }

    pub fn next_contact(&self) -> (u64, Prospect) {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        (index, self.contact_at(index))
    }

    pub fn contact_at(&self, index: u64) -> Prospect {
        let s = &self.settings;
        let stem = if self.tag.is_empty() {
            s.first_name_pattern.clone()
        } else {
            format!("{}_{}", s.first_name_pattern, self.tag)
        };

        Prospect {
            first_name: format!("{}_{:03}", stem, index),
            last_name: format!("{}{:03}", s.last_name_pattern, index),
            email: format!("{}.{:03}@{}", slug(&stem), index, s.email_domain),
            phone: format!(
                "{}-{:03}-{:04}",
                s.phone_area_code,
                (index / 10_000) % 1_000,
                index % 10_000
            ),
        }
    }
}

/// Inputs a schema can draw dynamic values from.
#[derive(Debug, Clone, Copy)]
pub struct GenerationContext<'a> {
    pub contact: &'a Prospect,
    pub assignee: Option<&'a TestUser>,
    pub record_id: Option<&'a str>,
}

impl<'a> GenerationContext<'a> {
    pub fn for_contact(contact: &'a Prospect) -> Self {
        Self {
            contact,
            assignee: None,
            record_id: None,
        }
    }

    pub fn for_record(contact: &'a Prospect, assignee: &'a TestUser, record_id: &'a str) -> Self {
        Self {
            contact,
            assignee: Some(assignee),
            record_id: Some(record_id),
        }
    }
}

pub struct PayloadGenerator {
    contacts: ContactFactory,
}

impl PayloadGenerator {
    pub fn new(contacts: ContactFactory) -> Self {
        Self { contacts }
    }

    pub fn contacts(&self) -> &ContactFactory {
        &self.contacts
    }

    /// Draws a fresh contact and renders `schema` with it.
    pub fn next_payload(&self, schema: &Schema) -> Result<(Prospect, Value)> {
        let (_, contact) = self.contacts.next_contact();
        let payload = Self::generate(schema, &contact)?;
        Ok((contact, payload))
    }

    pub fn generate(schema: &Schema, contact: &Prospect) -> Result<Value> {
        Self::generate_with(schema, &GenerationContext::for_contact(contact))
    }

    pub fn generate_with(schema: &Schema, ctx: &GenerationContext<'_>) -> Result<Value> {
        let mut payload = Map::new();
        for (key, node) in schema.fields() {
            payload.insert(key.clone(), render(node, key, ctx)?);
        }
        Ok(Value::Object(payload))
    }
}

fn render(node: &SchemaNode, path: &str, ctx: &GenerationContext<'_>) -> Result<Value> {
    match node {
        SchemaNode::Static(value) => Ok(value.clone()),
        SchemaNode::Dynamic(kind) => dynamic_value(*kind, path, ctx),
        SchemaNode::Object(children) => {
            let mut object = Map::new();
            for (key, child) in children {
                object.insert(key.clone(), render(child, &format!("{}.{}", path, key), ctx)?);
            }
            Ok(Value::Object(object))
        }
        SchemaNode::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| render(item, &format!("{}.{}", path, index), ctx))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
    }
}

fn dynamic_value(kind: DynamicKind, path: &str, ctx: &GenerationContext<'_>) -> Result<Value> {
    let missing = |requirement: &str| AppError::MissingGenerationContext {
        field: path.to_string(),
        kind: kind.to_string(),
        requirement: requirement.to_string(),
    };

    let value = match kind {
        DynamicKind::FirstName => Value::from(ctx.contact.first_name.as_str()),
        DynamicKind::LastName => Value::from(ctx.contact.last_name.as_str()),
        DynamicKind::Email => Value::from(ctx.contact.email.as_str()),
        DynamicKind::Phone => Value::from(ctx.contact.phone.as_str()),
        DynamicKind::UserEmail => {
            Value::from(ctx.assignee.ok_or_else(|| missing("an assigned test user"))?.email.as_str())
        }
        DynamicKind::UserId => {
            Value::from(ctx.assignee.ok_or_else(|| missing("an assigned test user"))?.user_id)
        }
        DynamicKind::TeamId => {
            Value::from(ctx.assignee.ok_or_else(|| missing("an assigned test user"))?.team_id)
        }
        DynamicKind::RecordId => Value::from(ctx.record_id.ok_or_else(|| missing("a record id"))?),
    };
    Ok(value)
}
