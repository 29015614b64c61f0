//! Declarative payload schemas.
//!
//! A schema file is a JSON object whose values are field definitions:
//!
//! ```json
//! {
//!   "first_name": {"type": "string", "dynamic": "firstName"},
//!   "source":     {"type": "string", "static": "Zillow"},
//!   "contact":    {"type": "object", "properties": {
//!       "email": {"type": "string", "dynamic": "email"}
//!   }},
//!   "tags":       {"type": "array", "items": [
//!       {"type": "string", "static": "webhook-test"}
//!   ]}
//! }
//! ```
//!
//! `type` is descriptive only; the value source is chosen by the `dynamic`,
//! `static`, `properties` or `items` key. A scalar leaf with none of them
//! renders as `null`. Fields keep the order of the schema file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::utils::error::{AppError, Result};

/// Value sources a `"dynamic"` marker can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DynamicKind {
    FirstName,
    LastName,
    Email,
    Phone,
    /// Email of the test user the record is meant for (`lo_email` style).
    UserEmail,
    UserId,
    TeamId,
    RecordId,
}

impl DynamicKind {
    pub const ALL: [DynamicKind; 8] = [
        DynamicKind::FirstName,
        DynamicKind::LastName,
        DynamicKind::Email,
        DynamicKind::Phone,
        DynamicKind::UserEmail,
        DynamicKind::UserId,
        DynamicKind::TeamId,
        DynamicKind::RecordId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DynamicKind::FirstName => "firstName",
            DynamicKind::LastName => "lastName",
            DynamicKind::Email => "email",
            DynamicKind::Phone => "phone",
            DynamicKind::UserEmail => "userEmail",
            DynamicKind::UserId => "userId",
            DynamicKind::TeamId => "teamId",
            DynamicKind::RecordId => "recordId",
        }
    }

    /// Contact kinds come from the generated prospect and are unique per
    /// generation; the rest are bound to the bulk-test record.
    pub fn is_contact_field(&self) -> bool {
        matches!(
            self,
            DynamicKind::FirstName | DynamicKind::LastName | DynamicKind::Email | DynamicKind::Phone
        )
    }
}

impl fmt::Display for DynamicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DynamicKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        DynamicKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Static(Value),
    Dynamic(DynamicKind),
    Object(IndexMap<String, SchemaNode>),
    Array(Vec<SchemaNode>),
}

impl SchemaNode {
    /// Parses one field definition. `field` is the dotted path used in
    /// error messages.
    pub fn from_definition(field: &str, definition: &Value) -> Result<Self> {
        let def = definition.as_object().ok_or_else(|| {
            AppError::malformed_schema(field, "field definition must be a JSON object")
        })?;

        if def.contains_key("dynamic") && def.contains_key("static") {
            return Err(AppError::malformed_schema(
                field,
                "declares both \"dynamic\" and \"static\"",
            ));
        }

        if let Some(marker) = def.get("dynamic") {
            let kind = marker.as_str().ok_or_else(|| {
                AppError::malformed_schema(field, "\"dynamic\" must name a kind as a string")
            })?;
            return kind
                .parse::<DynamicKind>()
                .map(SchemaNode::Dynamic)
                .map_err(|kind| AppError::UnknownDynamicKind {
                    field: field.to_string(),
                    kind,
                });
        }

        if let Some(value) = def.get("static") {
            return Ok(SchemaNode::Static(value.clone()));
        }

        if let Some(properties) = def.get("properties") {
            let properties = properties.as_object().ok_or_else(|| {
                AppError::malformed_schema(field, "\"properties\" must be a JSON object")
            })?;
            return parse_properties(field, properties).map(SchemaNode::Object);
        }

        if let Some(items) = def.get("items") {
            let items = items.as_array().ok_or_else(|| {
                AppError::malformed_schema(field, "\"items\" must be a JSON array")
            })?;
            let nodes = items
                .iter()
                .enumerate()
                .map(|(index, item)| {
                    SchemaNode::from_definition(&format!("{}.{}", field, index), item)
                })
                .collect::<Result<Vec<_>>>()?;
            return Ok(SchemaNode::Array(nodes));
        }

        match def.get("type").and_then(Value::as_str) {
            Some("object") => Ok(SchemaNode::Object(IndexMap::new())),
            Some("array") => Ok(SchemaNode::Array(Vec::new())),
            _ => Ok(SchemaNode::Static(Value::Null)),
        }
    }

    /// Turns a concrete payload value into an all-static definition.
    pub fn definition_from_payload(value: &Value) -> Value {
        match value {
            Value::Object(map) => json!({
                "type": "object",
                "properties": map
                    .iter()
                    .map(|(key, v)| (key.clone(), SchemaNode::definition_from_payload(v)))
                    .collect::<Map<String, Value>>(),
            }),
            Value::Array(items) => json!({
                "type": "array",
                "items": items
                    .iter()
                    .map(SchemaNode::definition_from_payload)
                    .collect::<Vec<_>>(),
            }),
            Value::String(_) => json!({"type": "string", "static": value}),
            Value::Bool(_) => json!({"type": "boolean", "static": value}),
            Value::Number(n) if n.is_f64() => json!({"type": "number", "static": value}),
            Value::Number(_) => json!({"type": "integer", "static": value}),
            Value::Null => json!({"type": "null", "static": null}),
        }
    }

    fn collect_leaves<'a>(&'a self, path: &str, out: &mut Vec<(String, &'a SchemaNode)>) {
        match self {
            SchemaNode::Object(children) => {
                for (key, child) in children {
                    child.collect_leaves(&join_path(path, key), out);
                }
            }
            SchemaNode::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    item.collect_leaves(&join_path(path, &index.to_string()), out);
                }
            }
            leaf => out.push((path.to_string(), leaf)),
        }
    }
}

/// One payload variant of one partner. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    category: String,
    partner: String,
    variant: String,
    source: PathBuf,
    fields: IndexMap<String, SchemaNode>,
}

impl Schema {
    pub fn from_value(
        root: &Value,
        category: impl Into<String>,
        partner: impl Into<String>,
        variant: impl Into<String>,
        source: impl Into<PathBuf>,
    ) -> Result<Self> {
        let source = source.into();
        let object = root.as_object().ok_or_else(|| {
            AppError::malformed_schema("<root>", "schema document must be a JSON object")
        })?;
        let name = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            category: category.into(),
            partner: partner.into(),
            variant: variant.into(),
            fields: parse_properties("", object)?,
            source,
        })
    }

    pub fn from_file(
        path: &Path,
        category: impl Into<String>,
        partner: impl Into<String>,
        variant: impl Into<String>,
    ) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::configuration(format!("cannot read schema {}: {}", path.display(), e))
        })?;
        let root: Value = serde_json::from_str(&contents).map_err(|e| {
            AppError::malformed_schema(path.display().to_string(), format!("invalid JSON: {}", e))
        })?;
        Self::from_value(&root, category, partner, variant, path)
    }

    /// Loads a schema file that lives outside the registry tree, such as a
    /// bulk-harness payload schema.
    pub fn standalone(path: &Path) -> Result<Self> {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_file(path, "", stem, "default")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn partner(&self) -> &str {
        &self.partner
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn fields(&self) -> &IndexMap<String, SchemaNode> {
        &self.fields
    }

    /// Leaf nodes with their dotted paths, in schema order.
    pub fn leaves(&self) -> Vec<(String, &SchemaNode)> {
        let mut out = Vec::new();
        for (key, node) in &self.fields {
            node.collect_leaves(key, &mut out);
        }
        out
    }

    pub fn dynamic_fields(&self) -> Vec<(String, DynamicKind)> {
        self.leaves()
            .into_iter()
            .filter_map(|(path, node)| match node {
                SchemaNode::Dynamic(kind) => Some((path, *kind)),
                _ => None,
            })
            .collect()
    }

    pub fn static_fields(&self) -> Vec<(String, &Value)> {
        self.leaves()
            .into_iter()
            .filter_map(|(path, node)| match node {
                SchemaNode::Static(value) => Some((path, value)),
                _ => None,
            })
            .collect()
    }

    /// Whether generating this schema needs a bulk-test record context.
    pub fn needs_record_context(&self) -> bool {
        self.dynamic_fields()
            .iter()
            .any(|(_, kind)| !kind.is_contact_field())
    }
}

fn parse_properties(
    parent: &str,
    properties: &Map<String, Value>,
) -> Result<IndexMap<String, SchemaNode>> {
    properties
        .iter()
        .map(|(key, def)| {
            let path = join_path(parent, key);
            SchemaNode::from_definition(&path, def).map(|node| (key.clone(), node))
        })
        .collect()
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}
