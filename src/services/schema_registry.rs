use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::models::{Schema, SchemaNode};
use crate::providers::StructuredLogger;
use crate::utils::error::{AppError, Result};
use crate::utils::{slug, write_json_atomic};

pub const SCHEMA_SUFFIX: &str = "_schema.json";
pub const CUSTOM_SCHEMAS_DIR: &str = "custom_schemas";
pub const DEFAULT_VARIANT: &str = "default";

#[derive(Debug, Clone, PartialEq)]
pub struct VariantEntry {
    pub name: String,
    pub path: PathBuf,
    pub custom: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartnerEntry {
    pub category: String,
    pub name: String,
    pub dir: PathBuf,
    pub variants: BTreeMap<String, VariantEntry>,
}

/// What a caller has to do before generating a payload for a partner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantSelection {
    /// Exactly one variant: use it without asking.
    Single(String),
    /// Several variants: the caller must pick one.
    Choice(Vec<String>),
}

/// Catalog of partner schemas found under
/// `<root>/<category>/<partner>/*_schema.json` (plus each partner's
/// `custom_schemas/`). The catalog is a snapshot; call [`reload`] to pick up
/// edits made on disk.
///
/// [`reload`]: SchemaRegistry::reload
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    root: PathBuf,
    categories: BTreeMap<String, Vec<String>>,
    partners: BTreeMap<String, PartnerEntry>,
}

impl SchemaRegistry {
    pub fn load(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(AppError::configuration(format!(
                "Schema directory not found: {}",
                root.display()
            )));
        }

        let mut categories = BTreeMap::new();
        let mut partners: BTreeMap<String, PartnerEntry> = BTreeMap::new();

        for category_dir in visible_subdirs(&root)? {
            let category = dir_name(&category_dir);
            let mut names = Vec::new();

            for partner_dir in visible_subdirs(&category_dir)? {
                let name = dir_name(&partner_dir);
                if let Some(existing) = partners.get(&name) {
                    return Err(AppError::configuration(format!(
                        "Partner '{}' appears in both '{}' and '{}'",
                        name, existing.category, category
                    )));
                }

                let mut variants = BTreeMap::new();
                collect_variants(&partner_dir, &name, false, &mut variants)?;
                let custom_dir = partner_dir.join(CUSTOM_SCHEMAS_DIR);
                if custom_dir.is_dir() {
                    collect_variants(&custom_dir, &name, true, &mut variants)?;
                }

                names.push(name.clone());
                partners.insert(
                    name.clone(),
                    PartnerEntry {
                        category: category.clone(),
                        name,
                        dir: partner_dir,
                        variants,
                    },
                );
            }

            categories.insert(category, names);
        }

        StructuredLogger::log_info(
            "Schema registry loaded",
            None,
            None,
            Some(serde_json::json!({
                "schemas_dir": root.display().to_string(),
                "categories": categories.len(),
                "partners": partners.len(),
            })),
        );

        Ok(Self {
            root,
            categories,
            partners,
        })
    }

    /// Rescans the same root directory.
    pub fn reload(&self) -> Result<Self> {
        Self::load(&self.root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn list_categories(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    pub fn partners_in_category(&self, category: &str) -> Vec<&str> {
        self.categories
            .get(category)
            .map(|names| names.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn list_partners(&self) -> Vec<&str> {
        self.partners.keys().map(String::as_str).collect()
    }

    /// Exact match first, then case-insensitive.
    pub fn partner(&self, name: &str) -> Result<&PartnerEntry> {
        self.partners
            .get(name)
            .or_else(|| {
                self.partners
                    .values()
                    .find(|p| p.name.eq_ignore_ascii_case(name))
            })
            .ok_or_else(|| AppError::PartnerNotFound {
                partner: name.to_string(),
            })
    }

    pub fn list_variants(&self, partner: &str) -> Result<Vec<String>> {
        let entry = self.partner(partner)?;
        if entry.variants.is_empty() {
            return Err(AppError::NoVariants {
                partner: entry.name.clone(),
            });
        }
        Ok(entry.variants.keys().cloned().collect())
    }

    pub fn variant_selection(&self, partner: &str) -> Result<VariantSelection> {
        let mut variants = self.list_variants(partner)?;
        if variants.len() == 1 {
            Ok(VariantSelection::Single(variants.remove(0)))
        } else {
            Ok(VariantSelection::Choice(variants))
        }
    }

    pub fn load_schema(&self, partner: &str, variant: &str) -> Result<Schema> {
        let entry = self.partner(partner)?;
        let variant_entry = entry
            .variants
            .get(variant)
            .ok_or_else(|| AppError::SchemaNotFound {
                partner: entry.name.clone(),
                variant: variant.to_string(),
            })?;
        Schema::from_file(&variant_entry.path, &entry.category, &entry.name, variant)
    }

    /// Loads the requested variant, or the only one when none is given.
    pub fn resolve_schema(&self, partner: &str, variant: Option<&str>) -> Result<Schema> {
        match (variant, self.variant_selection(partner)?) {
            (Some(variant), _) => self.load_schema(partner, variant),
            (None, VariantSelection::Single(only)) => self.load_schema(partner, &only),
            (None, VariantSelection::Choice(variants)) => Err(AppError::VariantRequired {
                partner: self.partner(partner)?.name.clone(),
                variants,
            }),
        }
    }

    /// Maps a webhook name of the form `"{Partner} for {Organization}"` (or
    /// just `"{Partner}"`) to a known partner, ignoring case.
    pub fn resolve_webhook_name(&self, webhook_name: &str) -> Option<&str> {
        let partner_part = webhook_name
            .split(" for ")
            .next()
            .unwrap_or(webhook_name)
            .trim();

        self.partners
            .values()
            .find(|p| p.name.eq_ignore_ascii_case(partner_part))
            .map(|p| p.name.as_str())
    }

    /// Loads every variant and returns the failures, including partners
    /// without any variant.
    pub fn validate_all(&self) -> Vec<(String, Option<String>, AppError)> {
        let mut failures = Vec::new();
        for entry in self.partners.values() {
            if entry.variants.is_empty() {
                failures.push((
                    entry.name.clone(),
                    None,
                    AppError::NoVariants {
                        partner: entry.name.clone(),
                    },
                ));
                continue;
            }
            for variant in entry.variants.keys() {
                if let Err(e) = self.load_schema(&entry.name, variant) {
                    failures.push((entry.name.clone(), Some(variant.clone()), e));
                }
            }
        }
        failures
    }

    /// Saves an edited payload as an all-static custom variant of `partner`
    /// and returns the written path. The registry itself is not modified;
    /// reload to see the new variant.
    pub fn save_custom_schema(&self, partner: &str, name: &str, payload: &Value) -> Result<PathBuf> {
        let entry = self.partner(partner)?;
        let fields = payload.as_object().ok_or_else(|| {
            AppError::validation("custom schema payload must be a JSON object")
        })?;

        let file_slug = slug(name);
        if file_slug.trim_matches('_').is_empty() {
            return Err(AppError::validation("custom schema name must not be empty"));
        }

        let variant = variant_name(&format!("{}_schema", file_slug), &entry.name);
        if let Some(existing) = entry.variants.get(&variant) {
            if !existing.custom {
                return Err(AppError::validation(format!(
                    "variant '{}' already ships with partner '{}'",
                    variant, entry.name
                )));
            }
        }

        let definition: Map<String, Value> = fields
            .iter()
            .map(|(key, value)| (key.clone(), SchemaNode::definition_from_payload(value)))
            .collect();

        let path = entry
            .dir
            .join(CUSTOM_SCHEMAS_DIR)
            .join(format!("{}{}", file_slug, SCHEMA_SUFFIX));
        write_json_atomic(&path, &definition)?;

        StructuredLogger::log_info(
            &format!("Saved custom schema '{}' for {}", variant, entry.name),
            None,
            None,
            Some(serde_json::json!({ "path": path.display().to_string() })),
        );

        Ok(path)
    }
}

/// Derives a variant name from a schema file stem:
/// `zillow_simple_schema` -> `simple`, `hubspot_schema` -> `default`,
/// `mortgage_schema` -> `mortgage`.
pub fn variant_name(file_stem: &str, partner: &str) -> String {
    let base = file_stem.strip_suffix("_schema").unwrap_or(file_stem);
    let prefix = format!("{}_", partner.to_lowercase());

    let remaining = if base.to_lowercase().starts_with(&prefix) {
        base.get(prefix.len()..).unwrap_or("")
    } else if base.eq_ignore_ascii_case(partner) {
        ""
    } else {
        base
    };

    if remaining.is_empty() {
        DEFAULT_VARIANT.to_string()
    } else {
        remaining.to_string()
    }
}

fn collect_variants(
    dir: &Path,
    partner: &str,
    custom: bool,
    variants: &mut BTreeMap<String, VariantEntry>,
) -> Result<()> {
    for path in sorted_entries(dir)? {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !path.is_file() || !file_name.ends_with(SCHEMA_SUFFIX) {
            continue;
        }

        let stem = file_name.trim_end_matches(".json");
        let name = variant_name(stem, partner);
        if let Some(existing) = variants.get(&name) {
            return Err(AppError::configuration(format!(
                "Partner '{}' defines variant '{}' twice: {} and {}",
                partner,
                name,
                existing.path.display(),
                path.display()
            )));
        }

        variants.insert(
            name.clone(),
            VariantEntry {
                name,
                path,
                custom,
            },
        );
    }
    Ok(())
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

fn visible_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(sorted_entries(dir)?
        .into_iter()
        .filter(|path| path.is_dir())
        .filter(|path| !dir_name(path).starts_with('.'))
        .filter(|path| dir_name(path) != CUSTOM_SCHEMAS_DIR)
        .collect())
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
