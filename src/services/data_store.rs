use std::path::{Path, PathBuf};

use serde_json::Value;
use url::Url;

use crate::models::{GeneratedProspects, Organization, Prospect, Webhook};
use crate::providers::StructuredLogger;
use crate::utils::error::{AppError, Result};
use crate::utils::write_json_atomic;

pub const ORG_WEBHOOKS_FILE: &str = "org_webhooks.json";
pub const GENERATED_PROSPECTS_FILE: &str = "generated_prospects.json";

/// JSON file store for organizations, their webhooks and confirmed
/// prospects. Every read goes to disk and every write replaces the whole
/// file atomically; one local user and one process are assumed.
#[derive(Debug, Clone)]
pub struct DataStore {
    org_webhooks_file: PathBuf,
    generated_prospects_file: PathBuf,
}

impl DataStore {
    /// Opens the store in `base_dir`, creating empty files when missing.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir)?;

        let store = Self {
            org_webhooks_file: base_dir.join(ORG_WEBHOOKS_FILE),
            generated_prospects_file: base_dir.join(GENERATED_PROSPECTS_FILE),
        };

        if !store.org_webhooks_file.exists() {
            write_json_atomic(&store.org_webhooks_file, &Vec::<Organization>::new())?;
        }
        if !store.generated_prospects_file.exists() {
            write_json_atomic(&store.generated_prospects_file, &GeneratedProspects::default())?;
        }

        Ok(store)
    }

    pub fn org_webhooks_file(&self) -> &Path {
        &self.org_webhooks_file
    }

    pub fn generated_prospects_file(&self) -> &Path {
        &self.generated_prospects_file
    }

    /// Accepts both a bare list and the older `{"organizations": [...]}`
    /// wrapper; entries that are not objects are skipped.
    pub fn organizations(&self) -> Result<Vec<Organization>> {
        let raw: Value = self.read_json(&self.org_webhooks_file)?;
        let entries = match raw {
            Value::Array(entries) => entries,
            Value::Object(mut wrapper) => match wrapper.remove("organizations") {
                Some(Value::Array(entries)) => entries,
                _ => {
                    return Err(AppError::store(format!(
                        "{} must hold a list of organizations",
                        self.org_webhooks_file.display()
                    )))
                }
            },
            _ => {
                return Err(AppError::store(format!(
                    "{} must hold a list of organizations",
                    self.org_webhooks_file.display()
                )))
            }
        };

        let mut organizations = Vec::with_capacity(entries.len());
        for entry in entries {
            if !entry.is_object() {
                StructuredLogger::log_warning(
                    &format!("Skipping malformed organization entry: {}", entry),
                    None,
                    None,
                );
                continue;
            }
            organizations.push(serde_json::from_value(entry)?);
        }
        Ok(organizations)
    }

    pub fn organization(&self, org_id: &str) -> Result<Organization> {
        self.organizations()?
            .into_iter()
            .find(|org| org.id == org_id)
            .ok_or_else(|| AppError::store(format!("organization not found: {}", org_id)))
    }

    pub fn save_organizations(&self, organizations: &[Organization]) -> Result<()> {
        write_json_atomic(&self.org_webhooks_file, organizations)
    }

    pub fn add_organization(&self, organization: Organization) -> Result<()> {
        if organization.id.trim().is_empty() || organization.name.trim().is_empty() {
            return Err(AppError::validation("organization id and name must not be empty"));
        }

        let mut organizations = self.organizations()?;
        if organizations.iter().any(|org| org.id == organization.id) {
            return Err(AppError::store(format!(
                "organization already exists: {}",
                organization.id
            )));
        }

        StructuredLogger::log_info(
            &format!("Adding organization {}", organization.name),
            None,
            None,
            Some(serde_json::json!({ "org_id": organization.id })),
        );
        organizations.push(organization);
        self.save_organizations(&organizations)
    }

    /// Changes name and/or owner; fields left as `None` are kept.
    pub fn update_organization(
        &self,
        org_id: &str,
        name: Option<&str>,
        owner_id: Option<&str>,
    ) -> Result<Organization> {
        let mut organizations = self.organizations()?;
        let organization = organizations
            .iter_mut()
            .find(|org| org.id == org_id)
            .ok_or_else(|| AppError::store(format!("organization not found: {}", org_id)))?;

        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err(AppError::validation("organization name must not be empty"));
            }
            organization.name = name.to_string();
        }
        if let Some(owner_id) = owner_id {
            organization.owner_id = owner_id.to_string();
        }

        let updated = organization.clone();
        self.save_organizations(&organizations)?;
        Ok(updated)
    }

    /// Removes the organization together with its confirmed prospects.
    pub fn delete_organization(&self, org_id: &str) -> Result<()> {
        let mut organizations = self.organizations()?;
        let before = organizations.len();
        organizations.retain(|org| org.id != org_id);
        if organizations.len() == before {
            return Err(AppError::store(format!("organization not found: {}", org_id)));
        }
        self.save_organizations(&organizations)?;

        let mut data = self.prospects_data()?;
        if data.data.remove(org_id).is_some() {
            write_json_atomic(&self.generated_prospects_file, &data)?;
        }
        StructuredLogger::log_info(
            &format!("Deleted organization {}", org_id),
            None,
            None,
            None,
        );
        Ok(())
    }

    pub fn add_webhook(&self, org_id: &str, webhook: Webhook) -> Result<()> {
        let url = Url::parse(&webhook.url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::validation(format!(
                "webhook URL must be http(s): {}",
                webhook.url
            )));
        }

        let mut organizations = self.organizations()?;
        let organization = organizations
            .iter_mut()
            .find(|org| org.id == org_id)
            .ok_or_else(|| AppError::store(format!("organization not found: {}", org_id)))?;

        if organization.webhook(&webhook.name).is_some() {
            return Err(AppError::store(format!(
                "webhook '{}' already exists for {}",
                webhook.name, organization.name
            )));
        }

        organization.webhooks.push(webhook);
        self.save_organizations(&organizations)
    }

    pub fn delete_webhook(&self, org_id: &str, webhook_name: &str) -> Result<()> {
        let mut organizations = self.organizations()?;
        let organization = organizations
            .iter_mut()
            .find(|org| org.id == org_id)
            .ok_or_else(|| AppError::store(format!("organization not found: {}", org_id)))?;

        let before = organization.webhooks.len();
        organization.webhooks.retain(|w| w.name != webhook_name);
        if organization.webhooks.len() == before {
            return Err(AppError::store(format!(
                "webhook '{}' not found for {}",
                webhook_name, organization.name
            )));
        }

        self.save_organizations(&organizations)
    }

    pub fn prospects_data(&self) -> Result<GeneratedProspects> {
        self.read_json(&self.generated_prospects_file)
    }

    pub fn existing_prospects(&self, org_id: &str) -> Result<Vec<Prospect>> {
        Ok(self
            .prospects_data()?
            .for_org(org_id)
            .map(|p| p.prospects.clone())
            .unwrap_or_default())
    }

    pub fn next_prospect_index(&self, org_id: &str) -> Result<u64> {
        Ok(self
            .prospects_data()?
            .for_org(org_id)
            .map(|p| p.next_prospect_index)
            .unwrap_or(1))
    }

    /// Records a prospect whose send was accepted. Returns `false` when a
    /// prospect with the same email is already stored; the file is then left
    /// unchanged. `used_index` is the counter value the prospect was built
    /// from, so the next one starts after it.
    pub fn confirm_prospect(&self, org_id: &str, prospect: &Prospect, used_index: u64) -> Result<bool> {
        let mut data = self.prospects_data()?;
        let org_prospects = data.for_org_mut(org_id);

        if org_prospects
            .prospects
            .iter()
            .any(|p| p.email.eq_ignore_ascii_case(&prospect.email))
        {
            return Ok(false);
        }

        org_prospects.prospects.push(prospect.clone());
        org_prospects.next_prospect_index = org_prospects.next_prospect_index.max(used_index + 1);
        write_json_atomic(&self.generated_prospects_file, &data)?;

        StructuredLogger::log_info(
            &format!("Confirmed prospect {}", prospect.email),
            None,
            None,
            Some(serde_json::json!({ "org_id": org_id })),
        );
        Ok(true)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            AppError::store(format!("failed to parse {}: {}", path.display(), e))
        })
    }
}
