use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub mod records;
pub mod schema;

pub use records::*;
pub use schema::*;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_id: String,
    #[serde(default)]
    pub webhooks: Vec<Webhook>,
}

impl Organization {
    pub fn webhook(&self, name: &str) -> Option<&Webhook> {
        self.webhooks.iter().find(|w| w.name == name)
    }
}

/// Contact data for one test lead. Field names follow the wire format used
/// by the stored JSON.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationProspects {
    #[serde(default = "first_prospect_index")]
    pub next_prospect_index: u64,
    #[serde(default)]
    pub prospects: Vec<Prospect>,
}

fn first_prospect_index() -> u64 {
    1
}

impl Default for OrganizationProspects {
    fn default() -> Self {
        Self {
            next_prospect_index: first_prospect_index(),
            prospects: Vec::new(),
        }
    }
}

/// Contents of `generated_prospects.json`, keyed by organization id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratedProspects {
    pub data: BTreeMap<String, OrganizationProspects>,
}

impl GeneratedProspects {
    pub fn for_org(&self, org_id: &str) -> Option<&OrganizationProspects> {
        self.data.get(org_id)
    }

    pub fn for_org_mut(&mut self, org_id: &str) -> &mut OrganizationProspects {
        self.data.entry(org_id.to_string()).or_default()
    }
}
