use std::path::PathBuf;

use serde_json::Value;

use crate::models::{DeliveryResult, Organization, Prospect, Webhook};
use crate::providers::StructuredLogger;
use crate::services::data_store::DataStore;
use crate::services::payload_generator::{ContactFactory, PayloadGenerator};
use crate::services::schema_registry::{SchemaRegistry, VariantSelection};
use crate::services::webhook_sender::WebhookSender;
use crate::utils::error::{AppError, Result};
use crate::utils::pretty_json;

/// A freshly generated contact that has not been accepted by any endpoint
/// yet, with the counter value it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingProspect {
    pub index: u64,
    pub prospect: Prospect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub result: DeliveryResult,
    /// True when a pending prospect was saved because of this send.
    pub confirmed: bool,
}

/// State of one manual send session: which organization, webhook, variant
/// and prospect are selected, and the payload text about to be sent.
/// Selecting something higher up clears everything below it.
pub struct TestSession {
    store: DataStore,
    registry: SchemaRegistry,
    sender: WebhookSender,
    organization: Option<Organization>,
    contacts: Option<ContactFactory>,
    webhook: Option<Webhook>,
    partner: Option<String>,
    variants: Vec<String>,
    variant: Option<String>,
    pending: Option<PendingProspect>,
    selected: Option<Prospect>,
    payload: Option<String>,
}

impl TestSession {
    pub fn new(store: DataStore, registry: SchemaRegistry, sender: WebhookSender) -> Self {
        Self {
            store,
            registry,
            sender,
            organization: None,
            contacts: None,
            webhook: None,
            partner: None,
            variants: Vec::new(),
            variant: None,
            pending: None,
            selected: None,
            payload: None,
        }
    }

    pub fn store(&self) -> &DataStore {
        &self.store
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn organization(&self) -> Option<&Organization> {
        self.organization.as_ref()
    }

    pub fn webhook(&self) -> Option<&Webhook> {
        self.webhook.as_ref()
    }

    pub fn partner(&self) -> Option<&str> {
        self.partner.as_deref()
    }

    pub fn variants(&self) -> &[String] {
        &self.variants
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn pending_prospect(&self) -> Option<&PendingProspect> {
        self.pending.as_ref()
    }

    pub fn selected_prospect(&self) -> Option<&Prospect> {
        self.selected.as_ref()
    }

    /// The prospect a payload would be generated for.
    pub fn current_prospect(&self) -> Option<&Prospect> {
        self.selected
            .as_ref()
            .or_else(|| self.pending.as_ref().map(|p| &p.prospect))
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn existing_prospects(&self) -> Result<Vec<Prospect>> {
        Ok(self.store.existing_prospects(&self.require_organization()?.id)?)
    }

    /// Rescans the schema tree, keeping the current selection when it still
    /// exists.
    pub fn reload_schemas(&mut self) -> Result<()> {
        self.registry = self.registry.reload()?;
        if let Some(partner) = self.partner.clone() {
            self.variants = self.registry.list_variants(&partner)?;
            if let Some(variant) = &self.variant {
                if !self.variants.contains(variant) {
                    self.variant = None;
                }
            }
        }
        Ok(())
    }

    pub fn select_organization(&mut self, org_id: &str) -> Result<&Organization> {
        let organization = self.store.organization(org_id)?;
        let first_index = self.store.next_prospect_index(org_id)?;

        self.contacts = Some(ContactFactory::for_organization(&organization.id, first_index));
        self.clear_from_webhook();
        Ok(self.organization.insert(organization))
    }

    /// Selects a webhook of the current organization and resolves its
    /// partner. A partner with one variant gets it selected right away.
    pub fn select_webhook(&mut self, webhook_name: &str) -> Result<VariantSelection> {
        let webhook = self
            .require_organization()?
            .webhook(webhook_name)
            .cloned()
            .ok_or_else(|| AppError::validation(format!("webhook not found: {}", webhook_name)))?;
        let partner = self
            .registry
            .resolve_webhook_name(&webhook.name)
            .ok_or_else(|| AppError::PartnerNotFound {
                partner: webhook.name.clone(),
            })?
            .to_string();
        let selection = self.registry.variant_selection(&partner)?;

        self.clear_from_webhook();
        self.variants = match &selection {
            VariantSelection::Single(only) => {
                self.variant = Some(only.clone());
                vec![only.clone()]
            }
            VariantSelection::Choice(names) => names.clone(),
        };
        self.webhook = Some(webhook);
        self.partner = Some(partner);
        Ok(selection)
    }

    pub fn select_variant(&mut self, variant: &str) -> Result<()> {
        let partner = self.require_partner()?;
        if !self.variants.iter().any(|v| v == variant) {
            return Err(AppError::SchemaNotFound {
                partner: partner.to_string(),
                variant: variant.to_string(),
            });
        }
        self.variant = Some(variant.to_string());
        self.payload = None;
        Ok(())
    }

    /// Creates a pending prospect. It is only stored once a send for it is
    /// answered with 200.
    pub fn generate_new_prospect(&mut self) -> Result<Prospect> {
        self.require_organization()?;
        let contacts = self
            .contacts
            .as_ref()
            .ok_or_else(|| AppError::validation("no organization selected"))?;

        let (index, prospect) = contacts.next_contact();
        self.pending = Some(PendingProspect {
            index,
            prospect: prospect.clone(),
        });
        self.selected = None;
        self.payload = None;
        Ok(prospect)
    }

    /// Picks an already confirmed prospect by email.
    pub fn select_prospect(&mut self, email: &str) -> Result<Prospect> {
        let prospect = self
            .existing_prospects()?
            .into_iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .ok_or_else(|| AppError::validation(format!("prospect not found: {}", email)))?;

        self.selected = Some(prospect.clone());
        self.pending = None;
        self.payload = None;
        Ok(prospect)
    }

    /// Renders the selected variant for the current prospect and keeps the
    /// pretty-printed text for review.
    pub fn generate_payload(&mut self) -> Result<String> {
        let partner = self.require_partner()?;
        let prospect = self
            .current_prospect()
            .ok_or_else(|| AppError::validation("no prospect available for payload generation"))?;

        let schema = self.registry.resolve_schema(partner, self.variant.as_deref())?;
        let payload = pretty_json(&PayloadGenerator::generate(&schema, prospect)?)?;
        self.payload = Some(payload.clone());
        Ok(payload)
    }

    /// Replaces the payload text. Invalid JSON is kept as typed.
    pub fn edit_payload(&mut self, text: impl Into<String>) -> Result<()> {
        if self.payload.is_none() {
            return Err(AppError::validation("no payload generated yet"));
        }
        self.payload = Some(text.into());
        Ok(())
    }

    /// Posts the payload text to the selected webhook. Only an exact 200
    /// confirms a pending prospect; any other answer leaves it pending.
    pub async fn send_payload(&mut self) -> Result<SendOutcome> {
        let webhook = self
            .webhook
            .as_ref()
            .ok_or_else(|| AppError::validation("no webhook selected"))?;
        let payload = self
            .payload
            .as_deref()
            .ok_or_else(|| AppError::validation("no payload generated yet"))?;

        let result = self.sender.send(&webhook.url, payload).await?;

        let mut confirmed = false;
        if result.is_accepted() {
            if let (Some(pending), Some(organization)) = (&self.pending, &self.organization) {
                // false when the store already holds this email
                confirmed = self
                    .store
                    .confirm_prospect(&organization.id, &pending.prospect, pending.index)?;
            }
            self.pending = None;
        } else {
            StructuredLogger::log_warning(
                &format!(
                    "Send to {} returned {}; prospect not saved",
                    webhook.url, result.status_code
                ),
                None,
                None,
            );
        }

        Ok(SendOutcome { result, confirmed })
    }

    /// Saves the current payload as an all-static variant of the selected
    /// partner and makes it selectable.
    pub fn save_custom_schema(&mut self, name: &str) -> Result<PathBuf> {
        let partner = self.require_partner()?.to_string();
        let text = self
            .payload
            .as_deref()
            .ok_or_else(|| AppError::validation("no payload generated yet"))?;
        let payload: Value = serde_json::from_str(text).map_err(|e| {
            AppError::validation(format!("payload is not valid JSON: {}", e))
        })?;

        let path = self.registry.save_custom_schema(&partner, name, &payload)?;
        self.reload_schemas()?;
        Ok(path)
    }

    fn require_organization(&self) -> Result<&Organization> {
        self.organization
            .as_ref()
            .ok_or_else(|| AppError::validation("no organization selected"))
    }

    fn require_partner(&self) -> Result<&str> {
        self.partner
            .as_deref()
            .ok_or_else(|| AppError::validation("no webhook selected"))
    }

    fn clear_from_webhook(&mut self) {
        self.webhook = None;
        self.partner = None;
        self.variants.clear();
        self.variant = None;
        self.pending = None;
        self.selected = None;
        self.payload = None;
    }
}
