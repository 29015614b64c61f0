pub mod bulk_delivery;
pub mod data_store;
pub mod harness;
pub mod payload_generator;
pub mod schema_registry;
pub mod session;
pub mod test_data_factory;
pub mod validation_client;
pub mod webhook_sender;

pub use bulk_delivery::{BulkDelivery, DeliveryReport, DeliveryStats};
pub use data_store::DataStore;
pub use harness::{HarnessReport, HealthReport, HealthStatus, IntegrationHarness, RunOptions, TestPlan};
pub use payload_generator::{ContactFactory, GenerationContext, PayloadGenerator};
pub use schema_registry::{SchemaRegistry, VariantSelection};
pub use session::{PendingProspect, SendOutcome, TestSession};
pub use test_data_factory::{distribute, RecordValidation, TestDataFactory};
pub use validation_client::{RuleResult, ValidationClient};
pub use webhook_sender::{EndpointHealth, WebhookDelivery, WebhookSender};
