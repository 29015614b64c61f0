use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Distribution, HarnessConfig, TestUser};
use crate::models::{Schema, TestRecord};
use crate::providers::StructuredLogger;
use crate::services::payload_generator::{ContactFactory, GenerationContext, PayloadGenerator};
use crate::utils::error::{AppError, Result};
use crate::utils::{is_present, record_id, write_json_atomic};

const FIRST_NAME_KEYS: [&str; 2] = ["first_name", "firstName"];
const EMAIL_KEYS: [&str; 2] = ["lo_email", "email"];

/// How many of `total` records each user gets, in user order.
///
/// * `even`: equal shares, the remainder going to the first users.
/// * `weighted`: proportional to `weight` (default 1), largest remainder
///   first, ties to the earlier user.
/// * `custom`: each user's explicit `count`, which must add up to `total`.
pub fn distribute(users: &[TestUser], total: usize, distribution: Distribution) -> Result<Vec<usize>> {
    if users.is_empty() {
        return Err(AppError::configuration("test_users must not be empty"));
    }

    match distribution {
        Distribution::Even => {
            let base = total / users.len();
            let remainder = total % users.len();
            Ok((0..users.len())
                .map(|i| base + usize::from(i < remainder))
                .collect())
        }
        Distribution::Weighted => {
            let weights: Vec<u64> = users.iter().map(|u| u64::from(u.weight.unwrap_or(1))).collect();
            let weight_total: u64 = weights.iter().sum();
            if weight_total == 0 {
                return Err(AppError::configuration(
                    "weighted distribution needs at least one non-zero weight",
                ));
            }

            let total = total as u64;
            let mut counts: Vec<usize> = weights
                .iter()
                .map(|w| (total * w / weight_total) as usize)
                .collect();
            let mut by_remainder: Vec<(usize, u64)> = weights
                .iter()
                .enumerate()
                .map(|(i, w)| (i, total * w % weight_total))
                .collect();
            by_remainder.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

            let assigned: usize = counts.iter().sum();
            for (i, _) in by_remainder.into_iter().take(total as usize - assigned) {
                counts[i] += 1;
            }
            Ok(counts)
        }
        Distribution::Custom => {
            let counts = users
                .iter()
                .map(|u| {
                    u.count.ok_or_else(|| {
                        AppError::configuration(format!(
                            "custom distribution needs a count for user {}",
                            u.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let sum: usize = counts.iter().sum();
            if sum != total {
                return Err(AppError::configuration(format!(
                    "custom counts add up to {} but test_records is {}",
                    sum, total
                )));
            }
            Ok(counts)
        }
    }
}

/// Pre-send checks over a planned batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordValidation {
    pub total_records: usize,
    pub expected_records: usize,
    pub records_match: bool,
    pub user_distribution: BTreeMap<String, usize>,
    pub emails_unique: bool,
    pub record_ids_unique: bool,
    pub validation_errors: Vec<String>,
}

impl RecordValidation {
    pub fn is_valid(&self) -> bool {
        self.records_match
            && self.emails_unique
            && self.record_ids_unique
            && self.validation_errors.is_empty()
    }
}

#[derive(Serialize)]
struct TestRunInfo<'a> {
    run_id: &'a str,
    integration_type: &'a str,
    test_name: &'a str,
    total_records: usize,
    users: &'a [TestUser],
    generated_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct RecordExport<'a> {
    test_run_info: TestRunInfo<'a>,
    test_records: &'a [TestRecord],
}

/// Builds the records of one bulk run from a harness config and its
/// payload schema.
pub struct TestDataFactory {
    config: HarnessConfig,
    schema: Schema,
}

impl TestDataFactory {
    pub fn new(config: HarnessConfig, schema: Schema) -> Self {
        Self { config, schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Records grouped by user in configuration order, numbered from 1.
    pub fn generate_test_records(&self, run_id: &str) -> Result<Vec<TestRecord>> {
        let counts = distribute(
            &self.config.test_users,
            self.config.test_records,
            self.config.distribution,
        )?;
        let contacts = ContactFactory::new(
            self.config.test_data_settings.clone(),
            self.config.contact_tag(run_id),
            1,
        );

        let mut records = Vec::with_capacity(self.config.test_records);
        for (user, count) in self.config.test_users.iter().zip(&counts) {
            for _ in 0..*count {
                let sequence_number = records.len() + 1;
                let id = record_id(run_id, sequence_number);
                let (_, contact) = contacts.next_contact();
                let payload = PayloadGenerator::generate_with(
                    &self.schema,
                    &GenerationContext::for_record(&contact, user, &id),
                )?;

                records.push(TestRecord {
                    record_id: id,
                    user_email: user.email.clone(),
                    user_id: user.user_id,
                    team_id: user.team_id,
                    sequence_number,
                    contact,
                    payload,
                });
            }
        }

        StructuredLogger::log_info(
            &format!(
                "Generated {} test records for {} users",
                records.len(),
                self.config.test_users.len()
            ),
            Some(run_id),
            None,
            Some(serde_json::json!({
                "distribution": self
                    .config
                    .test_users
                    .iter()
                    .zip(&counts)
                    .map(|(u, c)| (u.name.clone(), Value::from(*c)))
                    .collect::<serde_json::Map<String, Value>>(),
            })),
        );
        Ok(records)
    }

    pub fn validate_records(&self, records: &[TestRecord]) -> RecordValidation {
        let mut user_distribution: BTreeMap<String, usize> = self
            .config
            .test_users
            .iter()
            .map(|u| (u.email.clone(), 0))
            .collect();
        let mut emails = HashSet::new();
        let mut record_ids = HashSet::new();
        let mut validation_errors = Vec::new();

        for record in records {
            *user_distribution.entry(record.user_email.clone()).or_insert(0) += 1;
            emails.insert(record.contact.email.to_lowercase());
            record_ids.insert(record.record_id.as_str());

            let payload = &record.payload;
            if !payload.is_object() {
                validation_errors.push(format!("Payload is not an object in record {}", record.record_id));
                continue;
            }
            if !FIRST_NAME_KEYS.iter().any(|k| is_present(payload.get(*k))) {
                validation_errors.push(format!("Missing first_name in record {}", record.record_id));
            }
            if !EMAIL_KEYS.iter().any(|k| is_present(payload.get(*k))) {
                validation_errors.push(format!("Missing email field in record {}", record.record_id));
            }
            if payload.get("user_id").is_some() && !is_present(payload.get("user_id")) {
                validation_errors.push(format!("Missing user_id in record {}", record.record_id));
            }
        }

        let validation = RecordValidation {
            total_records: records.len(),
            expected_records: self.config.test_records,
            records_match: records.len() == self.config.test_records,
            user_distribution,
            emails_unique: emails.len() == records.len(),
            record_ids_unique: record_ids.len() == records.len(),
            validation_errors,
        };

        if validation.is_valid() {
            StructuredLogger::log_info("Test records validated", None, None, None);
        } else {
            StructuredLogger::log_warning(
                &format!(
                    "Test record validation found {} errors",
                    validation.validation_errors.len()
                ),
                None,
                None,
            );
        }
        validation
    }

    pub fn export_records(&self, records: &[TestRecord], run_id: &str, path: &Path) -> Result<()> {
        let export = RecordExport {
            test_run_info: TestRunInfo {
                run_id,
                integration_type: &self.config.integration_type,
                test_name: &self.config.test_name,
                total_records: records.len(),
                users: &self.config.test_users,
                generated_at: Utc::now(),
            },
            test_records: records,
        };
        write_json_atomic(path, &export)?;

        StructuredLogger::log_info(
            &format!("Exported {} test records to {}", records.len(), path.display()),
            Some(run_id),
            None,
            None,
        );
        Ok(())
    }
}
