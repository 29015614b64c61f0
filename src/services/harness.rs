use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::{HarnessConfig, TestUser};
use crate::models::{AssignmentCheck, DeliveryOutcome, ProspectRecord, Schema, TestRecord};
use crate::providers::StructuredLogger;
use crate::services::bulk_delivery::{percent, BulkDelivery, DeliveryReport, DeliveryStats};
use crate::services::test_data_factory::{RecordValidation, TestDataFactory};
use crate::services::validation_client::{RuleResult, ValidationClient};
use crate::services::webhook_sender::{EndpointHealth, WebhookDelivery, WebhookSender};
use crate::utils::error::Result;
use crate::utils::{new_test_run_id, slug, write_json_atomic};

/// How far back the API is asked for records of a run.
const LOOKBACK_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Build, validate and export records but send nothing.
    pub dry_run: bool,
    /// Use the superuser endpoint and payload schema.
    pub superuser: bool,
}

/// Everything decided before the first request goes out.
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub run_id: String,
    pub pattern: String,
    pub superuser: bool,
    pub records: Vec<TestRecord>,
    pub validation: RecordValidation,
    pub records_file: PathBuf,
}

impl TestPlan {
    pub fn records_for(&self, user: &TestUser) -> usize {
        self.records
            .iter()
            .filter(|r| r.user_email == user.email)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentMismatch {
    pub prospect_id: i64,
    pub prospect_name: String,
    pub actual_user_email: String,
    pub actual_user_id: i64,
    pub actual_team_id: i64,
    pub check: AssignmentCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleFailure {
    pub prospect_id: i64,
    pub results: Vec<RuleResult>,
}

/// What the API returned for one test user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserValidation {
    pub name: String,
    pub email: String,
    pub user_id: i64,
    pub team_id: i64,
    pub expected_count: usize,
    pub found_count: usize,
    pub correct_assignments: usize,
    pub correct_mappings: usize,
    pub assignment_mismatches: Vec<AssignmentMismatch>,
    pub rule_failures: Vec<RuleFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UserValidation {
    fn new(user: &TestUser, expected_count: usize) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            user_id: user.user_id,
            team_id: user.team_id,
            expected_count,
            found_count: 0,
            correct_assignments: 0,
            correct_mappings: 0,
            assignment_mismatches: Vec::new(),
            rule_failures: Vec::new(),
            error: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessReport {
    pub test_name: String,
    pub integration_type: String,
    pub run_id: String,
    pub dry_run: bool,
    pub superuser: bool,
    pub generated_at: DateTime<Utc>,
    pub record_validation: RecordValidation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<DeliveryReport>,
    #[serde(default)]
    pub users: Vec<UserValidation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_rate: Option<f64>,
    /// Threshold violations; empty means the run passed.
    pub failures: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<PathBuf>,
}

impl HarnessReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Partial,
    Unhealthy,
}

impl HealthStatus {
    fn from_counts(ok: usize, total: usize) -> Self {
        if ok == total && total > 0 {
            Self::Healthy
        } else if ok > 0 {
            Self::Partial
        } else {
            Self::Unhealthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccess {
    pub user_id: i64,
    pub email: String,
    pub accessible: bool,
    pub prospect_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConnectivity {
    pub status: HealthStatus,
    pub users_accessible: usize,
    pub total_users: usize,
    pub user_details: Vec<UserAccess>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentTestData {
    pub hours_back: u32,
    pub cutoff_time: String,
    pub total_test_prospects: usize,
    /// Matches per user email; users whose lookup failed are absent.
    pub user_breakdown: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub integration_type: String,
    pub test_name: String,
    pub check_timestamp: DateTime<Utc>,
    pub overall_status: HealthStatus,
    pub webhook_health: EndpointHealth,
    pub api_connectivity: ApiConnectivity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recent_test_data: Option<RecentTestData>,
}

impl HealthReport {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        StructuredLogger::log_info(
            &format!("Health report saved to {}", path.display()),
            None,
            None,
            None,
        );
        Ok(())
    }
}

/// Drives a bulk run: plan, deliver, wait, query the API per user and
/// compare rates against the configured thresholds.
pub struct IntegrationHarness {
    config: HarnessConfig,
    sender: WebhookSender,
    delivery: BulkDelivery,
    validation: ValidationClient,
}

impl IntegrationHarness {
    pub fn new(config: HarnessConfig) -> Result<Self> {
        let sender = WebhookSender::new(&config.webhook_settings)?;
        let transport: Arc<dyn WebhookDelivery> = Arc::new(sender.clone());
        Self::with_transport(config, transport)
    }

    /// Same as [`new`](Self::new) but delivering through `transport`.
    pub fn with_transport(config: HarnessConfig, transport: Arc<dyn WebhookDelivery>) -> Result<Self> {
        let sender = WebhookSender::new(&config.webhook_settings)?;
        let delivery = BulkDelivery::new(transport, config.webhook_settings.clone());
        let validation = ValidationClient::from_harness(&config)?;

        Ok(Self {
            config,
            sender,
            delivery,
            validation,
        })
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn plan(&self, superuser: bool) -> Result<TestPlan> {
        let run_id = if superuser {
            format!("{}_SU", new_test_run_id())
        } else {
            new_test_run_id()
        };
        self.plan_with_run_id(&run_id, superuser)
    }

    /// Generates, checks and exports the records of run `run_id`.
    pub fn plan_with_run_id(&self, run_id: &str, superuser: bool) -> Result<TestPlan> {
        let schema = Schema::standalone(self.config.schema_path(superuser))?;
        let factory = TestDataFactory::new(self.config.clone(), schema);

        let records = factory.generate_test_records(run_id)?;
        let validation = factory.validate_records(&records);
        let records_file = self.report_path("test_records", run_id);
        factory.export_records(&records, run_id, &records_file)?;

        Ok(TestPlan {
            run_id: run_id.to_string(),
            pattern: self.config.test_pattern(run_id),
            superuser,
            records,
            validation,
            records_file,
        })
    }

    pub async fn run(&self, options: RunOptions) -> Result<HarnessReport> {
        let plan = self.plan(options.superuser)?;
        self.execute(plan, options.dry_run).await
    }

    /// Carries out a prepared plan. A dry run, or a plan whose records
    /// failed validation, stops before any request is made.
    pub async fn execute(&self, plan: TestPlan, dry_run: bool) -> Result<HarnessReport> {
        let run_id = plan.run_id.as_str();
        let mut report = HarnessReport {
            test_name: self.config.test_name.clone(),
            integration_type: self.config.integration_type.clone(),
            run_id: plan.run_id.clone(),
            dry_run,
            superuser: plan.superuser,
            generated_at: Utc::now(),
            record_validation: plan.validation.clone(),
            delivery: None,
            users: Vec::new(),
            success_rate: None,
            creation_rate: None,
            assignment_rate: None,
            mapping_rate: None,
            failures: Vec::new(),
            report_file: None,
        };

        if !plan.validation.is_valid() {
            report.failures.push(format!(
                "test records failed validation: {}",
                describe_validation(&plan.validation)
            ));
        }
        if dry_run || !report.failures.is_empty() {
            StructuredLogger::log_info(
                &format!("Stopping before delivery of {} records", plan.records.len()),
                Some(run_id),
                None,
                Some(serde_json::json!({ "dry_run": dry_run, "records_file": plan.records_file.display().to_string() })),
            );
            return self.finish(report);
        }

        let started_at = Utc::now();
        let url = self.config.delivery_url(plan.superuser);
        let outcomes = self.delivery.deliver_all(url, &plan.records, Some(run_id)).await?;
        self.record_delivery(&mut report, &outcomes)?;

        if self.config.processing_delay > 0 {
            StructuredLogger::log_info(
                &format!("Waiting {}s for webhook processing", self.config.processing_delay),
                Some(run_id),
                None,
                None,
            );
            sleep(Duration::from_secs(self.config.processing_delay)).await;
        }

        let created_after = (started_at - chrono::Duration::hours(LOOKBACK_HOURS))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        for user in &self.config.test_users {
            let expected = plan.records_for(user);
            if expected == 0 {
                continue;
            }
            let validation = self
                .validate_user(user, expected, &plan.pattern, &created_after, run_id)
                .await;
            report.users.push(validation);
        }
        self.score_validation(&mut report);

        self.finish(report)
    }

    fn record_delivery(&self, report: &mut HarnessReport, outcomes: &[DeliveryOutcome]) -> Result<()> {
        let stats = DeliveryStats::from_outcomes(outcomes);
        let delivery_report = DeliveryReport::from_outcomes(outcomes);
        delivery_report.write_to(&self.report_path("delivery_report", &report.run_id))?;

        StructuredLogger::log_info(
            &format!(
                "Webhook delivery: {}/{} successful ({:.1}%)",
                stats.successful, stats.total_sent, stats.success_rate
            ),
            Some(&report.run_id),
            None,
            None,
        );
        if stats.success_rate < self.config.min_success_rate {
            report.failures.push(format!(
                "webhook success rate too low: {:.1}% (minimum: {}%)",
                stats.success_rate, self.config.min_success_rate
            ));
        }

        report.success_rate = Some(stats.success_rate);
        report.delivery = Some(delivery_report);
        Ok(())
    }

    async fn validate_user(
        &self,
        user: &TestUser,
        expected: usize,
        pattern: &str,
        created_after: &str,
        run_id: &str,
    ) -> UserValidation {
        let mut result = UserValidation::new(user, expected);
        let prospects = match self
            .validation
            .find_test_prospects(user.user_id, pattern, Some(created_after))
            .await
        {
            Ok(prospects) => prospects,
            Err(e) => {
                StructuredLogger::log_error(
                    &format!("Failed to validate prospects for {}: {}", user.email, e),
                    Some(run_id),
                    None,
                );
                result.error = Some(e.to_string());
                return result;
            }
        };

        result.found_count = prospects.len();
        for prospect in &prospects {
            self.check_prospect(&mut result, prospect, user);
        }

        StructuredLogger::log_info(
            &format!(
                "Found {}/{} test prospects for {}",
                result.found_count, expected, user.email
            ),
            Some(run_id),
            None,
            None,
        );
        result
    }

    fn check_prospect(&self, result: &mut UserValidation, prospect: &ProspectRecord, user: &TestUser) {
        let check = ValidationClient::validate_assignment(prospect, user);
        if check.is_correct() {
            result.correct_assignments += 1;
        } else {
            result.assignment_mismatches.push(AssignmentMismatch {
                prospect_id: prospect.id,
                prospect_name: display_name(prospect),
                actual_user_email: prospect.assigned_user.email.clone(),
                actual_user_id: prospect.assigned_user.id,
                actual_team_id: prospect.business_entity_id,
                check,
            });
        }

        let rules = ValidationClient::evaluate_rules(prospect, &self.config.validation_rules, user);
        if rules.iter().all(|r| r.passed) {
            result.correct_mappings += 1;
        } else {
            result.rule_failures.push(RuleFailure {
                prospect_id: prospect.id,
                results: rules,
            });
        }
    }

    fn score_validation(&self, report: &mut HarnessReport) {
        let expected: usize = report.users.iter().map(|u| u.expected_count).sum();
        let found: usize = report
            .users
            .iter()
            .map(|u| u.found_count.min(u.expected_count))
            .sum();
        let examined: usize = report.users.iter().map(|u| u.found_count).sum();
        let assigned: usize = report.users.iter().map(|u| u.correct_assignments).sum();
        let mapped: usize = report.users.iter().map(|u| u.correct_mappings).sum();

        let creation_rate = percent(found, expected);
        let assignment_rate = percent(assigned, examined);
        let mapping_rate = percent(mapped, examined);

        StructuredLogger::log_info(
            &format!(
                "Prospect creation: {}/{} found ({:.1}%), assignment accuracy {:.1}%",
                found, expected, creation_rate, assignment_rate
            ),
            Some(&report.run_id),
            None,
            None,
        );

        for (name, rate, minimum) in [
            ("prospect creation rate", creation_rate, self.config.min_creation_rate),
            ("user assignment accuracy", assignment_rate, self.config.min_assignment_rate),
        ] {
            if rate < minimum {
                report
                    .failures
                    .push(format!("{} too low: {:.1}% (minimum: {}%)", name, rate, minimum));
            }
        }
        if !self.config.validation_rules.is_empty() && mapping_rate < self.config.min_mapping_rate {
            report.failures.push(format!(
                "data mapping accuracy too low: {:.1}% (minimum: {}%)",
                mapping_rate, self.config.min_mapping_rate
            ));
        }

        report.creation_rate = Some(creation_rate);
        report.assignment_rate = Some(assignment_rate);
        if !self.config.validation_rules.is_empty() {
            report.mapping_rate = Some(mapping_rate);
        }
    }

    fn finish(&self, mut report: HarnessReport) -> Result<HarnessReport> {
        let path = self.report_path("integration_report", &report.run_id);
        report.report_file = Some(path.clone());
        write_json_atomic(&path, &report)?;

        if report.passed() {
            StructuredLogger::log_info(
                &format!("Integration run {} passed", report.run_id),
                Some(&report.run_id),
                None,
                Some(serde_json::json!({ "report_file": path.display().to_string() })),
            );
        } else {
            for failure in &report.failures {
                StructuredLogger::log_error(failure, Some(&report.run_id), None);
            }
        }
        Ok(report)
    }

    /// Probes the webhook endpoint and the API on behalf of every test
    /// user. With `test_data_hours`, also counts this integration's test
    /// records created in that window.
    pub async fn health_check(&self, test_data_hours: Option<u32>) -> HealthReport {
        StructuredLogger::log_info(
            &format!("Starting integration health check for {}", self.config.integration_type),
            None,
            None,
            None,
        );

        let webhook_health = self.sender.check_endpoint(&self.config.webhook_url).await;

        let mut user_details = Vec::with_capacity(self.config.test_users.len());
        for user in &self.config.test_users {
            let access = match self.validation.fetch_prospects(user.user_id, None).await {
                Ok(prospects) => UserAccess {
                    user_id: user.user_id,
                    email: user.email.clone(),
                    accessible: true,
                    prospect_count: prospects.len(),
                    error: None,
                },
                Err(e) => UserAccess {
                    user_id: user.user_id,
                    email: user.email.clone(),
                    accessible: false,
                    prospect_count: 0,
                    error: Some(e.to_string()),
                },
            };
            user_details.push(access);
        }
        let users_accessible = user_details.iter().filter(|u| u.accessible).count();
        let api_connectivity = ApiConnectivity {
            status: HealthStatus::from_counts(users_accessible, user_details.len()),
            users_accessible,
            total_users: user_details.len(),
            user_details,
        };

        let recent_test_data = match test_data_hours {
            Some(hours) => Some(self.recent_test_data(hours).await),
            None => None,
        };

        let healthy_checks = usize::from(webhook_health.endpoint_reachable)
            + usize::from(api_connectivity.status == HealthStatus::Healthy);
        let report = HealthReport {
            integration_type: self.config.integration_type.clone(),
            test_name: self.config.test_name.clone(),
            check_timestamp: Utc::now(),
            overall_status: HealthStatus::from_counts(healthy_checks, 2),
            webhook_health,
            api_connectivity,
            recent_test_data,
        };

        StructuredLogger::log_info(
            "Integration health check completed",
            None,
            None,
            Some(serde_json::json!({ "overall_status": report.overall_status })),
        );
        report
    }

    async fn recent_test_data(&self, hours: u32) -> RecentTestData {
        let cutoff_time = (Utc::now() - chrono::Duration::hours(i64::from(hours)))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let pattern = self.config.integration_pattern();

        let mut user_breakdown = Vec::new();
        for user in &self.config.test_users {
            match self
                .validation
                .find_test_prospects(user.user_id, &pattern, Some(&cutoff_time))
                .await
            {
                Ok(found) => user_breakdown.push((user.email.clone(), found.len())),
                Err(e) => StructuredLogger::log_error(
                    &format!("Error checking test data for {}: {}", user.email, e),
                    None,
                    None,
                ),
            }
        }

        RecentTestData {
            hours_back: hours,
            cutoff_time,
            total_test_prospects: user_breakdown.iter().map(|(_, n)| n).sum(),
            user_breakdown,
        }
    }

    pub fn health_report_path(&self, timestamp: &str) -> PathBuf {
        self.config.reports_dir().join(format!(
            "health_check_{}_{}.json",
            slug(&self.config.integration_type),
            timestamp
        ))
    }

    fn report_path(&self, kind: &str, run_id: &str) -> PathBuf {
        self.config.reports_dir().join(format!(
            "{}_{}_{}.json",
            slug(&self.config.integration_type),
            kind,
            run_id
        ))
    }
}

fn display_name(prospect: &ProspectRecord) -> String {
    if prospect.full_name.is_empty() {
        format!("{} {}", prospect.first_name, prospect.last_name)
    } else {
        prospect.full_name.clone()
    }
}

fn describe_validation(validation: &RecordValidation) -> String {
    let mut problems = Vec::new();
    if !validation.records_match {
        problems.push(format!(
            "expected {} records, got {}",
            validation.expected_records, validation.total_records
        ));
    }
    if !validation.emails_unique {
        problems.push("emails are not unique".to_string());
    }
    if !validation.record_ids_unique {
        problems.push("record ids are not unique".to_string());
    }
    problems.extend(validation.validation_errors.iter().cloned());
    problems.join("; ")
}
