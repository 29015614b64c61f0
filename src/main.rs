use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use tracing::info;

use webhook_testkit::{
    config::{AppConfig, HarnessConfig, HarnessOverrides},
    models::{Organization, Webhook},
    providers::StructuredLogger,
    services::{
        DataStore, HealthStatus, IntegrationHarness, RunOptions, SchemaRegistry, TestSession,
        VariantSelection, WebhookSender,
    },
    utils::{new_organization_id, new_test_run_id, pretty_json},
};

fn cli() -> Command {
    let org_arg = || {
        Arg::new("org")
            .long("org")
            .required(true)
            .help("Organization id")
    };
    let harness_config_arg = || {
        Arg::new("config")
            .long("config")
            .required(true)
            .help("Path to the harness YAML file")
    };
    let payload_args = |command: Command| {
        command
            .arg(org_arg())
            .arg(
                Arg::new("webhook")
                    .long("webhook")
                    .required(true)
                    .help("Webhook name, e.g. \"Zillow for Acme\""),
            )
            .arg(
                Arg::new("variant")
                    .long("variant")
                    .help("Schema variant; required when the partner has several"),
            )
            .arg(
                Arg::new("prospect")
                    .long("prospect")
                    .help("Email of a saved prospect to reuse instead of generating one"),
            )
    };

    Command::new("webhook-testkit")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Generate, send and verify partner webhook payloads")
        .subcommand_required(true)
        .arg(
            Arg::new("app-config")
                .long("app-config")
                .global(true)
                .default_value("config.yaml")
                .help("Application config file (optional on disk)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("error, warn, info, debug or trace"),
        )
        .subcommand(
            Command::new("schemas")
                .about("Inspect the schema registry")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List categories, partners and variants"))
                .subcommand(
                    Command::new("variants")
                        .about("List the variants of one partner")
                        .arg(Arg::new("partner").long("partner").required(true)),
                )
                .subcommand(Command::new("check").about("Load every schema and report failures")),
        )
        .subcommand(
            Command::new("orgs")
                .about("Manage organizations")
                .subcommand_required(true)
                .subcommand(Command::new("list").about("List organizations and their webhooks"))
                .subcommand(
                    Command::new("add")
                        .about("Add an organization")
                        .arg(Arg::new("id").long("id").help("Defaults to a generated id"))
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("owner-id").long("owner-id")),
                )
                .subcommand(
                    Command::new("update")
                        .about("Rename an organization or change its owner")
                        .arg(Arg::new("id").long("id").required(true))
                        .arg(Arg::new("name").long("name"))
                        .arg(Arg::new("owner-id").long("owner-id")),
                )
                .subcommand(
                    Command::new("delete")
                        .about("Delete an organization with its webhooks and prospects")
                        .arg(Arg::new("id").long("id").required(true)),
                ),
        )
        .subcommand(
            Command::new("webhooks")
                .about("Manage the webhooks of an organization")
                .subcommand_required(true)
                .subcommand(
                    Command::new("add")
                        .arg(org_arg())
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(Arg::new("url").long("url").required(true)),
                )
                .subcommand(
                    Command::new("delete")
                        .arg(org_arg())
                        .arg(Arg::new("name").long("name").required(true)),
                ),
        )
        .subcommand(
            Command::new("prospects")
                .about("Confirmed prospects")
                .subcommand_required(true)
                .subcommand(Command::new("list").arg(org_arg())),
        )
        .subcommand(payload_args(
            Command::new("generate").about("Print the payload a send would post"),
        ))
        .subcommand(
            payload_args(Command::new("send").about("Generate a payload and post it")).arg(
                Arg::new("payload-file")
                    .long("payload-file")
                    .help("Send this file's text instead of the generated payload"),
            ),
        )
        .subcommand(
            Command::new("bulk")
                .about("Run the bulk integration harness")
                .arg(harness_config_arg())
                .arg(
                    Arg::new("test-records")
                        .long("test-records")
                        .value_parser(value_parser!(usize))
                        .help("Override the number of records"),
                )
                .arg(
                    Arg::new("processing-delay")
                        .long("processing-delay")
                        .value_parser(value_parser!(u64))
                        .help("Override the wait before validation, in seconds"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Build and check payloads without sending anything"),
                )
                .arg(
                    Arg::new("superuser")
                        .long("superuser")
                        .action(ArgAction::SetTrue)
                        .help("Use the superuser endpoint and payload schema"),
                ),
        )
        .subcommand(
            Command::new("health")
                .about("Check the webhook endpoint and API access")
                .arg(harness_config_arg())
                .arg(
                    Arg::new("test-data-hours")
                        .long("test-data-hours")
                        .default_value("24")
                        .value_parser(value_parser!(u32))
                        .help("Window for counting recent test records"),
                )
                .arg(
                    Arg::new("no-test-data")
                        .long("no-test-data")
                        .action(ArgAction::SetTrue)
                        .help("Skip the recent test data check"),
                ),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let app_config_path = string_arg(&matches, "app-config").unwrap_or_else(|| "config.yaml".to_string());
    let config = AppConfig::load_from(&app_config_path)?;
    let level = string_arg(&matches, "log-level").unwrap_or_else(|| "info".to_string());
    StructuredLogger::init(&level, Some(config.logger.clone()))?;

    info!("Starting webhook-testkit");

    let exit_code = match matches.subcommand() {
        Some(("schemas", args)) => run_schemas(&config, args)?,
        Some(("orgs", args)) => run_orgs(&config, args)?,
        Some(("webhooks", args)) => run_webhooks(&config, args)?,
        Some(("prospects", args)) => run_prospects(&config, args)?,
        Some(("generate", args)) => run_generate(&config, args)?,
        Some(("send", args)) => run_send(&config, args).await?,
        Some(("bulk", args)) => run_bulk(&config, args).await?,
        Some(("health", args)) => run_health(&config, args).await?,
        _ => 2,
    };

    std::process::exit(exit_code);
}

fn string_arg(args: &ArgMatches, name: &str) -> Option<String> {
    args.get_one::<String>(name).cloned()
}

fn required_arg(args: &ArgMatches, name: &str) -> Result<String> {
    string_arg(args, name).with_context(|| format!("missing --{}", name))
}

fn run_schemas(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let registry = SchemaRegistry::load(&config.storage.schemas_dir)?;

    match args.subcommand() {
        Some(("list", _)) => {
            for category in registry.list_categories() {
                println!("{}", category);
                for partner in registry.partners_in_category(category) {
                    let variants = registry.list_variants(partner).unwrap_or_default();
                    println!("  {}: {}", partner, variants.join(", "));
                }
            }
            Ok(0)
        }
        Some(("variants", sub)) => {
            let partner = required_arg(sub, "partner")?;
            match registry.variant_selection(&partner)? {
                VariantSelection::Single(only) => println!("{} (only variant)", only),
                VariantSelection::Choice(names) => {
                    for name in names {
                        println!("{}", name);
                    }
                }
            }
            Ok(0)
        }
        Some(("check", _)) => {
            let failures = registry.validate_all();
            for (partner, variant, error) in &failures {
                println!(
                    "FAIL {}/{}: {}",
                    partner,
                    variant.as_deref().unwrap_or("-"),
                    error
                );
            }
            println!(
                "{} partners checked, {} failures",
                registry.list_partners().len(),
                failures.len()
            );
            Ok(if failures.is_empty() { 0 } else { 1 })
        }
        _ => Ok(2),
    }
}

fn run_orgs(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let store = DataStore::open(&config.storage.data_dir)?;

    match args.subcommand() {
        Some(("list", _)) => {
            for org in store.organizations()? {
                println!("{}  {}  owner={}", org.id, org.name, org.owner_id);
                for webhook in &org.webhooks {
                    println!("    {} -> {}", webhook.name, webhook.url);
                }
            }
        }
        Some(("add", sub)) => {
            let organization = Organization {
                id: string_arg(sub, "id").unwrap_or_else(new_organization_id),
                name: required_arg(sub, "name")?,
                owner_id: string_arg(sub, "owner-id").unwrap_or_default(),
                webhooks: Vec::new(),
            };
            let id = organization.id.clone();
            store.add_organization(organization)?;
            println!("{}", id);
        }
        Some(("update", sub)) => {
            let id = required_arg(sub, "id")?;
            let name = string_arg(sub, "name");
            let owner_id = string_arg(sub, "owner-id");
            let updated = store.update_organization(&id, name.as_deref(), owner_id.as_deref())?;
            println!("{}  {}  owner={}", updated.id, updated.name, updated.owner_id);
        }
        Some(("delete", sub)) => {
            store.delete_organization(&required_arg(sub, "id")?)?;
        }
        _ => return Ok(2),
    }
    Ok(0)
}

fn run_webhooks(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let store = DataStore::open(&config.storage.data_dir)?;

    match args.subcommand() {
        Some(("add", sub)) => {
            let webhook = Webhook {
                name: required_arg(sub, "name")?,
                url: required_arg(sub, "url")?,
            };
            store.add_webhook(&required_arg(sub, "org")?, webhook)?;
        }
        Some(("delete", sub)) => {
            store.delete_webhook(&required_arg(sub, "org")?, &required_arg(sub, "name")?)?;
        }
        _ => return Ok(2),
    }
    Ok(0)
}

fn run_prospects(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let store = DataStore::open(&config.storage.data_dir)?;

    match args.subcommand() {
        Some(("list", sub)) => {
            let org_id = required_arg(sub, "org")?;
            for prospect in store.existing_prospects(&org_id)? {
                println!(
                    "{} {}  {}  {}",
                    prospect.first_name, prospect.last_name, prospect.email, prospect.phone
                );
            }
            Ok(0)
        }
        _ => Ok(2),
    }
}

fn open_session(config: &AppConfig) -> Result<TestSession> {
    let store = DataStore::open(&config.storage.data_dir)?;
    let registry = SchemaRegistry::load(&config.storage.schemas_dir)?;
    let sender = WebhookSender::new(&config.webclient)?;
    Ok(TestSession::new(store, registry, sender))
}

/// Walks a session through organization, webhook, variant and prospect
/// selection and generates the payload.
fn prepare_payload(session: &mut TestSession, args: &ArgMatches) -> Result<String> {
    session.select_organization(&required_arg(args, "org")?)?;
    if let VariantSelection::Choice(_) = session.select_webhook(&required_arg(args, "webhook")?)? {
        if let Some(variant) = string_arg(args, "variant") {
            session.select_variant(&variant)?;
        }
    }
    match string_arg(args, "prospect") {
        Some(email) => {
            session.select_prospect(&email)?;
        }
        None => {
            session.generate_new_prospect()?;
        }
    }
    Ok(session.generate_payload()?)
}

fn run_generate(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let mut session = open_session(config)?;
    println!("{}", prepare_payload(&mut session, args)?);
    Ok(0)
}

async fn run_send(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let mut session = open_session(config)?;
    prepare_payload(&mut session, args)?;

    if let Some(path) = string_arg(args, "payload-file") {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading payload file {}", path))?;
        session.edit_payload(text)?;
    }

    let outcome = session.send_payload().await?;
    println!("Status: {}", outcome.result.status_code);
    println!("Elapsed: {:.3}s", outcome.result.elapsed.as_secs_f64());
    println!("Response: {}", outcome.result.body);
    if outcome.confirmed {
        println!("Prospect saved.");
    }
    Ok(if outcome.result.is_success() { 0 } else { 1 })
}

fn load_harness_config(
    config: &AppConfig,
    args: &ArgMatches,
    overrides: HarnessOverrides,
) -> Result<HarnessConfig> {
    let mut harness_config = HarnessConfig::from_file(required_arg(args, "config")?)?;
    harness_config.apply_overrides(&HarnessOverrides {
        reports_dir: Some(config.storage.reports_dir.clone()),
        ..overrides
    })?;
    Ok(harness_config)
}

async fn run_bulk(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let harness_config = load_harness_config(
        config,
        args,
        HarnessOverrides {
            test_records: args.get_one::<usize>("test-records").copied(),
            processing_delay: args.get_one::<u64>("processing-delay").copied(),
            ..HarnessOverrides::default()
        },
    )?;

    let harness = IntegrationHarness::new(harness_config)?;
    let report = harness
        .run(RunOptions {
            dry_run: args.get_flag("dry-run"),
            superuser: args.get_flag("superuser"),
        })
        .await?;

    println!("{}", pretty_json(&serde_json::to_value(&report)?)?);
    Ok(if report.passed() { 0 } else { 1 })
}

async fn run_health(config: &AppConfig, args: &ArgMatches) -> Result<i32> {
    let harness_config = load_harness_config(config, args, HarnessOverrides::default())?;
    let harness = IntegrationHarness::new(harness_config)?;
    let hours = if args.get_flag("no-test-data") {
        None
    } else {
        args.get_one::<u32>("test-data-hours").copied()
    };

    let report = harness.health_check(hours).await;
    report.write_to(&harness.health_report_path(&new_test_run_id()))?;

    println!("{}", pretty_json(&serde_json::to_value(&report)?)?);
    Ok(match report.overall_status {
        HealthStatus::Healthy => 0,
        _ => 1,
    })
}
