use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use cloudwarden::config::Config;
use cloudwarden::error::WardenError;
use cloudwarden::model::{ComplianceFramework, ExecutionContext, Resource, ServiceFamily, Severity};
use cloudwarden::output::OutputFormat;
use cloudwarden::provider::{CloudProviders, CloudSnapshot};
use cloudwarden::RulesEngine;

#[derive(Parser)]
#[command(
    name = "cloudwarden",
    about = "Cloud compliance rules engine",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a resource inventory against a captured account snapshot
    Scan {
        /// Resource inventory JSON file
        #[arg(long, short = 'i')]
        inventory: PathBuf,

        /// Account snapshot JSON file
        #[arg(long, short = 's')]
        snapshot: PathBuf,

        /// Config file path (defaults to .cloudwarden.toml)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Tenant identifier for the run
        #[arg(long, default_value = "default")]
        tenant: String,

        /// Output format (console, json)
        #[arg(long, short = 'f', default_value = "console")]
        format: String,

        /// Minimum finding severity for a non-zero exit code
        #[arg(long)]
        fail_on: Option<String>,

        /// Write output to file instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List all registered compliance rules
    ListRules {
        /// Output format (table, json)
        #[arg(long, short = 'f', default_value = "table")]
        format: String,

        /// Only rules for one service (s3, iam, ec2, cloudtrail)
        #[arg(long)]
        service: Option<String>,

        /// Only rules mapped to one framework (soc2, cis, nist, ...)
        #[arg(long)]
        framework: Option<String>,
    },

    /// Generate a starter .cloudwarden.toml config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Scan {
            inventory,
            snapshot,
            config,
            tenant,
            format,
            fail_on,
            output,
        } => cmd_scan(inventory, snapshot, config, tenant, format, fail_on, output).await,
        Commands::ListRules {
            format,
            service,
            framework,
        } => cmd_list_rules(format, service, framework),
        Commands::Init { force } => cmd_init(force),
    };

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

async fn cmd_scan(
    inventory_path: PathBuf,
    snapshot_path: PathBuf,
    config_path: Option<PathBuf>,
    tenant: String,
    format_str: String,
    fail_on_str: Option<String>,
    output_path: Option<PathBuf>,
) -> Result<i32, WardenError> {
    let format = OutputFormat::from_str_lenient(&format_str).unwrap_or_else(|| {
        eprintln!("Warning: unknown format '{}', using console", format_str);
        OutputFormat::Console
    });

    let config_file = config_path.unwrap_or_else(|| PathBuf::from(".cloudwarden.toml"));
    let config = Config::load(&config_file)?;

    let fail_on = fail_on_str
        .and_then(|s| {
            let sev = Severity::from_str_lenient(&s);
            if sev.is_none() {
                eprintln!("Warning: unknown severity '{}', using config default", s);
            }
            sev
        })
        .unwrap_or(config.fail_on);

    let resources: Vec<Resource> = serde_json::from_str(&std::fs::read_to_string(&inventory_path)?)
        .map_err(|e| WardenError::Inventory(format!("{}: {e}", inventory_path.display())))?;
    let snapshot = CloudSnapshot::from_json(&std::fs::read_to_string(&snapshot_path)?)
        .map_err(|e| WardenError::Inventory(format!("{}: {e}", snapshot_path.display())))?;

    let account_id = resources
        .first()
        .map(|r| r.account_id.clone())
        .unwrap_or_default();
    let region = resources
        .first()
        .map(|r| r.region.clone())
        .unwrap_or_else(|| "us-east-1".into());
    let mut context = ExecutionContext::new(tenant, account_id, region);
    context.scan_id = Some(uuid::Uuid::new_v4().to_string());

    let mut engine = RulesEngine::new(CloudProviders::from_snapshot(snapshot));
    let report = engine
        .execute_rules(&resources, &context, &config.engine)
        .await;
    let rendered = cloudwarden::render_report(&report, format)?;

    match output_path {
        Some(out) => std::fs::write(&out, &rendered)?,
        None => print!("{}", rendered),
    }

    // Exit code: 0 = clean, 1 = findings at or above threshold
    let breached = report
        .results
        .iter()
        .flat_map(|a| a.findings.iter())
        .any(|f| f.severity >= fail_on);
    Ok(if breached { 1 } else { 0 })
}

fn cmd_list_rules(
    format_str: String,
    service_str: Option<String>,
    framework_str: Option<String>,
) -> Result<i32, WardenError> {
    let engine = RulesEngine::new(CloudProviders::from_snapshot(CloudSnapshot::default()));

    let rules = if let Some(s) = service_str {
        let service = ServiceFamily::from_str_lenient(&s)
            .ok_or_else(|| WardenError::Config(format!("unknown service '{s}'")))?;
        engine.rules_for_service(service)
    } else if let Some(f) = framework_str {
        let framework = ComplianceFramework::from_str_lenient(&f)
            .ok_or_else(|| WardenError::Config(format!("unknown framework '{f}'")))?;
        engine.rules_for_framework(framework)
    } else {
        engine.all_rules()
    };

    match format_str.as_str() {
        "json" => {
            let json = serde_json::to_string_pretty(&rules)?;
            println!("{}", json);
        }
        _ => {
            println!(
                "{:<10} {:<30} {:<10} {:<12} FRAMEWORKS",
                "ID", "NAME", "SEVERITY", "SERVICE"
            );
            println!("{}", "-".repeat(84));
            for rule in &rules {
                let frameworks: Vec<&str> =
                    rule.frameworks.iter().map(|f| f.as_str()).collect();
                println!(
                    "{:<10} {:<30} {:<10} {:<12} {}",
                    rule.id,
                    rule.name,
                    rule.severity.to_string(),
                    rule.service.to_string(),
                    frameworks.join(", "),
                );
            }
        }
    }

    Ok(0)
}

fn cmd_init(force: bool) -> Result<i32, WardenError> {
    let path = PathBuf::from(".cloudwarden.toml");

    if path.exists() && !force {
        eprintln!(".cloudwarden.toml already exists. Use --force to overwrite.");
        return Ok(1);
    }

    std::fs::write(&path, Config::starter_toml())?;
    println!("Created .cloudwarden.toml");

    Ok(0)
}
