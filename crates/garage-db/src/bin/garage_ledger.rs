//! # Ledger Query Tool
//!
//! Read-only command line access to the ledger's query surface. Every
//! command prints JSON to stdout; failures print an `ErrorReport` to stderr.
//!
//! ## Usage
//! ```bash
//! cargo run -p garage-db --bin garage-ledger -- --company co-1 outstanding <INVOICE_ID>
//! cargo run -p garage-db --bin garage-ledger -- --company co-1 history <INVOICE_ID>
//! cargo run -p garage-db --bin garage-ledger -- --company co-1 deps job <JOB_ID>
//! cargo run -p garage-db --bin garage-ledger -- --db ./garage.db migrations
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use garage_core::{EntityKind, RequestContext};
use garage_db::migrations::migration_status;
use garage_db::telemetry::init_tracing;
use garage_db::{Database, LedgerConfig, LedgerError, LedgerResult, LedgerService};
use serde::Serialize;

fn print_help() {
    println!("Garage Ledger Query Tool");
    println!();
    println!("Usage: garage-ledger [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  outstanding <INVOICE_ID>              Settlement of an invoice");
    println!("  history <INVOICE_ID>                  Payment rows and audit events");
    println!("  deps <invoice|job|purchase> <ID>      Cancellation/deletion report");
    println!("  migrations                            Applied schema migrations");
    println!();
    println!("Options:");
    println!("  --config <PATH>     Config file (default: platform config dir)");
    println!("  -d, --db <PATH>     Database file path (overrides config)");
    println!("  --company <ID>      Company the query runs for");
    println!("  --branch <ID>       Branch of the request context");
    println!("  -h, --help          Show this help message");
}

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    db_path: Option<PathBuf>,
    company: Option<String>,
    branch: Option<String>,
    command: Vec<String>,
}

fn parse_args() -> Option<Args> {
    let argv: Vec<String> = env::args().collect();
    let mut args = Args::default();

    let mut i = 1;
    while i < argv.len() {
        match argv[i].as_str() {
            "--config" if i + 1 < argv.len() => {
                args.config = Some(PathBuf::from(&argv[i + 1]));
                i += 1;
            }
            "--db" | "-d" if i + 1 < argv.len() => {
                args.db_path = Some(PathBuf::from(&argv[i + 1]));
                i += 1;
            }
            "--company" if i + 1 < argv.len() => {
                args.company = Some(argv[i + 1].clone());
                i += 1;
            }
            "--branch" if i + 1 < argv.len() => {
                args.branch = Some(argv[i + 1].clone());
                i += 1;
            }
            "--help" | "-h" => return None,
            other => args.command.push(other.to_string()),
        }
        i += 1;
    }

    Some(args)
}

fn print_json<T: Serialize>(value: &T) -> LedgerResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(garage_db::DbError::from)?;
    println!("{json}");
    Ok(())
}

fn context(args: &Args) -> LedgerResult<RequestContext> {
    let company = args.company.clone().ok_or_else(|| {
        LedgerError::from(garage_core::ValidationError::Required {
            field: "--company".to_string(),
        })
    })?;
    let branch = args.branch.clone().unwrap_or_default();
    Ok(RequestContext::new(company, branch, "garage-ledger-cli"))
}

async fn run(args: Args) -> LedgerResult<()> {
    let mut config = LedgerConfig::load(args.config.clone())?;
    if let Some(path) = &args.db_path {
        config.database.path = path.clone();
    }

    let db = Database::new(config.database.db_config()).await?;
    let ledger = LedgerService::new(db, &config);

    let command: Vec<&str> = args.command.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["outstanding", invoice_id] => {
            let settlement = ledger.outstanding(&context(&args)?, invoice_id).await?;
            print_json(&settlement)
        }
        ["history", invoice_id] => {
            let history = ledger.payment_history(&context(&args)?, invoice_id).await?;
            print_json(&history)
        }
        ["deps", kind, entity_id] => {
            let kind: EntityKind = kind.parse()?;
            let report = ledger.dependency_report(&context(&args)?, kind, entity_id).await?;
            print_json(&report)
        }
        ["migrations"] => {
            let status = migration_status(ledger.db().pool()).await?;
            print_json(&status)
        }
        _ => {
            print_help();
            Err(garage_core::ValidationError::Required {
                field: "command".to_string(),
            }
            .into())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let Some(args) = parse_args() else {
        print_help();
        return ExitCode::SUCCESS;
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let report = e.report();
            match serde_json::to_string(&report) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{report}"),
            }
            ExitCode::FAILURE
        }
    }
}
