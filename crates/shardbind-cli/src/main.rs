//! shardbind CLI - Command-line interface
//!
//! A REPL that binds statements and prints their contexts.

use anyhow::{Context, Result};
use clap::Parser;
use shardbind::rule::ShardingRule;
use shardbind::{DatabaseType, EngineConfig, Outcome, PreparedStatement, ShardingBinder, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

/// Bind SQL statements against a sharding rule and print what a router sees
#[derive(Debug, Parser)]
#[command(name = "shardbind", version)]
struct Args {
    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQL dialect: mysql, postgresql or generic
    #[arg(long)]
    dialect: Option<DatabaseType>,

    /// Database unqualified table names belong to
    #[arg(short, long)]
    database: Option<String>,

    /// Log filter, overrides RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("shardbind: error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let filter = match &args.log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(dialect) = args.dialect {
        config = config.with_database_type(dialect);
    }
    if let Some(database) = args.database {
        config = config.with_database(database);
    }
    let engine = ShardingBinder::new(config).context("building the binder")?;
    tracing::debug!(
        dialect = %engine.database_type(),
        rules = engine.rules().table_names().len(),
        "binder ready"
    );

    println!("shardbind v{}", env!("CARGO_PKG_VERSION"));
    println!("Type .help for help, .quit to exit");
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut multi_line_buffer = String::new();
    let mut last: Option<PreparedStatement> = None;

    loop {
        // Show different prompt for multi-line input
        if multi_line_buffer.is_empty() {
            print!("shardbind> ");
        } else {
            print!("        -> ");
        }
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        multi_line_buffer.push_str(line.trim_end());

        // Statements end with a semicolon, dot commands with the line
        if !multi_line_buffer.trim().ends_with(';') && !multi_line_buffer.trim().starts_with('.') {
            if !multi_line_buffer.trim().is_empty() {
                multi_line_buffer.push(' ');
            }
            continue;
        }

        let input = multi_line_buffer.trim().to_string();
        multi_line_buffer.clear();

        if input.starts_with('.') {
            if !handle_dot_command(&engine, &input, last.as_ref()) {
                break;
            }
            continue;
        }

        let sql = input.trim_end_matches(';').trim();
        match engine.execute(sql) {
            Ok(Outcome::Registered(table)) => println!("Registered {}", table),
            Ok(Outcome::Prepared(prepared)) => {
                print!("{}", prepared.context());
                if prepared.parameter_count() > 0 {
                    println!(
                        "  {} parameter(s), bind with .params",
                        prepared.parameter_count()
                    );
                }
                last = Some(prepared);
            }
            Err(e) => eprintln!("Error: {}", e),
        }
        println!();
    }

    println!("Goodbye!");
    Ok(())
}

/// Returns false when the REPL should stop
fn handle_dot_command(engine: &ShardingBinder, input: &str, last: Option<&PreparedStatement>) -> bool {
    let (command, rest) = input
        .split_once(char::is_whitespace)
        .map_or((input, ""), |(c, r)| (c, r.trim()));

    match command {
        ".quit" | ".exit" | ".q" => return false,

        ".help" | ".h" => {
            println!("Statements end with ';'. CREATE TABLE registers metadata,");
            println!("anything else is bound and its context printed.");
            println!();
            println!("Available commands:");
            println!("  .help              Show this help message");
            println!("  .quit              Exit the CLI");
            println!("  .tables            List tables of the current database");
            println!("  .rules             List sharding rules");
            println!("  .params v1,v2,...  Rebind the last statement with parameters");
        }

        ".tables" => {
            let Some(database) = engine.current_database() else {
                eprintln!("No database selected, start with --database");
                return true;
            };
            match engine.catalog().get_schema(database) {
                Some(schema) if !schema.list_tables().is_empty() => {
                    for table in schema.list_tables() {
                        println!("  {}", table);
                    }
                }
                _ => println!("No tables found."),
            }
        }

        ".rules" => {
            let rules = engine.rules();
            let tables = rules.table_names();
            if tables.is_empty() {
                println!("No sharding rules.");
            }
            for table in tables {
                let mut line = format!("  {} by {}", table, rules.sharding_columns(&table).join(", "));
                if let Some(key) = rules.generated_key_column(&table) {
                    line.push_str(&format!(", generated key {}", key));
                }
                if let Some(group) = rules.binding_group(&table) {
                    line.push_str(&format!(", bound with {}", group.join(", ")));
                }
                println!("{}", line);
            }
        }

        ".params" => {
            let Some(prepared) = last else {
                eprintln!("No statement to bind.");
                return true;
            };
            let parameters: Vec<Value> = rest
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(parse_parameter)
                .collect();
            match prepared.bind(&parameters) {
                Ok(context) => print!("{}", context),
                Err(e) => eprintln!("Error: {}", e),
            }
        }

        _ => {
            eprintln!("Unknown command: {}", command);
            eprintln!("Type .help for available commands.");
        }
    }
    println!();
    true
}

/// A parameter as typed: a quoted string, NULL, a boolean or a number.
/// Anything else is taken as a bare string.
fn parse_parameter(text: &str) -> Value {
    if let Some(inner) = text
        .strip_prefix('\'')
        .and_then(|t| t.strip_suffix('\''))
    {
        return Value::Varchar(inner.to_string());
    }
    if text.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    if let Ok(b) = text.to_ascii_lowercase().parse::<bool>() {
        return Value::Boolean(b);
    }
    if let Ok(i) = text.parse::<i64>() {
        return match i32::try_from(i) {
            Ok(small) => Value::Integer(small),
            Err(_) => Value::BigInt(i),
        };
    }
    match text.parse::<f64>() {
        Ok(f) => Value::Double(f),
        Err(_) => Value::Varchar(text.to_string()),
    }
}
