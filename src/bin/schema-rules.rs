//! Schema Rules CLI
//!
//! Command-line interface for enriching OpenAPI documents with validator
//! constraints.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use schema_rules::{
    document_dialect, enrich_document, load_document, load_manifest, NamingPolicy, RuleSet,
    SchemaBuilder, SchemaDialect,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-rules")]
#[command(about = "Project validation rules onto OpenAPI schemas")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enrich a document's component schemas with validator constraints
    Enrich {
        /// OpenAPI document (JSON)
        document: PathBuf,

        /// Validator manifest (JSON)
        #[arg(long)]
        validators: PathBuf,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Schema dialect: 2.0, 3.0 or 3.1 (default: detect from the document)
        #[arg(long)]
        dialect: Option<String>,

        /// Property naming policy: as-is, camel, snake or kebab
        #[arg(long)]
        naming: Option<String>,

        /// Overwrite `pattern` instead of collecting several patterns in allOf
        #[arg(long)]
        no_all_of: bool,

        /// Leave nullability alone when a rule forces a minimum length
        #[arg(long)]
        keep_nullable: bool,

        /// Log every applied rule to stderr
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the default rules in evaluation order
    Rules,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Enrich {
            document,
            validators,
            output,
            pretty,
            dialect,
            naming,
            no_all_of,
            keep_nullable,
            verbose,
        } => {
            init_logging(verbose);
            run_enrich(EnrichArgs {
                document,
                validators,
                output,
                pretty,
                dialect,
                naming,
                no_all_of,
                keep_nullable,
            })
        }

        Commands::Rules => run_rules(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Logs go to stderr so stdout stays valid JSON.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

struct EnrichArgs {
    document: PathBuf,
    validators: PathBuf,
    output: Option<PathBuf>,
    pretty: bool,
    dialect: Option<String>,
    naming: Option<String>,
    no_all_of: bool,
    keep_nullable: bool,
}

fn run_enrich(args: EnrichArgs) -> Result<(), u8> {
    let manifest = load_manifest(&args.validators).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let mut document = load_document(&args.document).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    // Flags override the manifest's options
    let mut options = manifest.options.clone();
    if let Some(name) = &args.dialect {
        let dialect = SchemaDialect::parse(name).ok_or_else(|| {
            eprintln!("Error: unknown dialect '{}' (expected 2.0, 3.0 or 3.1)", name);
            2u8
        })?;
        options.dialect = Some(dialect);
    }
    if let Some(name) = &args.naming {
        options.naming_policy = NamingPolicy::parse(name).ok_or_else(|| {
            eprintln!(
                "Error: unknown naming policy '{}' (expected as-is, camel, snake or kebab)",
                name
            );
            2u8
        })?;
    }
    if args.no_all_of {
        options.use_all_of_for_multiple_rules = false;
    }
    if args.keep_nullable {
        options.set_not_nullable_if_min_length_greater_than_zero = false;
    }

    let dialect = document_dialect(&document, &options);
    let builder = SchemaBuilder::new(RuleSet::defaults(), options)
        .with_types(manifest.types.clone())
        .with_dialect(dialect);

    enrich_document(&mut document, &builder, &manifest.registry).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let json_output = if args.pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_rules() -> Result<(), u8> {
    for name in RuleSet::defaults().names() {
        println!("{}", name);
    }
    Ok(())
}
