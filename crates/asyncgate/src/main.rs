//! asyncgate.
//!
//! Validates AsyncAPI documents, prints the routes they compile to, and
//! serves their publish operations over HTTP.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;

use asyncgate_compiler::{
    CompileError, CompileOptions, Registration, RouteCompiler, DEFAULT_CONFIG_FILE,
};
use asyncgate_router::App;
use asyncgate_spec_parser::{
    parse_spec_file, AsyncApiDocument, ParseError, CONTROLLER_EXTENSION,
};
use asyncgate_telemetry::{init_logging, log_listening, log_startup, LogFormat, TelemetryConfig};

mod server;

use server::Gateway;

#[derive(Parser, Debug)]
#[command(name = "asyncgate", about = "AsyncAPI validation gateway", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate AsyncAPI document(s) without registering routes.
    ///
    /// Reports document errors (E1000-E1004) and extension warnings.
    Validate {
        /// Input document(s) (YAML or JSON).
        #[arg(short, long, required = true, num_args = 1..)]
        spec: Vec<String>,

        /// Output format (text or json).
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Compile a document and print the route table.
    Routes {
        /// Input document (YAML or JSON).
        #[arg(short, long)]
        spec: String,

        #[command(flatten)]
        compile: CompileArgs,

        /// Output format (text or json).
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Compile a document and serve it.
    Serve {
        /// Input document (YAML or JSON).
        #[arg(short, long)]
        spec: String,

        #[command(flatten)]
        compile: CompileArgs,

        /// Listen address.
        #[arg(long, default_value = "0.0.0.0:8080")]
        listen: String,

        /// Enable development mode (violation details in error responses).
        #[arg(long)]
        dev: bool,

        /// Log level.
        #[arg(long, default_value = "info", env = "ASYNCGATE_LOG_LEVEL")]
        log_level: String,

        /// Log format (json or pretty).
        #[arg(long, default_value = "json")]
        log_format: String,
    },
}

/// Registration options. Flags override the option file.
#[derive(Args, Debug)]
struct CompileArgs {
    /// Option file (defaults to ./asyncgate.yaml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only register operations carrying this tag.
    #[arg(long)]
    tag: Option<String>,

    /// Base location of controllers.
    #[arg(long)]
    controllers: Option<String>,

    /// Replace unresolvable handlers with logging stubs.
    #[arg(long)]
    stub: bool,

    /// Register validation stages only.
    #[arg(long)]
    validate_only: bool,
}

impl CompileArgs {
    fn options(&self) -> Result<CompileOptions, CompileError> {
        let mut options = match &self.config {
            Some(path) => CompileOptions::load(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    CompileOptions::load(default)?
                } else {
                    CompileOptions::default()
                }
            }
        };

        if let Some(tag) = &self.tag {
            options.tag = Some(tag.clone());
        }
        if let Some(controllers) = &self.controllers {
            options.controllers = controllers.clone();
        }
        if self.stub {
            options.stub_middleware = true;
        }
        if self.validate_only {
            options.require_controller = false;
        }
        Ok(options)
    }
}

/// Validation result for a single document.
#[derive(serde::Serialize)]
struct ValidationResult {
    file: String,
    valid: bool,
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

#[derive(serde::Serialize)]
struct ValidationIssue {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

/// Extensions asyncgate understands.
const KNOWN_EXTENSIONS: &[&str] = &[CONTROLLER_EXTENSION];

/// Warnings for a document that parsed.
fn document_warnings(spec_path: &str, document: &AsyncApiDocument) -> Vec<ValidationIssue> {
    let mut warnings = Vec::new();

    for key in document.extensions.keys() {
        if !KNOWN_EXTENSIONS.contains(&key.as_str()) {
            warnings.push(ValidationIssue {
                code: "E1015".to_string(),
                message: format!("unknown extension: {}", key),
                location: Some(spec_path.to_string()),
            });
        }
    }

    for channel in &document.channels {
        let Some(operation) = &channel.publish else {
            continue;
        };
        let location = Some(format!("{}:{} publish", spec_path, channel.name));

        if operation.operation_id.is_none() {
            warnings.push(ValidationIssue {
                code: "E1021".to_string(),
                message: format!(
                    "publish operation on '{}' has no operationId and cannot be bound to a handler",
                    channel.name
                ),
                location: location.clone(),
            });
        }

        for key in operation.extensions.keys() {
            if !KNOWN_EXTENSIONS.contains(&key.as_str()) {
                warnings.push(ValidationIssue {
                    code: "E1015".to_string(),
                    message: format!("unknown extension: {}", key),
                    location: location.clone(),
                });
            }
        }
    }

    warnings
}

/// Errors for a document that failed to parse, one per validation issue.
fn parse_errors(spec_path: &str, err: &ParseError) -> Vec<ValidationIssue> {
    match err {
        ParseError::Validation { issues } => issues
            .iter()
            .map(|issue| ValidationIssue {
                code: err.code().to_string(),
                message: issue.message.clone(),
                location: Some(format!("{}:{}", spec_path, issue.location)),
            })
            .collect(),
        _ => vec![ValidationIssue {
            code: err.code().to_string(),
            message: err.to_string(),
            location: Some(spec_path.to_string()),
        }],
    }
}

/// Run the validate command.
fn run_validate(specs: &[String], output_format: &str) -> ExitCode {
    let mut results = Vec::new();

    for spec_path in specs {
        let path = Path::new(spec_path);

        if !path.exists() {
            results.push(ValidationResult {
                file: spec_path.clone(),
                valid: false,
                errors: vec![ValidationIssue {
                    code: "E1000".to_string(),
                    message: format!("file not found: {}", spec_path),
                    location: None,
                }],
                warnings: Vec::new(),
            });
            continue;
        }

        let result = match parse_spec_file(path) {
            Ok(document) => ValidationResult {
                file: spec_path.clone(),
                valid: true,
                errors: Vec::new(),
                warnings: document_warnings(spec_path, &document),
            },
            Err(e) => ValidationResult {
                file: spec_path.clone(),
                valid: false,
                errors: parse_errors(spec_path, &e),
                warnings: Vec::new(),
            },
        };
        results.push(result);
    }

    let has_errors = results.iter().any(|r| !r.valid);

    if output_format == "json" {
        let output = serde_json::json!({
            "results": results,
            "summary": {
                "total": results.len(),
                "valid": results.iter().filter(|r| r.valid).count(),
                "invalid": results.iter().filter(|r| !r.valid).count(),
            }
        });
        match serde_json::to_string_pretty(&output) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize results: {}", e);
                return ExitCode::from(1);
            }
        }
    } else {
        for result in &results {
            if result.valid && result.warnings.is_empty() {
                eprintln!("✓ {} is valid", result.file);
            } else if result.valid {
                eprintln!(
                    "✓ {} is valid (with {} warning(s))",
                    result.file,
                    result.warnings.len()
                );
            } else {
                eprintln!("✗ {} has {} error(s)", result.file, result.errors.len());
            }

            for err in &result.errors {
                match &err.location {
                    Some(loc) => eprintln!("  {} [{}]: {}", err.code, loc, err.message),
                    None => eprintln!("  {}: {}", err.code, err.message),
                }
            }

            for warn in &result.warnings {
                match &warn.location {
                    Some(loc) => eprintln!("  {} [{}]: {} (warning)", warn.code, loc, warn.message),
                    None => eprintln!("  {}: {} (warning)", warn.code, warn.message),
                }
            }
        }

        let valid_count = results.iter().filter(|r| r.valid).count();
        let total = results.len();
        eprintln!();
        eprintln!(
            "validated {} document(s): {} valid, {} invalid",
            total,
            valid_count,
            total - valid_count
        );
    }

    if has_errors {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// Build an `App` for `spec`. Handlers can only be stubbed here: the CLI
/// has no controllers of its own.
async fn compile_app(
    spec: &str,
    args: &CompileArgs,
    dev: bool,
) -> Result<(App, Registration), CompileError> {
    let compiler = RouteCompiler::new(args.options()?);
    let mut app = App::new().with_dev_mode(dev);
    let registration = compiler.register(&mut app, PathBuf::from(spec)).await?;
    Ok((app, registration))
}

fn report_compile_error(err: &CompileError) {
    eprintln!("error: {}: {}", err.code(), err);
    if let CompileError::Parse(parse) = err {
        for issue in parse.issues() {
            eprintln!("  {}", issue);
        }
    }
}

/// Run the routes command.
async fn run_routes(spec: &str, args: &CompileArgs, output_format: &str) -> ExitCode {
    let registration = match compile_app(spec, args, false).await {
        Ok((_, registration)) => registration,
        Err(e) => {
            report_compile_error(&e);
            return ExitCode::from(1);
        }
    };

    if output_format == "json" {
        match serde_json::to_string_pretty(&registration) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("error: failed to serialize routes: {}", e);
                return ExitCode::from(1);
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{:<48} {:<24} {:>6}  HANDLER", "PATTERN", "OPERATION", "STAGES");
    for route in &registration.routes {
        println!(
            "{:<48} {:<24} {:>6}  {}",
            route.path,
            route.operation_id.as_deref().unwrap_or("-"),
            route.stages,
            route.handler.as_str()
        );
    }
    eprintln!(
        "{} {}: {} route(s), {} stage(s)",
        registration.title,
        registration.version,
        registration.len(),
        registration.stage_count()
    );

    ExitCode::SUCCESS
}

/// Run the serve command.
async fn run_serve(spec: &str, args: &CompileArgs, listen: &str, dev: bool) -> ExitCode {
    let addr: SocketAddr = match listen.parse() {
        Ok(a) => a,
        Err(_) => {
            eprintln!("error: invalid listen address: {}", listen);
            return ExitCode::from(1);
        }
    };

    let (app, registration) = match compile_app(spec, args, dev).await {
        Ok(compiled) => compiled,
        Err(e) => {
            report_compile_error(&e);
            return ExitCode::from(1);
        }
    };

    let gateway = Arc::new(Gateway::new(app, registration));

    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: failed to bind to {}: {}", addr, e);
            return ExitCode::from(1);
        }
    };

    log_listening!(
        address = %addr,
        routes = gateway.routes_count(),
        dev_mode = dev,
        "listening"
    );

    server::serve(gateway, listener).await;
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { spec, format } => run_validate(&spec, &format),
        Commands::Routes {
            spec,
            compile,
            format,
        } => run_routes(&spec, &compile, &format).await,
        Commands::Serve {
            spec,
            compile,
            listen,
            dev,
            log_level,
            log_format,
        } => {
            let Some(log_format) = LogFormat::parse(&log_format) else {
                eprintln!("error: unknown log format: {}", log_format);
                return ExitCode::from(1);
            };
            let telemetry = TelemetryConfig::new()
                .with_log_level(log_level)
                .with_log_format(log_format);
            if let Err(e) = init_logging(&telemetry) {
                eprintln!("error: {}", e);
                return ExitCode::from(1);
            }

            log_startup!(
                service = %telemetry.service_name,
                version = env!("CARGO_PKG_VERSION"),
                spec = %spec,
                "starting"
            );
            run_serve(&spec, &compile, &listen, dev).await
        }
    }
}
