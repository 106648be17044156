//! PostForge CLI - JSON bridge over the render pipeline
//!
//! Commands: templates, template, validate, markup, render, commit, committed, export
//! Outputs JSON to stdout
//! Returns 2 on validation / domain failure, 1 on setup failure

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::process::ExitCode;

use postforge_core::{logging, EngineConfig, EngineError, RenderPipeline, RenderRequest};

#[derive(Parser)]
#[command(name = "postforge-cli")]
#[command(about = "PostForge CLI - social post image engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the templates directory
    #[arg(short, long)]
    templates_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines (stderr)
    #[arg(long)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available templates
    Templates,

    /// Show one template with its slot map
    Template {
        #[arg(short, long)]
        id: String,
    },

    /// Validate and merge fields against a template
    Validate {
        #[arg(short, long)]
        template: String,

        /// JSON object of field values
        #[arg(short, long)]
        payload: String,

        #[arg(short, long)]
        ratio: Option<String>,
    },

    /// Render template markup (SVG) to stdout without persisting
    Markup {
        #[arg(short, long)]
        template: String,

        #[arg(short, long)]
        payload: String,

        #[arg(short, long)]
        ratio: Option<String>,
    },

    /// Render and persist a preview
    Render {
        /// JSON payload (RenderRequest)
        #[arg(short, long)]
        payload: String,
    },

    /// Commit a preview (debits one credit)
    Commit {
        #[arg(short, long)]
        preview: String,

        /// Final URLs, comma separated
        #[arg(short, long, value_delimiter = ',')]
        urls: Vec<String>,

        /// Forwarded to the credits service unchanged
        #[arg(short, long)]
        authorization: Option<String>,
    },

    /// List committed posts, newest first
    Committed {
        #[arg(short, long)]
        limit: Option<i64>,

        #[arg(short, long)]
        offset: Option<i64>,
    },

    /// Rasterize a committed SVG post to PNG
    Export {
        #[arg(short, long)]
        post: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose, cli.json_logs);

    let mut config = match EngineConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => return setup_failure(&e),
    };
    if let Some(dir) = cli.templates_dir {
        config.templates_dir = dir;
    }

    let pipeline = match RenderPipeline::from_config(&config) {
        Ok(p) => p,
        Err(e) => return setup_failure(&e),
    };

    match cli.command {
        Commands::Templates => emit(Ok(pipeline.list_templates())),

        Commands::Template { id } => emit(pipeline.get_template(&id)),

        Commands::Validate { template, payload, ratio } => match parse_fields(&payload) {
            Ok(fields) => emit(pipeline.validate(&template, &fields, ratio.as_deref())),
            Err(e) => invalid_payload(e),
        },

        Commands::Markup { template, payload, ratio } => match parse_fields(&payload) {
            Ok(fields) => emit(pipeline.render_markup(&template, &fields, ratio.as_deref())),
            Err(e) => invalid_payload(e),
        },

        Commands::Render { payload } => match serde_json::from_str::<RenderRequest>(&payload) {
            Ok(request) => emit(pipeline.render_preview(&request)),
            Err(e) => invalid_payload(e),
        },

        Commands::Commit { preview, urls, authorization } => emit(
            pipeline
                .commit_preview(&preview, &urls, authorization.as_deref())
                .await,
        ),

        Commands::Committed { limit, offset } => emit(pipeline.list_committed(limit, offset)),

        Commands::Export { post } => emit(
            pipeline
                .export_post_png(post)
                .map(|path| serde_json::json!({ "path": path })),
        ),
    }
}

fn parse_fields(payload: &str) -> Result<Map<String, Value>, serde_json::Error> {
    serde_json::from_str(payload)
}

fn emit<T: Serialize>(result: Result<T, EngineError>) -> ExitCode {
    match result {
        Ok(value) => {
            let output = serde_json::json!({ "success": true, "result": value });
            println!("{}", pretty(&output));
            ExitCode::SUCCESS
        }
        Err(e) => {
            let mut output = serde_json::json!({
                "success": false,
                "kind": e.kind(),
                "error": e.to_string(),
            });
            if let EngineError::Validation(v) = &e {
                output["field"] = Value::String(v.field().to_string());
            }
            println!("{}", pretty(&output));
            ExitCode::from(2)
        }
    }
}

fn invalid_payload(e: serde_json::Error) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "kind": "bad_request",
        "error": format!("Invalid payload: {e}"),
    });
    println!("{}", pretty(&output));
    ExitCode::FAILURE
}

fn setup_failure(e: &EngineError) -> ExitCode {
    let output = serde_json::json!({ "success": false, "kind": e.kind(), "error": e.to_string() });
    println!("{}", pretty(&output));
    ExitCode::FAILURE
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
