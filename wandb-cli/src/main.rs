use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::debug;
use serde_json::json;

use wandb_core::diagnostic::Diagnostic;
use wandb_core::provider::{Provider, ProviderError};
use wandb_core::resource::{Resource, ResourceId, State, Value};
use wandb_core::schema::{AttributeType, ResourceSchema};
use wandb_provider::resources::resource_types;
use wandb_provider::{ProviderSettings, WandbProvider};

#[derive(Parser)]
#[command(name = "wandb")]
#[command(about = "Manage W&B run queues and teams", long_about = None)]
struct Cli {
    /// W&B API base URL (overrides WANDB_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// W&B API key (overrides WANDB_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a resource from a JSON resource file
    Create {
        /// Path to resource file ({"type", "name", "attributes"})
        file: PathBuf,
    },
    /// Read the current state of a resource
    Read {
        /// Resource type (e.g., wandb_run_queue)
        resource_type: String,
        /// Identifier stored in state (`entity:name` for run queues, team name for teams)
        identifier: String,
        /// Previously printed state, used to keep unchanged JSON text stable
        #[arg(long)]
        prior: Option<PathBuf>,
        /// Local resource name
        #[arg(long, default_value = "main")]
        name: String,
    },
    /// Update a resource to match a resource file
    Update {
        /// Current state, as printed by create/read
        state: PathBuf,
        /// Path to resource file with the desired attributes
        file: PathBuf,
    },
    /// Delete a resource
    Delete {
        resource_type: String,
        identifier: String,
        #[arg(long, default_value = "main")]
        name: String,
    },
    /// Adopt an existing remote resource
    Import {
        resource_type: String,
        identifier: String,
        #[arg(long, default_value = "main")]
        name: String,
    },
    /// Show attribute schemas
    Schema {
        /// Only show this resource type
        resource_type: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let settings = ProviderSettings {
        base_url: cli.base_url.clone(),
        api_key: cli.api_key.clone(),
        timeout: cli.timeout.map(Duration::from_secs),
    };

    let result = match cli.command {
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
        command => match WandbProvider::from_settings(settings) {
            Ok(provider) => run_lifecycle(&provider, command).await,
            Err(e) => Err(format_error(e)),
        },
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run_lifecycle(provider: &dyn Provider, command: Commands) -> Result<(), String> {
    match command {
        Commands::Create { file } => {
            let resource = load_resource(&file)?;
            debug!("creating {}", resource.id);
            let applied = provider.create(&resource).await.map_err(format_error)?;
            print_warnings(&applied.warnings);
            print_state(&applied.state)
        }
        Commands::Read {
            resource_type,
            identifier,
            prior,
            name,
        } => {
            let prior = prior.as_deref().map(load_state).transpose()?;
            let id = prior
                .as_ref()
                .map(|state| state.id.clone())
                .unwrap_or_else(|| ResourceId::new(resource_type, name));
            let state = provider
                .read(&id, &identifier, prior.as_ref())
                .await
                .map_err(format_error)?;
            if !state.exists {
                eprintln!(
                    "{}",
                    format!("{} no longer exists", identifier).yellow()
                );
            }
            print_state(&state)
        }
        Commands::Update { state, file } => {
            let from = load_state(&state)?;
            let identifier = from
                .identifier
                .clone()
                .ok_or_else(|| format!("{} has no identifier", state.display()))?;
            let to = load_resource(&file)?;
            let applied = provider
                .update(&from.id, &identifier, &from, &to)
                .await
                .map_err(format_error)?;
            print_warnings(&applied.warnings);
            print_state(&applied.state)
        }
        Commands::Delete {
            resource_type,
            identifier,
            name,
        } => {
            let id = ResourceId::new(resource_type, name);
            provider
                .delete(&id, &identifier)
                .await
                .map_err(format_error)?;
            println!("{} {}", "Deleted".green(), identifier);
            Ok(())
        }
        Commands::Import {
            resource_type,
            identifier,
            name,
        } => {
            let id = ResourceId::new(resource_type, name);
            let state = provider
                .import(&id, &identifier)
                .await
                .map_err(format_error)?;
            print_state(&state)
        }
        Commands::Schema { resource_type } => run_schema(resource_type.as_deref()),
    }
}

fn format_error(error: ProviderError) -> String {
    let diagnostic = error.to_diagnostic();
    if diagnostic.detail.is_empty() {
        diagnostic.summary
    } else {
        format!("{}\n  {}", diagnostic.summary, diagnostic.detail)
    }
}

fn print_warnings(warnings: &[Diagnostic]) {
    for warning in warnings {
        eprintln!(
            "{} {}: {}",
            "Warning:".yellow().bold(),
            warning.summary,
            warning.detail
        );
    }
}

fn print_state(state: &State) -> Result<(), String> {
    let text = serde_json::to_string_pretty(&state_to_json(state)).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn schema_for(resource_type: &str) -> Option<ResourceSchema> {
    resource_types()
        .into_iter()
        .find(|t| t.name() == resource_type)
        .map(|t| t.schema())
}

// =============================================================================
// JSON Files
// =============================================================================

fn read_json(path: &Path) -> Result<serde_json::Value, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("Invalid JSON in {}: {}", path.display(), e))
}

fn load_resource(path: &Path) -> Result<Resource, String> {
    resource_from_json(&read_json(path)?)
}

fn load_state(path: &Path) -> Result<State, String> {
    state_from_json(&read_json(path)?)
}

fn required_field<'a>(json: &'a serde_json::Value, field: &str) -> Result<&'a str, String> {
    json.get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| format!("Missing string field '{}'", field))
}

/// Convert JSON attributes, accepting objects for JSON-text attributes
fn attributes_from_json(
    json: &serde_json::Value,
    schema: Option<&ResourceSchema>,
) -> Result<HashMap<String, Value>, String> {
    let Some(object) = json.get("attributes") else {
        return Ok(HashMap::new());
    };
    let object = object
        .as_object()
        .ok_or_else(|| "'attributes' must be an object".to_string())?;

    Ok(object
        .iter()
        .filter_map(|(key, value)| {
            let json_text = value.is_object()
                && schema
                    .and_then(|s| s.attributes.get(key))
                    .is_some_and(|a| matches!(a.attr_type, AttributeType::Custom { .. }));
            if json_text {
                Some((key.clone(), Value::String(value.to_string())))
            } else {
                Value::from_json(value).map(|v| (key.clone(), v))
            }
        })
        .collect())
}

fn resource_from_json(json: &serde_json::Value) -> Result<Resource, String> {
    let resource_type = required_field(json, "type")?;
    let name = required_field(json, "name")?;
    let schema = schema_for(resource_type);
    Ok(Resource {
        id: ResourceId::new(resource_type, name),
        attributes: attributes_from_json(json, schema.as_ref())?,
    })
}

fn state_to_json(state: &State) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = state
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    json!({
        "type": state.id.resource_type,
        "name": state.id.name,
        "identifier": state.identifier,
        "exists": state.exists,
        "attributes": attributes,
    })
}

fn state_from_json(json: &serde_json::Value) -> Result<State, String> {
    let id = ResourceId::new(required_field(json, "type")?, required_field(json, "name")?);
    Ok(State {
        id,
        identifier: json
            .get("identifier")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        attributes: attributes_from_json(json, None)?,
        exists: json
            .get("exists")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(true),
    })
}

// =============================================================================
// Schema Command
// =============================================================================

fn format_schema(schema: &ResourceSchema) -> String {
    let mut out = schema.resource_type.bold().to_string();
    if let Some(description) = &schema.description {
        out.push_str(&format!(" - {}", description));
    }
    out.push('\n');

    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();
    for name in names {
        let attr = &schema.attributes[name];
        let mut flags = Vec::new();
        if attr.required {
            flags.push("required".to_string());
        }
        if attr.computed {
            flags.push("computed".to_string());
        }
        if let Some(default) = &attr.default {
            flags.push(format!("default = {}", default.to_json()));
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" ({})", flags.join(", "))
        };
        out.push_str(&format!("  {}: {}{}\n", name, attr.attr_type, flags));
    }
    out
}

fn run_schema(resource_type: Option<&str>) -> Result<(), String> {
    let schemas: Vec<ResourceSchema> = match resource_type {
        Some(resource_type) => vec![
            schema_for(resource_type)
                .ok_or_else(|| format!("Unknown resource type: {}", resource_type))?,
        ],
        None => resource_types().iter().map(|t| t.schema()).collect(),
    };
    for schema in &schemas {
        println!("{}", format_schema(schema));
    }
    Ok(())
}
