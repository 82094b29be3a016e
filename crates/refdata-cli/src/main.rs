//! Refdata CLI - command-line access to one reference-data resource.
//!
//! Results are printed to stdout as pretty JSON; logs go to stderr.
//! Ctrl-C cancels the in-flight call.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use refdata_core::{
    CallOptions, CancellationToken, ClientOptions, ClientSettings, ConcurrencyToken, Credential,
    HttpTransport, RefDataError, ReferenceClient, ResourceDescriptor, SearchQuery,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "refdata")]
#[command(about = "Query and edit reference-data resources")]
struct Args {
    /// Backend base URL (overrides the settings file)
    #[arg(long, env = "REFDATA_BASE_URL")]
    base_url: Option<String>,

    /// Resource collection path, e.g. /produtores
    #[arg(short, long)]
    resource: String,

    /// Entity name used in logs (defaults to the resource path)
    #[arg(long)]
    entity: Option<String>,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Bearer token
    #[arg(long, env = "REFDATA_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds (overrides the settings file)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every item
    List {
        /// Bypass the cache
        #[arg(long)]
        refresh: bool,
    },
    /// List active items
    Active,
    /// Fetch one item
    Get {
        id: String,
        /// Also print the item's version token
        #[arg(long)]
        with_version: bool,
    },
    /// Search the collection
    Search {
        term: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long, default_value = "0")]
        page: u32,
        #[arg(long, default_value = "20")]
        page_size: u32,
        #[arg(long)]
        sort: Option<String>,
    },
    /// Create an item from inline JSON or @file
    Create { payload: String },
    /// Replace an item from inline JSON or @file
    Update {
        id: String,
        payload: String,
        /// Only write if the stored version still matches
        #[arg(long)]
        if_match: Option<String>,
    },
    /// Delete an item
    Delete { id: String },
    /// Mark an item active
    Activate { id: String },
    /// Mark an item inactive
    Deactivate { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let settings = load_settings(&args)?;
    debug!("Using backend {}", settings.base_url);

    let transport = HttpTransport::with_timeout(&settings.base_url, settings.request_timeout())?;
    if let Some(token) = &args.token {
        transport.set_credential(Some(Credential::Bearer(token.clone())));
    }

    let entity = args.entity.clone().unwrap_or_else(|| {
        args.resource.trim_matches('/').to_string()
    });
    let client: ReferenceClient<Value> = ReferenceClient::new(
        ResourceDescriptor::new(entity, args.resource.as_str()),
        Arc::new(transport),
        ClientOptions {
            cache: settings.cache_config(),
            read_retry: settings.retry_config().with_jitter(true),
        },
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            interrupt.cancel();
        }
    });

    let opts = CallOptions::new().with_cancel(cancel);
    let outcome = run(&client, args.command, opts).await;
    client.shutdown();

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            report(&e);
            Err(e.into())
        }
    }
}

fn init_logging(debug: bool) {
    if std::env::var_os("RUST_LOG").is_some() {
        FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .init();
    } else {
        let log_level = if debug { Level::DEBUG } else { Level::WARN };
        FmtSubscriber::builder()
            .with_max_level(log_level)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(false)
            .compact()
            .init();
    }
}

fn load_settings(args: &Args) -> Result<ClientSettings> {
    let mut settings = match &args.settings {
        Some(path) => ClientSettings::from_json_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => ClientSettings::default(),
    };
    if let Some(base_url) = &args.base_url {
        settings.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(secs) = args.timeout_secs {
        settings.request_timeout_ms = Duration::from_secs(secs).as_millis() as u64;
    }
    settings.validate()?;
    Ok(settings)
}

async fn run(
    client: &ReferenceClient<Value>,
    command: Command,
    opts: CallOptions,
) -> refdata_core::Result<Value> {
    let value = match command {
        Command::List { refresh } => {
            let opts = if refresh { opts.refresh() } else { opts };
            Value::Array(client.get_all(&opts).await?)
        }
        Command::Active => Value::Array(client.get_active(&opts).await?),
        Command::Get { id, with_version } => {
            if with_version {
                let versioned = client.get_by_id_versioned(&id, &opts).await?;
                json!({
                    "version": versioned.version.as_ref().map(ConcurrencyToken::as_str),
                    "value": versioned.value,
                })
            } else {
                client.get_by_id(&id, &opts).await?
            }
        }
        Command::Search {
            term,
            active,
            page,
            page_size,
            sort,
        } => {
            let mut query = SearchQuery {
                term,
                active,
                ..SearchQuery::default()
            }
            .with_page(page, page_size);
            if let Some(sort) = sort {
                query = query.with_sort(sort);
            }
            let page = client.search(&query, &opts).await?;
            json!({ "total": page.total, "items": page.items })
        }
        Command::Create { payload } => {
            let payload = parse_payload(&payload)?;
            client.create(&payload, &opts).await?
        }
        Command::Update {
            id,
            payload,
            if_match,
        } => {
            let payload = parse_payload(&payload)?;
            let version = if_match.map(ConcurrencyToken::new);
            client.update(&id, &payload, version.as_ref(), &opts).await?
        }
        Command::Delete { id } => {
            client.delete(&id, &opts).await?;
            json!({ "deleted": id })
        }
        Command::Activate { id } => {
            client.activate(&id, &opts).await?;
            json!({ "activated": id })
        }
        Command::Deactivate { id } => {
            client.deactivate(&id, &opts).await?;
            json!({ "deactivated": id })
        }
    };
    info!("Done");
    Ok(value)
}

/// Inline JSON, or `@path` to read it from a file.
fn parse_payload(raw: &str) -> refdata_core::Result<Value> {
    let text = match raw.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|e| RefDataError::Config {
            message: format!("Failed to read payload {}: {}", path, e),
        })?,
        None => raw.to_string(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn report(err: &RefDataError) {
    match err {
        RefDataError::VersionConflict {
            current_version, ..
        } => {
            error!(
                "{} (re-fetch and retry with --if-match {})",
                err,
                current_version.as_deref().unwrap_or("<unknown>")
            );
        }
        RefDataError::Cancelled { .. } => warn!("{}", err),
        _ => error!(
            "{} [kind={}, severity={}, attempts={}]",
            err,
            err.kind(),
            err.classification().severity,
            err.attempts()
        ),
    }
}
