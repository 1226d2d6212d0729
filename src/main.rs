//! plz CLI - Command line interface for s3plz
//!
//! Puts, fetches and lists objects through a serialization pipeline.
//! Output is JSON so the commands can be driven from scripts.

use anyhow::Context;
use clap::{Parser, Subcommand};
use s3plz::{
    connect, CallOptions, Connection, ConnectConfig, Created, FsStore, Pipeline, Stage,
};
use serde_json::{json, Value};
use std::io::Read;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plz")]
#[command(about = "Send values to and from S3-style object storage")]
#[command(version)]
struct Cli {
    /// Bucket root, e.g. s3://my-bucket
    #[arg(short, long)]
    root: String,

    /// Default serializer pipeline, e.g. json.gz
    #[arg(short, long)]
    serializer: Option<String>,

    /// Write objects as public-read
    #[arg(long)]
    public: bool,

    /// Use a local directory instead of S3
    #[arg(long)]
    local: Option<PathBuf>,

    /// Config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(clap::Args)]
struct KeyArgs {
    /// Key or key template
    key: String,
    /// Template fields as name=value
    #[arg(short = 'F', long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,
    /// Serializer for this call only
    #[arg(short = 'S', long = "with")]
    with: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    // === Writes ===
    /// Upload a payload
    Put {
        #[command(flatten)]
        target: KeyArgs,
        /// Payload; read from stdin when omitted
        payload: Option<String>,
    },

    /// Upload a payload only if the key is free
    Create {
        #[command(flatten)]
        target: KeyArgs,
        /// Payload; read from stdin when omitted
        payload: Option<String>,
    },

    /// Delete an object
    Rm {
        #[command(flatten)]
        target: KeyArgs,
    },

    // === Reads ===
    /// Download an object
    Get {
        #[command(flatten)]
        target: KeyArgs,
    },

    /// Check whether an object exists
    Exists {
        #[command(flatten)]
        target: KeyArgs,
    },

    /// List keys under a directory
    Ls {
        /// Directory (empty for the whole bucket)
        #[arg(default_value = "")]
        directory: String,
        /// Template fields as name=value
        #[arg(short = 'F', long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Maximum number of keys to return
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show object metadata
    Meta {
        #[command(flatten)]
        target: KeyArgs,
    },

    /// Show seconds since an object was last modified
    Age {
        #[command(flatten)]
        target: KeyArgs,
    },

    /// Resolve a key template without touching storage
    Format {
        #[command(flatten)]
        target: KeyArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "s3plz=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let plz = open(&cli)?;

    match &cli.command {
        Commands::Put { target, payload } => {
            let opts = call_options(target)?;
            let payload = read_payload(payload.as_deref())?;
            let key = if is_json(&plz, &opts) {
                plz.put(&parse_json(&payload)?, &target.key, &opts)?
            } else {
                plz.put_bytes(payload.as_bytes(), &target.key, &opts)?
            };
            output(&cli.format, &json!({ "status": "ok", "key": key }));
        }

        Commands::Create { target, payload } => {
            let opts = call_options(target)?;
            let payload = read_payload(payload.as_deref())?;
            let created = if is_json(&plz, &opts) {
                plz.create(&parse_json(&payload)?, &target.key, &opts)?
            } else {
                plz.create_bytes(payload.as_bytes(), &target.key, &opts)?
            };
            let status = match created {
                Created::Written(_) => "created",
                Created::Exists(_) => "exists",
            };
            output(
                &cli.format,
                &json!({ "status": status, "key": created.key() }),
            );
        }

        Commands::Rm { target } => {
            let key = plz.delete(&target.key, &call_options(target)?)?;
            output(&cli.format, &json!({ "status": "ok", "key": key }));
        }

        Commands::Get { target } => {
            let opts = call_options(target)?;
            let key = plz.format_key(&target.key, &opts)?;
            let value = if is_json(&plz, &opts) {
                plz.get::<Value>(&key, &opts)?
            } else {
                plz.get_bytes(&key, &opts)?
                    .map(|bytes| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
            };
            match value {
                Some(value) => output(&cli.format, &json!({ "key": key, "value": value })),
                None => not_found(&cli.format, &key),
            }
        }

        Commands::Exists { target } => {
            let key = plz.exists(&target.key, &call_options(target)?)?;
            output(
                &cli.format,
                &json!({ "exists": key.is_some(), "key": key }),
            );
        }

        Commands::Ls {
            directory,
            fields,
            limit,
        } => {
            let opts = CallOptions::new().fields(fields.iter().cloned().collect());
            let keys = plz.ls(directory, &opts)?.take(limit.unwrap_or(usize::MAX));
            let keys: Vec<String> = keys.collect::<s3plz::Result<_>>()?;
            output(
                &cli.format,
                &json!({ "count": keys.len(), "keys": keys }),
            );
        }

        Commands::Meta { target } => {
            let opts = call_options(target)?;
            let key = plz.format_key(&target.key, &opts)?;
            match plz.get_meta(&key, &opts)? {
                Some(meta) => output(&cli.format, &serde_json::to_value(meta)?),
                None => not_found(&cli.format, &key),
            }
        }

        Commands::Age { target } => {
            let opts = call_options(target)?;
            let key = plz.format_key(&target.key, &opts)?;
            match plz.get_age(&key, &opts)? {
                Some(age) => output(
                    &cli.format,
                    &json!({ "key": key, "seconds": age.num_seconds() }),
                ),
                None => not_found(&cli.format, &key),
            }
        }

        Commands::Format { target } => {
            let key = plz.format_key(&target.key, &call_options(target)?)?;
            output(&cli.format, &json!({ "key": key }));
        }
    }

    Ok(())
}

/// Settings priority: flags > environment > config file
fn open(cli: &Cli) -> anyhow::Result<Connection> {
    let mut config = match &cli.config {
        Some(path) => ConnectConfig::load(path)?,
        None => match ConnectConfig::default_path() {
            Ok(path) => ConnectConfig::load_or_default(&path)?,
            Err(_) => ConnectConfig::default(),
        },
    };

    let env = ConnectConfig::from_env()?;
    config.serializer = env.serializer.or(config.serializer);
    config.public |= env.public;
    config.region = env.region.or(config.region);
    config.endpoint = env.endpoint.or(config.endpoint);

    if let Some(spec) = &cli.serializer {
        config.serializer = Some(Pipeline::parse(spec)?);
    }
    config.public |= cli.public;

    let plz = match &cli.local {
        Some(dir) => {
            let store = FsStore::open(dir)
                .with_context(|| format!("Failed to open local store at {}", dir.display()))?;
            Connection::open(&cli.root, store, config)?
        }
        None => connect(&cli.root, config)?,
    };
    Ok(plz)
}

fn call_options(target: &KeyArgs) -> anyhow::Result<CallOptions> {
    let mut opts = CallOptions::new().fields(target.fields.iter().cloned().collect());
    if let Some(spec) = &target.with {
        opts = opts.serializer_spec(spec)?;
    }
    Ok(opts)
}

/// JSON pipelines take structured payloads; everything else moves bytes
fn is_json(plz: &Connection, opts: &CallOptions) -> bool {
    let pipeline = opts.serializer.as_ref().unwrap_or(plz.serializer());
    pipeline.encoder() == Some(Stage::Json)
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got {}", raw))
}

fn read_payload(payload: Option<&str>) -> anyhow::Result<String> {
    match payload {
        Some(payload) => Ok(payload.to_string()),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read payload from stdin")?;
            Ok(buf)
        }
    }
}

fn parse_json(payload: &str) -> anyhow::Result<Value> {
    serde_json::from_str(payload).context("Payload is not valid JSON")
}

fn not_found(format: &OutputFormat, key: &str) {
    output(
        format,
        &json!({
            "status": "error",
            "message": format!("Object not found: {}", key)
        }),
    );
    std::process::exit(1);
}

fn output(format: &OutputFormat, value: &Value) {
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string(value),
        OutputFormat::Text => serde_json::to_string_pretty(value),
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to render output: {}", e),
    }
}
