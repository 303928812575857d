use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use mediax_core::{Context, DescriptorReader, Query, RetrievableReader, Schema};
use mediax_pipeline::pipeline::OUTPUT;
use mediax_pipeline::{ingest_pipeline, query_pipeline, ExecutionServer, JobStatus, QueryInput, SchemaConfig};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use uuid::Uuid;

/// Index and search multimedia collections
#[derive(Parser, Debug)]
#[command(name = "mediax")]
#[command(about = "A multimedia indexing and retrieval engine", long_about = None)]
struct Args {
    /// Path to the schema configuration
    #[arg(short, long, default_value = "./schema.json")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the tables of every field
    Init,
    /// Drop the tables of every field
    Deinit,
    /// Remove all stored retrievables and descriptors
    Truncate,
    /// Show whether the schema is initialized and how much it holds
    Status,
    /// Enumerate a directory and extract every configured field
    Ingest {
        /// Root directory to enumerate
        path: PathBuf,
    },
    /// Query one field, or several merged by retrievable id
    Query {
        /// Field to query
        #[arg(short, long)]
        field: Option<String>,

        /// Text to analyse with the field's analyser
        #[arg(long, conflicts_with_all = ["vector", "json"])]
        text: Option<String>,

        /// Comma-separated feature vector
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true, conflicts_with = "json")]
        vector: Option<Vec<f32>>,

        /// Query inputs as JSON, either one backend query for `--field` or a
        /// list of tagged inputs
        #[arg(long)]
        json: Option<String>,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<u64>,

        /// Append timings of the query to this file
        #[arg(long)]
        benchmark: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct QueryResult {
    id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f32>,
}

fn query_inputs(
    field: Option<String>,
    text: Option<String>,
    vector: Option<Vec<f32>>,
    json: Option<String>,
) -> anyhow::Result<Vec<QueryInput>> {
    if let Some(json) = json {
        return match field {
            Some(field) => {
                let query: Query = serde_json::from_str(&json).context("Invalid query")?;
                Ok(vec![QueryInput::Query { field, query }])
            }
            None => serde_json::from_str(&json).context("Invalid query inputs"),
        };
    }
    let Some(field) = field else {
        bail!("--field is required unless --json lists tagged inputs");
    };
    match (text, vector) {
        (Some(text), None) => Ok(vec![QueryInput::Text { field, text }]),
        (None, Some(vector)) => Ok(vec![QueryInput::Vector { field, vector }]),
        _ => bail!("Give exactly one of --text, --vector or --json"),
    }
}

async fn status(schema: &Schema) -> anyhow::Result<()> {
    let initialized = schema.is_initialized().await;
    println!("schema:      {}", schema.name());
    println!("backend:     {}", schema.connection().description());
    println!("initialized: {}", initialized);
    if !initialized {
        return Ok(());
    }
    let retrievables = schema.connection().retrievable_reader().count().await;
    println!("retrievables: {}", retrievables);
    for field in schema.fields() {
        let count = field.get_reader()?.count().await;
        println!("  {} ({}): {}", field.name(), field.analyser().name(), count);
    }
    Ok(())
}

async fn run(command: Command, config: SchemaConfig) -> anyhow::Result<()> {
    let schema = config.open()?;
    let context = Context::new(schema.name());

    match command {
        Command::Init => {
            schema.initialize().await?;
            info!("Schema '{}' initialized", schema.name());
        }
        Command::Deinit => {
            schema.deinitialize().await?;
            info!("Schema '{}' deinitialized", schema.name());
        }
        Command::Truncate => {
            schema.truncate().await?;
            info!("Schema '{}' truncated", schema.name());
        }
        Command::Status => status(&schema).await?,
        Command::Ingest { path } => {
            if !schema.is_initialized().await {
                bail!("Schema '{}' is not initialized, run `init` first", schema.name());
            }
            let ingest = config.ingest();
            let server = ExecutionServer::new(ingest.parallelism);
            let pipeline = ingest_pipeline(&schema, &ingest, &path, &context)?;
            let job = server.submit(pipeline);
            info!("Ingesting {:?} as job {}", path, job);

            let wait = server.wait(job);
            tokio::pin!(wait);
            let info = tokio::select! {
                info = &mut wait => info,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    server.shutdown();
                    wait.await
                }
            };
            match info {
                Some(info) if info.status == JobStatus::Completed && info.failed == 0 => {
                    info!("Ingested {} retrievables", info.processed);
                }
                Some(info) if info.status == JobStatus::Completed => {
                    schema.close().await;
                    bail!(
                        "Ingested {} retrievables, {} of them not fully persisted",
                        info.processed,
                        info.failed
                    );
                }
                Some(info) => warn!(
                    "Ingest ended {:?} after {} retrievables, {} not fully persisted",
                    info.status, info.processed, info.failed
                ),
                None => warn!("Ingest job {} vanished", job),
            }
        }
        Command::Query {
            field,
            text,
            vector,
            json,
            limit,
            benchmark,
        } => {
            let mut context = context;
            if let Some(limit) = limit {
                context.set(OUTPUT, "limit", limit.to_string());
            }
            if let Some(logfile) = benchmark {
                context.set(OUTPUT, "logfile", logfile.to_string_lossy());
            }
            let inputs = query_inputs(field, text, vector, json)?;
            let mut results = query_pipeline(&schema, inputs, &context)?.into_stream();
            while let Some(retrievable) = results.next().await {
                let result = QueryResult {
                    id: retrievable.id(),
                    distance: retrievable.distance(),
                    score: retrievable.score(),
                };
                println!("{}", serde_json::to_string(&result)?);
            }
        }
    }

    schema.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mediax v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: {:?}", args.config);

    let config = SchemaConfig::load(&args.config)?;
    run(args.command, config).await
}
