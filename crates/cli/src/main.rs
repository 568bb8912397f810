mod notify;
mod output;
mod resources;
mod transfer;
mod watch;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use fieldops_client::{ClientConfig, FieldOpsClient};
use fieldops_interchange::{ResourceKind, Scope};
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Where an uploaded file goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum UploadKind {
    /// CCTV camera or rack image
    Cctv,
    /// Attachment on a ticket (requires --task)
    Task,
    /// Profile photo of the signed-in user
    Profile,
}

/// Field-service operations client.
#[derive(Parser)]
#[command(name = "fieldops", version, about = "Field-service operations client")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Path to a TOML config file (default: ./fieldops.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// API base URL, overriding the config file and FIELDOPS_BASE_URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Log requests and cache activity to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a collection
    List {
        /// Resource name (tasks, customers, cctv, complaints, ...)
        resource: ResourceKind,
        /// all, mine, customer:<id> or task:<id>
        #[arg(long, default_value = "all")]
        scope: Scope,
        /// Free-text search
        #[arg(long)]
        search: Option<String>,
        /// Exact-match filter, repeatable
        #[arg(long = "filter", value_name = "NAME=VALUE")]
        filters: Vec<String>,
        /// Page to show (1-based)
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Rows per page; 0 shows everything
        #[arg(long, default_value_t = 0)]
        page_size: usize,
    },

    /// Show one record
    Show { resource: ResourceKind, id: i64 },

    /// Create a record from JSON (inline or @file)
    Create {
        resource: ResourceKind,
        #[arg(long)]
        data: String,
    },

    /// Update a record with a JSON patch (inline or @file)
    Update {
        resource: ResourceKind,
        id: i64,
        #[arg(long)]
        data: String,
    },

    /// Delete a record
    Delete {
        resource: ResourceKind,
        id: i64,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Upload a file as base64 with progress
    Upload {
        #[arg(value_enum)]
        target: UploadKind,
        file: PathBuf,
        /// Ticket the attachment belongs to
        #[arg(long)]
        task: Option<i64>,
        /// Image type recorded with CCTV uploads
        #[arg(long, default_value = "camera")]
        image_type: String,
        /// Notes stored with a ticket attachment
        #[arg(long)]
        notes: Option<String>,
    },

    /// Download a CSV export
    Export {
        resource: ResourceKind,
        /// Output path (default: the server-suggested file name)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Download the import template instead
        #[arg(long)]
        template: bool,
    },

    /// Import records from a CSV file
    Import { resource: ResourceKind, file: PathBuf },

    /// Create CCTV records from a JSON array file
    BulkCctv { file: PathBuf },

    /// Poll a collection and print it whenever it changes
    Watch {
        resource: ResourceKind,
        #[arg(long, default_value = "all")]
        scope: Scope,
        /// Poll interval in seconds (default: from config)
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many refreshes
        #[arg(long)]
        count: Option<usize>,
    },

    /// Suggest the next serial number for a new record
    NextSerial {
        resource: ResourceKind,
        #[arg(long, default_value = "all")]
        scope: Scope,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref(), cli.base_url.as_deref()) {
        Ok(config) => config,
        Err(msg) => {
            report_error(&msg, cli.output);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), cli.output);
            process::exit(1);
        }
    };

    let output = cli.output;
    if let Err(msg) = runtime.block_on(run(cli.command, config, output)) {
        report_error(&msg, output);
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "fieldops_cli=debug,fieldops_client=debug,fieldops_transport=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>, base_url: Option<&str>) -> Result<ClientConfig, String> {
    let mut config = ClientConfig::load(path).map_err(|e| e.to_string())?;
    if let Some(url) = base_url {
        config.base_url = url.to_string();
        config.validate().map_err(|e| e.to_string())?;
    }
    Ok(config)
}

async fn run(command: Commands, config: ClientConfig, output: OutputFormat) -> Result<(), String> {
    let policy = config.upload_policy();
    let client = FieldOpsClient::connect(config)
        .with_notifier(Arc::new(notify::TerminalNotifier::new(output)));

    match command {
        Commands::List {
            resource,
            scope,
            search,
            filters,
            page,
            page_size,
        } => {
            let query = resources::ListQuery {
                scope,
                search,
                filters,
                page,
                page_size,
            };
            resources::cmd_list(&client, resource, query, output).await
        }
        Commands::Show { resource, id } => resources::cmd_show(&client, resource, id, output).await,
        Commands::Create { resource, data } => {
            resources::cmd_create(&client, resource, &data, output).await
        }
        Commands::Update { resource, id, data } => {
            resources::cmd_update(&client, resource, id, &data, output).await
        }
        Commands::Delete { resource, id, yes } => {
            resources::cmd_delete(&client, resource, id, yes, output).await
        }
        Commands::Upload {
            target,
            file,
            task,
            image_type,
            notes,
        } => {
            let target = transfer::upload_target(target, task, image_type, notes)?;
            transfer::cmd_upload(&client, &file, target, policy, output).await
        }
        Commands::Export {
            resource,
            out,
            template,
        } => transfer::cmd_export(&client, resource, out, template, output).await,
        Commands::Import { resource, file } => {
            transfer::cmd_import(&client, resource, &file, output).await
        }
        Commands::BulkCctv { file } => transfer::cmd_bulk_cctv(&client, &file, output).await,
        Commands::Watch {
            resource,
            scope,
            interval,
            count,
        } => watch::cmd_watch(&client, resource, scope, interval, count, output).await,
        Commands::NextSerial { resource, scope } => {
            resources::cmd_next_serial(&client, resource, scope, output).await
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat) {
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => eprintln!("{}", serde_json::json!({ "error": msg })),
    }
}
