//! CLI parsing and dispatch.

mod commands;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::config::{Settings, SiteProfile};
use crate::upload::DeliverySettings;

#[derive(Parser)]
#[command(name = "vidacquire")]
#[command(about = "Media acquisition pipeline for bot-protected video hosts")]
#[command(version)]
pub struct Cli {
    /// Store DSN (SQLite path or sqlite:// URL)
    #[arg(long, env = "VIDACQUIRE_DB", default_value = "vidacquire.db", global = true)]
    connection_string: String,

    /// Root directory for downloads and logs
    #[arg(long, env = "VIDACQUIRE_DOWNLOAD_DIR", default_value = "downloads", global = true)]
    download_dir: PathBuf,

    /// Challenge-solver endpoint
    #[arg(long, env = "VIDACQUIRE_SOLVER_URL", default_value = "http://localhost:8191", global = true)]
    solver_url: String,

    /// Delivery bot token (uploads enabled only with chat id and base URL)
    #[arg(long, env = "VIDACQUIRE_DELIVERY_TOKEN", global = true)]
    delivery_token: Option<String>,

    /// Delivery chat id
    #[arg(long, env = "VIDACQUIRE_DELIVERY_CHAT_ID", global = true)]
    delivery_chat_id: Option<String>,

    /// Delivery API base URL
    #[arg(long, env = "VIDACQUIRE_DELIVERY_BASE_URL", global = true)]
    delivery_base_url: Option<String>,

    /// Concurrent download workers
    #[arg(long, env = "VIDACQUIRE_DOWNLOADS", default_value = "3", global = true)]
    downloads: usize,

    /// Concurrent upload workers
    #[arg(long, env = "VIDACQUIRE_UPLOADS", default_value = "2", global = true)]
    uploads: usize,

    /// Solver session time-to-live in minutes
    #[arg(long, env = "VIDACQUIRE_SESSION_TTL_MINUTES", default_value = "30", global = true)]
    session_ttl_minutes: u64,

    /// Default channel check interval in minutes
    #[arg(long, env = "VIDACQUIRE_DEFAULT_INTERVAL_MINUTES", default_value = "60", global = true)]
    default_interval_minutes: i64,

    /// Path marker identifying post pages on the host
    #[arg(long, env = "VIDACQUIRE_POST_MARKER", default_value = "/post/", global = true)]
    post_marker: String,

    /// Extension of direct media URLs on the host
    #[arg(long, env = "VIDACQUIRE_MEDIA_EXT", default_value = ".mp4", global = true)]
    media_ext: String,

    /// Known media CDN hosts (comma separated)
    #[arg(long, env = "VIDACQUIRE_CDN_HOSTS", value_delimiter = ',', global = true)]
    cdn_hosts: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the store and verify solver reachability
    Init,

    /// Run the automated scan/download/upload loop until interrupted
    Run,

    /// Scan one channel fully and process everything it yields
    Scan {
        /// Channel name (from the store) or a listing URL
        channel: String,
        /// Maximum candidates to process
        #[arg(short, long, default_value = "500")]
        limit: usize,
    },

    /// Show store counts and pipeline state
    Status,

    /// Manage monitored channels
    Channel {
        #[command(subcommand)]
        command: ChannelCommands,
    },
}

#[derive(Subcommand)]
enum ChannelCommands {
    /// Add or update a channel
    Add {
        /// Display name
        name: String,
        /// Absolute listing URL
        url: String,
        /// Check interval in minutes (defaults to the global default)
        #[arg(short, long)]
        interval: Option<i64>,
    },
    /// List configured channels
    List,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

impl Cli {
    fn settings(&self) -> Settings {
        let delivery = match (
            &self.delivery_token,
            &self.delivery_chat_id,
            &self.delivery_base_url,
        ) {
            (Some(token), Some(chat_id), Some(base_url)) => Some(DeliverySettings {
                token: token.clone(),
                chat_id: chat_id.clone(),
                base_url: base_url.clone(),
            }),
            _ => None,
        };

        Settings {
            database_path: Settings::database_path_from_dsn(&self.connection_string),
            download_dir: self.download_dir.clone(),
            solver_url: self.solver_url.clone(),
            delivery,
            download_workers: self.downloads,
            upload_workers: self.uploads,
            session_ttl: Duration::from_secs(self.session_ttl_minutes * 60),
            default_interval_minutes: self.default_interval_minutes,
            cycle_delay: Duration::from_secs(60),
            site: SiteProfile {
                post_path_marker: self.post_marker.clone(),
                media_extension: self.media_ext.clone(),
                cdn_hosts: self.cdn_hosts.clone(),
                ..SiteProfile::default()
            },
        }
    }
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings();

    match &cli.command {
        Commands::Init => commands::init::cmd_init(&settings).await,
        Commands::Run => commands::run::cmd_run(&settings).await,
        Commands::Scan { channel, limit } => {
            commands::scan::cmd_scan(&settings, channel, *limit).await
        }
        Commands::Status => commands::status::cmd_status(&settings).await,
        Commands::Channel { command } => match command {
            ChannelCommands::Add { name, url, interval } => {
                commands::channel::cmd_add(&settings, name, url, *interval)
            }
            ChannelCommands::List => commands::channel::cmd_list(&settings),
        },
    }
}
