mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "presence",
    about = "Attendance gating engine: geofenced, face-verified clock-in/out with derived daily views",
    version,
    propagate_version = true
)]
struct Cli {
    /// Presence root (default: auto-detect from .presence/)
    #[arg(long, global = true, env = "PRESENCE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .presence/ with a starter config and an empty ledger
    Init {
        /// Organization name (default: directory name)
        #[arg(long)]
        name: Option<String>,

        /// Organization UTC offset in minutes, e.g. 420 for UTC+07:00
        #[arg(long, allow_negative_numbers = true)]
        utc_offset: Option<i32>,
    },

    /// Serve the HTTP API
    Serve {
        /// Port to listen on (0 = OS-assigned)
        #[arg(long, default_value = "3170")]
        port: u16,
    },

    /// Great-circle distance from a position to a site or another point
    Distance {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// Site id to check against
        #[arg(long, conflicts_with_all = ["to_lat", "to_lon"])]
        site: Option<String>,

        #[arg(long, allow_negative_numbers = true, requires = "to_lon")]
        to_lat: Option<f64>,

        #[arg(long, allow_negative_numbers = true, requires = "to_lat")]
        to_lon: Option<f64>,
    },

    /// Derive one actor's daily state from the ledger (or an events file)
    Derive {
        /// Actor id
        actor: String,

        /// Day in the organization's offset, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Read events from a JSON array instead of the ledger
        #[arg(long)]
        events: Option<PathBuf>,
    },

    /// Org-wide attendance summary for a day
    Summarize {
        /// Day in the organization's offset, YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,
    },

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init { name, utc_offset } => cmd::init::run(&root, name.as_deref(), utc_offset),
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Distance {
            lat,
            lon,
            site,
            to_lat,
            to_lon,
        } => {
            let target = match (site, to_lat, to_lon) {
                (Some(site), _, _) => cmd::distance::Target::Site(site),
                (None, Some(lat), Some(lon)) => cmd::distance::Target::Point(lat, lon),
                _ => {
                    eprintln!("error: pass either --site or both --to-lat and --to-lon");
                    std::process::exit(2);
                }
            };
            cmd::distance::run(&root, lat, lon, target, cli.json)
        }
        Commands::Derive {
            actor,
            date,
            events,
        } => cmd::derive::run(&root, &actor, date.as_deref(), events.as_deref(), cli.json),
        Commands::Summarize { date } => cmd::summarize::run(&root, date.as_deref(), cli.json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
