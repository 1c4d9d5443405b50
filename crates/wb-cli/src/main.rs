use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::Context;

#[derive(Parser)]
#[command(name = "waybill")]
#[command(about = "Waybill shipment ledger CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> site...)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    /// Store directory; overrides store.dir from config
    #[arg(long, global = true)]
    store: Option<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Order lifecycle commands
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Ledger integrity commands
    Ledger {
        #[command(subcommand)]
        cmd: LedgerCmd,
    },

    /// GPS tracker utilities
    Tracker {
        #[command(subcommand)]
        cmd: TrackerCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Create a pending order and print its id + hashes.
    Create {
        #[arg(long)]
        customer_id: String,

        #[arg(long)]
        product_name: String,

        #[arg(long)]
        product_id: Option<String>,

        #[arg(long)]
        quantity: u32,
    },

    /// Pack the order and assign its GPS tracker (pending -> packed).
    Dispatch {
        #[arg(long)]
        order_id: String,

        /// Tracker id; generated from dispatch.tracker_id_prefix when omitted
        #[arg(long)]
        tracker_id: Option<String>,
    },

    /// Advance the order one step (packed -> dispatched, in-transit -> out-for-delivery).
    Status {
        #[arg(long)]
        order_id: String,

        /// Target status, e.g. dispatched
        #[arg(long)]
        status: String,
    },

    /// Submit a signed GPS fix.
    Locate {
        #[arg(long)]
        order_id: String,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        #[arg(long)]
        tracker_id: String,

        /// RFC 3339 timestamp the fix was signed with
        #[arg(long)]
        timestamp: String,

        #[arg(long)]
        signature: String,
    },

    /// Mark the order delivered (out-for-delivery -> delivered).
    Deliver {
        #[arg(long)]
        order_id: String,

        #[arg(long)]
        proof: Option<String>,
    },

    /// Print the order with its ledger history and locations as JSON.
    Show {
        #[arg(long)]
        order_id: String,
    },

    /// Print all orders as a JSON array.
    List,

    /// Print the public authenticity summary.
    Verify {
        #[arg(long)]
        order_id: String,
    },
}

#[derive(Subcommand)]
enum LedgerCmd {
    /// Audit an order's hash chain. Exits non-zero on tampering.
    Verify {
        #[arg(long)]
        order_id: String,
    },
}

#[derive(Subcommand)]
enum TrackerCmd {
    /// Sign a fix with the configured key (device simulation).
    Sign {
        #[arg(long)]
        tracker_id: String,

        #[arg(long, allow_negative_numbers = true)]
        lat: f64,

        #[arg(long, allow_negative_numbers = true)]
        lon: f64,

        /// RFC 3339; defaults to now
        #[arg(long)]
        timestamp: Option<String>,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> Result<()> {
    // Dev-time secrets; real deployments export the variable.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();
    let load = || Context::load(&cli.config_paths, cli.store.as_deref());

    match cli.cmd {
        Commands::ConfigHash { paths } => commands::config_hash(&paths),

        Commands::Order { cmd } => {
            let ctx = load()?;
            match cmd {
                OrderCmd::Create {
                    customer_id,
                    product_name,
                    product_id,
                    quantity,
                } => commands::order::create(&ctx, customer_id, product_name, product_id, quantity),
                OrderCmd::Dispatch {
                    order_id,
                    tracker_id,
                } => commands::order::dispatch(&ctx, &order_id, tracker_id.as_deref()),
                OrderCmd::Status { order_id, status } => {
                    commands::order::status(&ctx, &order_id, &status)
                }
                OrderCmd::Locate {
                    order_id,
                    lat,
                    lon,
                    tracker_id,
                    timestamp,
                    signature,
                } => commands::order::locate(
                    &ctx, &order_id, lat, lon, tracker_id, &timestamp, signature,
                ),
                OrderCmd::Deliver { order_id, proof } => {
                    commands::order::deliver(&ctx, &order_id, proof)
                }
                OrderCmd::Show { order_id } => commands::order::show(&ctx, &order_id),
                OrderCmd::List => commands::order::list(&ctx),
                OrderCmd::Verify { order_id } => commands::order::verify(&ctx, &order_id),
            }
        }

        Commands::Ledger { cmd } => match cmd {
            LedgerCmd::Verify { order_id } => commands::audit::ledger_verify(&load()?, &order_id),
        },

        Commands::Tracker { cmd } => match cmd {
            TrackerCmd::Sign {
                tracker_id,
                lat,
                lon,
                timestamp,
            } => commands::audit::tracker_sign(&load()?, &tracker_id, lat, lon, timestamp.as_deref()),
        },
    }
}
