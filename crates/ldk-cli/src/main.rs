use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ldk")]
#[command(about = "Lead desk operator CLI", long_about = None)]
struct Cli {
    /// Config layers in merge order (falls back to LDK_CONFIG, then defaults)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> local overrides)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Order lifecycle commands
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Lead pool reports
    Leads {
        #[command(subcommand)]
        cmd: LeadsCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
pub(crate) enum OrderCmd {
    /// Create an order and allocate its full quantity.
    Create {
        #[arg(long)]
        order_number: String,

        /// Comma-separated state codes, in priority order (e.g. "FL,TX")
        #[arg(long)]
        states: String,

        #[arg(long)]
        quantity: i64,

        /// Per-state caps, e.g. "FL=3,TX=4"
        #[arg(long)]
        thresholds: Option<String>,

        #[arg(long)]
        product_name: Option<String>,

        /// Storefront order reference checked by the one-time guard
        #[arg(long)]
        external_ref: Option<String>,
    },

    /// Allocate the outstanding quantity of an active order.
    Fulfill {
        #[arg(long)]
        id: i64,
    },

    /// Delete an order and return its leads to stock.
    Delete {
        #[arg(long)]
        id: i64,

        /// Acknowledge that the order's leads are released.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },

    /// Print one order with per-state progress.
    Show {
        #[arg(long)]
        id: i64,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Print a page of orders, newest first.
    List {
        #[arg(long, default_value_t = 1)]
        page: i64,
    },

    /// Write the leads of a fulfilled order as CSV.
    Export {
        #[arg(long)]
        id: i64,

        /// Output file (stdout when omitted)
        #[arg(long)]
        out: Option<String>,
    },
}

#[derive(Subcommand)]
enum LeadsCmd {
    /// Free leads per state.
    Stock,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = ldk_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = ldk_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    ldk_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = ldk_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Order { cmd } => {
            commands::order::run(&cli.config_paths, cmd).await?;
        }

        Commands::Leads { cmd } => match cmd {
            LeadsCmd::Stock => {
                let ctx = commands::CliContext::connect(&cli.config_paths).await?;
                let stock = ctx.orders.stock().await?;
                let total: i64 = stock.iter().map(|s| s.free_leads).sum();
                for s in &stock {
                    println!("state={} free_leads={}", s.state, s.free_leads);
                }
                println!("total_free={}", total);
            }
        },
    }

    Ok(())
}
