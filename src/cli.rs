use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::{
    api::router,
    engine,
    orders::OrderRequest,
    simulate::{SimConfig, run_simulation},
    state::AppState,
    utils::shutdown_token,
};

/// CLI for the order matcher
#[derive(Parser)]
#[command(name = "matchbook")]
#[command(version, about = "A continuous double-auction order matcher")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: String,
        #[arg(long, default_value = "matchbook.db")]
        db: PathBuf,
        /// Drop all stored orders and trades on startup
        #[arg(long)]
        fresh: bool,
    },
    /// Submit one order against the store directly and run a matching pass
    Submit {
        #[arg(long, default_value = "matchbook.db")]
        db: PathBuf,
        buyer_qty: u64,
        buyer_price: f64,
        seller_price: f64,
        seller_qty: u64,
    },
    /// Print the resting orders
    Book {
        #[arg(long, default_value = "matchbook.db")]
        db: PathBuf,
    },
    /// Print the trade log
    Trades {
        #[arg(long, default_value = "matchbook.db")]
        db: PathBuf,
    },
    /// Fire randomized orders at a running server
    Simulate {
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        api_base: String,
        /// Stop after this many seconds; runs until Ctrl-C if unset
        #[arg(long)]
        run_secs: Option<u64>,
        /// Poisson arrival rate for submissions, per second
        #[arg(long, default_value_t = 2.0)]
        rate_hz: f64,
        /// Std-dev of the per-order mid-price drift
        #[arg(long, default_value_t = 0.5)]
        noise_sigma: f64,
        /// Average leg quantity
        #[arg(long, default_value_t = 4.0)]
        mean_qty: f64,
    },
}

pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve { addr, db, fresh } => {
            let state = AppState::new(&db, fresh)?;
            let app = router(state);
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("listening on {addr}, store at {}", db.display());
            let token = shutdown_token();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await?;
        }
        Commands::Submit {
            db,
            buyer_qty,
            buyer_price,
            seller_price,
            seller_qty,
        } => {
            let state = AppState::new(&db, false)?;
            let book = state.book.lock().unwrap();
            let log = state.trade_log.lock().unwrap();
            let id = book.insert(&OrderRequest {
                buyer_qty,
                buyer_price,
                seller_price,
                seller_qty,
            })?;
            println!("order accepted with id {id}");
            let trades = engine::match_once(&book, &log);
            if trades.is_empty() {
                println!("no trades occurred");
            } else {
                for t in trades {
                    println!("trade {}: qty {} at {}", t.id, t.qty, t.price);
                }
            }
        }
        Commands::Book { db } => {
            let state = AppState::new(&db, false)?;
            let book = state.book.lock().unwrap();
            println!("------ Pending Orders ------");
            for row in book.pending()? {
                println!(
                    "#{}  buy {} @ {}  |  sell {} @ {}",
                    row.id, row.buyer_qty, row.buyer_price, row.seller_qty, row.seller_price
                );
            }
            println!("----------------------------");
        }
        Commands::Trades { db } => {
            let state = AppState::new(&db, false)?;
            let log = state.trade_log.lock().unwrap();
            println!("------ Trade Log ------");
            for t in log.all()? {
                println!(
                    "#{}  qty {} at {}  (buy {} @ {} / sell {} @ {})",
                    t.id, t.qty, t.price, t.buyer_qty, t.buyer_price, t.seller_qty, t.seller_price
                );
            }
            println!("-----------------------");
        }
        Commands::Simulate {
            api_base,
            run_secs,
            rate_hz,
            noise_sigma,
            mean_qty,
        } => {
            let cfg = SimConfig {
                api_base,
                run_secs,
                arrival_rate_hz: rate_hz,
                noise_sigma,
                mean_qty,
            };
            run_simulation(cfg, shutdown_token()).await?;
        }
    }
    Ok(())
}
