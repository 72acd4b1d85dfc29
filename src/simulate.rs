//! Load harness that fires randomized submissions at a running server.
//!
//! Orders arrive as a Poisson stream (exponential inter-arrival times). Each
//! one quotes both legs around a Gaussian-drifting mid price, so roughly half
//! the records cross immediately and settle while the rest sit with an open
//! spread. Useful for eyeballing throughput and for checking
//! that the book and trade log stay consistent under sustained traffic.

use rand_distr::{Distribution, Exp, Exp1, Normal};
use reqwest::Client;
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct SimConfig {
    pub api_base: String,
    pub run_secs: Option<u64>,
    pub arrival_rate_hz: f64,
    pub noise_sigma: f64,
    pub mean_qty: f64,
}

async fn send_one_order(
    client: &Client,
    api_base: &str,
    mid_price: f64,
    mean_qty: f64,
) -> anyhow::Result<u64> {
    // sample everything up front so the rng never lives across an await
    let (buyer_qty, buyer_price, seller_price, seller_qty) = {
        let mut rng = rand::rng();
        let qty = |rng: &mut rand::rngs::ThreadRng| {
            let raw: f64 = Exp1.sample(rng);
            (raw * mean_qty).ceil().max(1.0) as u64
        };
        // quote each leg independently around mid; they cross whenever the
        // buyer's draw lands at or above the seller's
        let jitter = Normal::new(0.0, 1.0)?;
        (
            qty(&mut rng),
            (mid_price + jitter.sample(&mut rng)).max(0.01),
            (mid_price + jitter.sample(&mut rng)).max(0.01),
            qty(&mut rng),
        )
    };

    let resp = client
        .post(format!("{}/orders", api_base))
        .json(&json!({
            "buyer_qty": buyer_qty,
            "buyer_price": buyer_price,
            "seller_price": seller_price,
            "seller_qty": seller_qty,
        }))
        .send()
        .await?
        .error_for_status()?;

    let ack = resp.json::<serde_json::Value>().await?;
    Ok(ack["id"].as_u64().unwrap_or(0))
}

/// Drive randomized traffic against the matcher until the duration elapses or
/// `cancel_token` fires (e.g. on Ctrl-C). Prints a book/trade-log summary at
/// the end.
pub async fn run_simulation(cfg: SimConfig, cancel_token: CancellationToken) -> anyhow::Result<()> {
    let client = Client::new();
    //exponential inter-arrival times with rate = arrival_rate_hz
    let ia_dist = Exp::new(cfg.arrival_rate_hz)?;
    //gaussian drift on the mid-price
    let drift = Normal::new(0.0, cfg.noise_sigma)?;

    let mut mid_price = 50.0f64;
    let mut submitted = 0u64;
    let start = Instant::now();

    loop {
        if let Some(max_secs) = cfg.run_secs {
            if start.elapsed().as_secs() >= max_secs {
                break;
            }
        }
        let wait_secs = ia_dist.sample(&mut rand::rng());
        let sleep_fut = sleep(Duration::from_secs_f64(wait_secs));
        tokio::select! {
            _ = cancel_token.cancelled() => {
                tracing::info!("received shutdown, stopping the simulation");
                break;
            }
            _ = sleep_fut => {
                mid_price = (mid_price + drift.sample(&mut rand::rng())).max(1.0);
                let id = send_one_order(&client, &cfg.api_base, mid_price, cfg.mean_qty).await?;
                submitted += 1;
                println!(
                    "[{:.1}s] submitted order {} (mid={:.2}, total={})",
                    start.elapsed().as_secs_f64(),
                    id,
                    mid_price,
                    submitted
                );
            }
        }
    }

    // final snapshot of both stores
    let listing = client
        .get(format!("{}/orders", cfg.api_base))
        .send()
        .await?
        .error_for_status()?
        .json::<serde_json::Value>()
        .await?;
    let pending = listing["pending_orders"]
        .as_array()
        .map(|a| a.len())
        .unwrap_or(0);
    let completed = listing["completed_orders"]
        .as_array()
        .map(|a| a.len())
        .unwrap_or(0);
    println!(
        "--- done --- submitted={} resting={} trades={}",
        submitted, pending, completed
    );
    Ok(())
}
