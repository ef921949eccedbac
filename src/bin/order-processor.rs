//! Order processor - long-polling worker pool for queued orders
//!
//! Pulls order envelopes from a durable JetStream consumer, pays for up to
//! NUM_WORKERS orders at once and acknowledges each message after its
//! payment. Stops polling on SIGINT/SIGTERM and lets in-flight orders finish.

use clap::Parser;
use std::sync::Arc;

use order_relay::telemetry;
use order_relay::{
    ConsumerConfig, NatsBroker, NatsConfig, ShutdownCoordinator, SimulatedPayment, WorkerPool,
};

#[derive(Parser)]
#[command(name = "order-processor")]
#[command(version, about = "Queue worker pool for asynchronous orders", long_about = None)]
struct Cli {
    /// Durable consumer the workers pull from
    #[arg(long, env = "NATS_CONSUMER", default_value = "order-processor")]
    queue: String,

    /// Simulated payment latency in milliseconds
    #[arg(long, env = "PAYMENT_LATENCY_MS", default_value_t = 3000)]
    payment_latency_ms: u64,

    /// Extra random payment latency in milliseconds
    #[arg(long, env = "PAYMENT_JITTER_MS", default_value_t = 0)]
    payment_jitter_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = ConsumerConfig::from_env();
    let nats_config = NatsConfig::default();

    tracing::info!("Order Processor starting...");
    tracing::info!(
        "Stream: {} (subject {}), consumer: {}",
        nats_config.stream_name,
        nats_config.order_subject,
        cli.queue
    );
    tracing::info!("Number of workers: {}", config.workers);

    // Broker failures at startup are fatal
    let broker = Arc::new(NatsBroker::connect(nats_config).await?);
    let payments = Arc::new(SimulatedPayment::from_millis(
        cli.payment_latency_ms,
        cli.payment_jitter_ms,
    ));

    let (shutdown, _signals) = ShutdownCoordinator::install()?;
    let pool = WorkerPool::new(broker, payments, cli.queue, config)?;

    let stats = pool.run(shutdown.token()).await;
    tracing::info!(?stats, "Order processor exited");

    Ok(())
}
