//! Order API - HTTP intake for synchronous and queued orders
//!
//! Synchronous orders are paid for inline behind the single-slot gate. Queued
//! orders are published to NATS JetStream for the order-processor binary, or,
//! with `--broker memory`, to an in-process queue drained by embedded workers.

use clap::{Parser, ValueEnum};
use std::sync::Arc;

use order_relay::api::{self, AppState};
use order_relay::telemetry;
use order_relay::{
    Broker, ConsumerConfig, InMemoryBroker, NatsBroker, NatsConfig, OrderService,
    PaymentProcessor, ShutdownCoordinator, SimulatedPayment, WorkerPool,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BrokerKind {
    /// NATS JetStream (NATS_URL, NATS_STREAM, ORDER_SUBJECT)
    Nats,
    /// In-process queue with embedded workers (configured like order-processor)
    Memory,
}

#[derive(Parser)]
#[command(name = "order-api")]
#[command(version, about = "HTTP order intake with a serialized payment gate", long_about = None)]
struct Cli {
    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Where queued orders go
    #[arg(long, env = "BROKER", value_enum, default_value_t = BrokerKind::Nats)]
    broker: BrokerKind,

    /// Simulated payment latency in milliseconds
    #[arg(long, env = "PAYMENT_LATENCY_MS", default_value_t = 3000)]
    payment_latency_ms: u64,

    /// Extra random payment latency in milliseconds
    #[arg(long, env = "PAYMENT_JITTER_MS", default_value_t = 0)]
    payment_jitter_ms: u64,

    /// Queue drained by the embedded workers (memory broker only)
    #[arg(long, env = "ORDER_QUEUE", default_value = "order-processor")]
    queue: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    telemetry::init_tracing();

    let cli = Cli::parse();
    let (shutdown, _signals) = ShutdownCoordinator::install()?;

    let payments: Arc<dyn PaymentProcessor> = Arc::new(SimulatedPayment::from_millis(
        cli.payment_latency_ms,
        cli.payment_jitter_ms,
    ));
    let nats_config = NatsConfig::default();
    let topic = nats_config.order_subject.clone();

    let mut embedded_workers = None;
    let broker: Arc<dyn Broker> = match cli.broker {
        BrokerKind::Nats => {
            let nats = NatsBroker::connect(nats_config).await?;
            Arc::new(nats)
        }
        BrokerKind::Memory => {
            let memory = Arc::new(InMemoryBroker::new());
            memory.route(topic.clone(), cli.queue.clone());

            let pool = WorkerPool::new(
                memory.clone(),
                payments.clone(),
                cli.queue.clone(),
                ConsumerConfig::from_env(),
            )?;
            embedded_workers = Some(tokio::spawn(pool.run(shutdown.token())));
            tracing::info!("Using in-memory broker with embedded workers on '{}'", cli.queue);
            memory
        }
    };

    let orders = Arc::new(OrderService::new(payments, broker, topic.clone()));
    let app = api::router(AppState { orders });

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Order API listening on {}", addr);
    tracing::info!("Publishing queued orders to '{}'", topic);

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    if let Some(workers) = embedded_workers {
        let stats = workers.await?;
        tracing::info!(?stats, "Embedded workers drained");
    }

    tracing::info!("Order API stopped");
    Ok(())
}
