//! Typed subscriptions over the in-memory transport.
//!
//! Subscribes to `orders` through both entry points, publishes a few orders
//! and one malformed payload, and prints what the handlers and the hub's
//! fault channel observe.
//!
//! Run with: RUST_LOG=typed_sub=debug cargo run --example orders_memory

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

use typed_sub::{
    create_memory_transport_with_hub, Channel, Codec, JsonCodec, MemoryHub, Result,
    TransportConfig, TypedSubscriber,
};

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: u64,
    sku: String,
    quantity: u32,
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let (hub, mut faults) = MemoryHub::with_fault_channel();
    let transport =
        create_memory_transport_with_hub(TransportConfig::memory("orders-demo"), hub).await?;

    let subscriber = TypedSubscriber::new(transport.clone())?;

    subscriber
        .subscribe_async("orders", |order: Order| {
            println!("[async]    order #{} {} x{}", order.id, order.sku, order.quantity);
        })?
        .await?;

    // Blocks this worker until the transport has registered the subscription.
    subscriber.subscribe("orders", |order: Order| {
        println!("[blocking] order #{} {} x{}", order.id, order.sku, order.quantity);
    })?;

    let orders = Channel::new("orders")?;

    for (id, sku) in [(1, "KB-101"), (2, "MS-220"), (3, "HD-4K")] {
        let order = Order {
            id,
            sku: sku.into(),
            quantity: 1,
        };
        transport
            .publish(orders.clone(), JsonCodec.encode(&order)?)
            .await?;
    }

    transport
        .publish(orders, bytes::Bytes::from_static(b"not-json"))
        .await?;

    // Each of the two subscriptions reports the malformed payload once.
    for _ in 0..2 {
        match tokio::time::timeout(Duration::from_secs(1), faults.recv()).await {
            Ok(Some(fault)) => println!("[fault]    {}", fault.error),
            _ => break,
        }
    }

    transport.close().await
}
