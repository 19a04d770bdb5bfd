//! Round-trip demo against a live store at 127.0.0.1:6379.
//!
//! Run with `RUST_LOG=kvpool=debug cargo run --example demo`.

use std::time::Duration;

use kvpool::{ClientConfig, PoolRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let registry = PoolRegistry::new();
    let client = registry
        .get_or_create(
            "demo",
            ClientConfig {
                max_clients: 4,
                ..ClientConfig::default()
            },
        )
        .await?;

    client
        .set_with_ttl(b"demo:key", b"hello", Duration::from_secs(30))
        .await?;
    let value = client.get(b"demo:key").await?;
    println!(
        "demo:key = {:?}",
        value.map(|v| String::from_utf8_lossy(&v).into_owned())
    );
    println!("ttl      = {:?}", client.ttl(b"demo:key").await?);

    let counter = client.incr(b"demo:counter").await?;
    println!("counter  = {counter}");
    println!("pool     = {:?}", client.status());

    registry.shutdown_all().await;
    Ok(())
}
