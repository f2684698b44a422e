// EsoxSolutions.FixedPool
// Fixed-capacity, thread-safe async object pool
// Version 1.0.0

// This is just a binary wrapper - the actual library is in lib.rs
// Run the shutdown demo with: cargo run --example shutdown

use esox_fixedpool::{ObjectPool, PoolConfiguration};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.FixedPool v1.0.0 ===");
    println!("Run: cargo run --example shutdown");
    println!();

    println!("Quick Demo:");
    let pool = match ObjectPool::new(
        PoolConfiguration::new()
            .with_count(3)
            .with_constructor(|| Ok::<_, std::io::Error>(Vec::<u8>::with_capacity(1024)))
            .with_destructor(|buf| println!("  Destroying buffer of capacity {}", buf.capacity())),
    ) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("  Failed to create pool: {}", e);
            return;
        }
    };

    match pool.get(&CancellationToken::new()).await {
        Ok(buf) => {
            println!("  Got buffer, idle now: {}", pool.idle_count());
            pool.put(buf);
        }
        Err(e) => eprintln!("  Failed to get object: {}", e),
    }

    println!("  Idle after return: {}", pool.idle_count());
    pool.stop().await;
}
