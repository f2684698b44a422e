//! Concurrent usage and graceful shutdown

use esox_fixedpool::{ObjectPool, PoolConfiguration, PoolError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

struct Connection {
    id: usize,
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.FixedPool - Shutdown Example ===\n");

    let next_id = Arc::new(AtomicUsize::new(0));
    let pool = ObjectPool::new(
        PoolConfiguration::new()
            .with_count(3)
            .with_constructor(move || {
                let id = next_id.fetch_add(1, Ordering::SeqCst);
                println!("   Opening connection {}", id);
                Ok::<_, std::io::Error>(Connection { id })
            })
            .with_destructor(|conn: Connection| println!("   Closing connection {}", conn.id)),
    )
    .expect("pool creation");

    // Example 1: more tasks than connections
    println!("1. Concurrent access:");
    let shutdown = CancellationToken::new();
    let mut handles = vec![];

    for task in 0..8 {
        let pool = pool.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            match pool.get_object(&shutdown).await {
                Ok(conn) => {
                    println!("   Task {} using connection {}", task, conn.id);
                    sleep(Duration::from_millis(50)).await;
                }
                Err(PoolError::StoppingOrStopped) => println!("   Task {} refused: pool stopping", task),
                Err(e) => println!("   Task {} failed: {}", task, e),
            }
        }));
    }

    // Example 2: stop while connections are still borrowed
    sleep(Duration::from_millis(20)).await;
    println!("\n2. Stopping with {} borrowed:", pool.borrowed_count());
    pool.stop().await;

    for handle in handles {
        handle.await.expect("task panicked");
    }

    let metrics = pool.get_metrics();
    println!("\n   Retrieved: {}", metrics.total_retrieved);
    println!("   Rejected:  {}", metrics.rejected_waits);
    println!("   Destroyed: {}", metrics.total_destroyed);
}
