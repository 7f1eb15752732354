// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live reload demo.
//!
//! This demo shows:
//! - Serving a YAML file that is re-read on an interval
//! - Watching a key and reacting to each change
//! - Falling back to a static default when the file drops the key
//!
//! To run it:
//! ```bash
//! cargo run --example live_reload --features reload
//! ```

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use stratacfg::prelude::*;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== stratacfg: Live Reload ===\n");

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.yaml");
    tokio::fs::write(&path, "app:\n  workers: 2\n").await?;
    println!("Config file: {}", path.display());

    let options = ReloadOptions::default().with_poll_interval(Duration::from_millis(200));
    let file = Arc::new(ReloadingFileProvider::yaml(&path, options).await?);
    let shutdown = CancellationToken::new();
    let poller = file.spawn(shutdown.clone());

    let reader = ConfigReader::builder()
        .with_watchable_provider(file)
        .with_provider(InMemoryProvider::new("defaults", [("app.workers", 1i64)]))
        .build()?;

    let mut workers = reader.scoped("app").watch_as::<u32>("workers")?;
    let watcher = tokio::spawn(async move {
        while let Some(update) = workers.next().await {
            match update {
                Ok(Some(n)) => println!("workers = {}", n),
                Ok(None) => println!("workers is not set"),
                Err(e) => println!("workers update rejected: {}", e),
            }
        }
    });

    for content in ["app:\n  workers: 8\n", "app:\n  workers: lots\n", "app: {}\n"] {
        tokio::time::sleep(Duration::from_millis(500)).await;
        println!("\nWriting:\n{}", content);
        let staged = path.with_extension("staged");
        tokio::fs::write(&staged, content).await?;
        tokio::fs::rename(&staged, &path).await?;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;

    shutdown.cancel();
    poller.await.ok();
    watcher.abort();

    println!("\n=== Demo Complete ===");
    Ok(())
}
