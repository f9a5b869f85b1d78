//! Block store demo
//!
//! Usage: `cli [config.json]`
//!
//! Starts the readers first, so they park until the writers catch up, then
//! lets several writers store labelled blocks concurrently. Without a config
//! file, a 16-byte block file store in the temp directory is used.

use blockstore::{BlockStore, StoreConfig, StoreError};
use std::sync::Arc;
use tracing::{info, warn};

const WRITERS: usize = 3;
const BLOCKS_PER_WRITER: usize = 4;
const DEFAULT_BLOCK_LENGTH: u32 = 16;

fn load_config() -> Result<StoreConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let file = std::fs::File::open(&path)?;
            Ok(StoreConfig::from_reader(file)?)
        }
        None => Ok(StoreConfig::new(
            std::env::temp_dir().join("blockstore-demo.dat"),
            DEFAULT_BLOCK_LENGTH,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    info!(?config, "opening store");
    let store = Arc::new(BlockStore::from_config(&config)?);

    // Readers block inside `read`, keep them off the async workers
    let readers: Vec<_> = (0..WRITERS * BLOCKS_PER_WRITER)
        .map(|_| {
            let store = Arc::clone(&store);
            tokio::task::spawn_blocking(move || store.read())
        })
        .collect();

    let writers: Vec<_> = (0..WRITERS)
        .map(|writer| {
            let store = Arc::clone(&store);
            tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
                for n in 0..BLOCKS_PER_WRITER {
                    let sequence = store.write(format!("w{writer}/block{n}").as_bytes())?;
                    info!(writer, sequence = sequence.id(), "stored");
                }
                Ok(())
            })
        })
        .collect();

    let mut failed = false;
    for writer in writers {
        if let Err(e) = writer.await? {
            warn!(error = %e, "writer failed");
            failed = true;
        }
    }
    if failed {
        // Some read slots will never be filled; release their readers
        store.close()?;
    }

    for reader in readers {
        match reader.await? {
            Ok(block) => {
                let text = String::from_utf8_lossy(&block.data);
                info!(
                    sequence = block.sequence.id(),
                    data = %text.trim_end_matches('\0'),
                    "consumed"
                );
            }
            Err(e) => warn!(error = %e, "reader failed"),
        }
    }

    store.close()?;
    info!("Program completed");
    Ok(())
}
