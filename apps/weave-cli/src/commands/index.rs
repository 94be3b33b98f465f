// index.rs — `weave index`: refresh the embedding store.

use std::sync::Arc;

use weave_index::{Embedder, Inventory, OllamaEmbedder};

use crate::config::WeaveConfig;

pub async fn execute(
    config: &WeaveConfig,
    force_rebuild: bool,
    recompute_digests: bool,
) -> anyhow::Result<bool> {
    let inventory_path = config.inventory_path();
    let mut inventory = Inventory::load(&inventory_path)?;

    if recompute_digests {
        let target = config.target_root()?;
        let updated = inventory.recompute_digests(&target);
        inventory.save(&inventory_path)?;
        println!("Recomputed {} code digest(s).", updated);
    }

    let store = config.embedding_store();
    if force_rebuild {
        tracing::info!(store = %store.path().display(), "force rebuild, removing embedding store");
        store.remove()?;
    }

    let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::new(&config.embedding)?);
    let outcome = store
        .update(&inventory, embedder, &config.embedding)
        .await?;

    println!(
        "Embedding store {}: {} reused, {} generated, {} dropped.",
        store.path().display(),
        outcome.reused,
        outcome.generated,
        outcome.dropped
    );
    if !outcome.failed.is_empty() {
        println!(
            "{} fragment(s) could not be embedded and will be retried next run:",
            outcome.failed.len()
        );
        for id in &outcome.failed {
            println!("  {}", id);
        }
    }
    Ok(true)
}
