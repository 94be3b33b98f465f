// select.rs — `weave select`: show the fragments closest to a request.

use std::sync::Arc;

use weave_index::{FragmentSelector, OllamaEmbedder};

use crate::config::WeaveConfig;

pub async fn execute(
    config: &WeaveConfig,
    request: &str,
    top_k: Option<i64>,
    threshold: Option<f32>,
) -> anyhow::Result<bool> {
    let mut selector = FragmentSelector::new(
        config.embedding_store(),
        config.inventory_path(),
        Arc::new(OllamaEmbedder::new(&config.embedding)?),
        config.embedding.clone(),
    );
    let selection = selector
        .select(
            request,
            top_k.unwrap_or(config.selection.top_k),
            threshold.or(config.selection.threshold),
        )
        .await?;

    if selection.is_empty() {
        println!("No relevant fragments found.");
        return Ok(true);
    }
    println!("{:>10}  FRAGMENT", "DISTANCE");
    for (id, distance) in selection.ids.iter().zip(&selection.distances) {
        println!("{:>10.4}  {}", distance, id);
    }
    Ok(true)
}
