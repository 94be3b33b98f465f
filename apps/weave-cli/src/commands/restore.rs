// restore.rs — `weave restore`: copy backed-up originals back.

use std::path::Path;

use weave_changeset::restore_from_backup;

use crate::config::WeaveConfig;

pub fn execute(config: &WeaveConfig, backup_dir: &Path, files: &[String]) -> anyhow::Result<bool> {
    let target_root = config.target_root()?;
    let only = (!files.is_empty()).then_some(files);
    let outcome = restore_from_backup(backup_dir, &target_root, only)?;

    println!(
        "Restored {} file(s) into {}.",
        outcome.restored.len(),
        target_root.display()
    );
    for path in &outcome.missing {
        println!("  not in backup: {}", path);
    }
    for (path, reason) in &outcome.failed {
        println!("  FAILED {}: {}", path, reason);
    }
    Ok(outcome.success())
}
