// apply.rs — `weave apply`: finalize an existing apply plan.

use std::path::Path;

use weave_changeset::Finalizer;

use crate::config::WeaveConfig;

pub fn execute(config: &WeaveConfig, plan: &Path) -> anyhow::Result<bool> {
    let target_root = config.target_root()?;
    let finalizer = Finalizer::new(config.workspace_root(), &target_root);
    let outcome = finalizer.apply_file(plan)?;

    if outcome.applied.is_empty() && outcome.failed.is_empty() {
        println!("Apply plan lists no files; nothing to do.");
        return Ok(true);
    }
    println!(
        "Applied {} file(s) to {}.",
        outcome.applied.len(),
        target_root.display()
    );
    if let Some(backup) = &outcome.backup_dir {
        println!("Originals backed up to {}", backup.display());
    }
    for (path, reason) in &outcome.failed {
        println!("  FAILED {}: {}", path, reason);
    }
    if !outcome.success() {
        println!("Partially applied; restore with `weave restore <backup>` if needed.");
    }
    Ok(outcome.success())
}
