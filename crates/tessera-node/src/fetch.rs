//! Source checkout for bundles with a fetch spec.

use crate::error::{NodeError, NodeResult};
use std::path::{Path, PathBuf};
use tessera_registry::SourceFetchSpec;
use tokio::process::Command;
use tracing::info;
use uuid::Uuid;

/// Clone the spec's repository into a fresh directory under
/// `scratch_root` and return the directory the worker should see
/// (honouring `subdirectory`).
///
/// A pinned `commit` wins over `branch`.
pub async fn fetch_source(spec: &SourceFetchSpec, scratch_root: &Path) -> NodeResult<PathBuf> {
    tokio::fs::create_dir_all(scratch_root).await?;
    let checkout = scratch_root.join(Uuid::new_v4().to_string());

    let mut clone = Command::new("git");
    clone.arg("clone");
    if spec.commit.is_none() {
        if let Some(branch) = &spec.branch {
            clone.arg("--branch").arg(branch).arg("--single-branch");
        }
    }
    clone.arg(&spec.url).arg(&checkout);
    run_git(clone).await?;

    if let Some(commit) = &spec.commit {
        let mut checkout_cmd = Command::new("git");
        checkout_cmd
            .args(["-C"])
            .arg(&checkout)
            .args(["checkout", commit]);
        run_git(checkout_cmd).await?;
    }

    let dir = match &spec.subdirectory {
        Some(subdirectory) => checkout.join(subdirectory),
        None => checkout,
    };
    if !dir.is_dir() {
        return Err(NodeError::Fetch(format!(
            "checkout of {} has no directory {}",
            spec.url,
            dir.display()
        )));
    }

    info!(url = %spec.url, dir = %dir.display(), "Materialised worker source");
    Ok(dir)
}

async fn run_git(mut command: Command) -> NodeResult<()> {
    let output = command
        .output()
        .await
        .map_err(|e| NodeError::Fetch(format!("failed to spawn git: {}", e)))?;

    if !output.status.success() {
        return Err(NodeError::Fetch(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(())
}
