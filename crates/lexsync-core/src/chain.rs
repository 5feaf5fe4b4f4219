//! Hash chain linking and validation over the default commit order.

use tracing::debug;

use crate::commit::Commit;
use crate::error::{CoreError, Result};

/// Check that `commits` (already in log order) form an unbroken chain that
/// starts from the empty hash.
pub fn validate_commits(commits: &[Commit]) -> Result<()> {
    let mut expected_parent = String::new();
    for commit in commits {
        let recomputed = commit.generate_hash(commit.parent_hash())?;
        if commit.parent_hash() != expected_parent || recomputed != commit.hash() {
            return Err(CoreError::ChainBroken {
                commit: commit.id,
                expected_parent,
                actual_parent: commit.parent_hash().to_string(),
            });
        }
        expected_parent = commit.hash().to_string();
    }
    Ok(())
}

/// Re-link `commits` in order behind `parent_hash`.
///
/// Returns the hash of the last commit (or `parent_hash` when empty).
pub fn link_chain(commits: &mut [Commit], parent_hash: &str) -> Result<String> {
    let mut parent = parent_hash.to_string();
    for commit in commits.iter_mut() {
        commit.set_parent_hash(&parent)?;
        parent = commit.hash().to_string();
    }
    debug!(count = commits.len(), tip = %parent, "relinked commits");
    Ok(parent)
}
