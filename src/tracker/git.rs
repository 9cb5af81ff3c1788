//! Git snapshotting for `Phase.commits` tracking.
//!
//! Trimmed from the upstream `GitTracker`: `snapshot_before`/`head_sha` are
//! kept verbatim (the commit-before-phase idiom this spec still needs);
//! `compute_changes`/`get_full_diffs` are dropped — this spec has no use for
//! full diff content or file-change summaries, only an ordered list of short
//! commit identifiers per phase. `list_commits_since` is a new addition
//! extending the existing `git2` usage with a `Revwalk` (not grounded on a
//! specific pack file; a natural extension of the established idiom).

use anyhow::{Context, Result};
use git2::{Repository, Signature};
use std::path::Path;

pub struct GitTracker {
    repo: Repository,
}

impl GitTracker {
    pub fn new(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("failed to open git repository")?;
        Ok(Self { repo })
    }

    /// Commit the current tree before a phase starts, returning the new commit sha.
    pub fn snapshot_before(&self, phase: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now("autopilot", "autopilot@localhost")?;

        let commit_id = if let Some(parent) = self.get_head_commit() {
            self.repo.commit(
                Some("HEAD"),
                &sig,
                &sig,
                &format!("[autopilot] snapshot before phase {phase}"),
                &tree,
                &[&parent],
            )?
        } else {
            self.repo.commit(
                Some("HEAD"),
                &sig,
                &sig,
                &format!("[autopilot] snapshot before phase {phase}"),
                &tree,
                &[],
            )?
        };

        Ok(commit_id.to_string())
    }

    fn get_head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo.head().ok().and_then(|head| head.peel_to_commit().ok())
    }

    pub fn head_sha(&self) -> Option<String> {
        self.get_head_commit().map(|c| c.id().to_string())
    }

    /// The current branch's short name, or `"HEAD"` if detached.
    pub fn current_branch(&self) -> String {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.shorthand().map(String::from))
            .unwrap_or_else(|| "HEAD".to_string())
    }

    /// Short commit ids reachable from HEAD but not from `since_sha`, oldest first.
    pub fn list_commits_since(&self, since_sha: &str) -> Result<Vec<String>> {
        let since_oid = git2::Oid::from_str(since_sha)?;
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push_head()?;
        revwalk.set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::REVERSE)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            if oid == since_oid {
                continue;
            }
            commits.push(short_sha(&oid.to_string()));
        }
        Ok(commits)
    }
}

fn short_sha(full: &str) -> String {
    full.chars().take(8).collect()
}
