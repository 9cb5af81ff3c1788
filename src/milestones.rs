//! Read-only milestone markdown parsing.
//!
//! Out of scope for payload fidelity (the spec treats milestone markdown
//! parsing as an external collaborator, specified only at its contract
//! boundary: `{current, shipped}`), so this stays intentionally small: look
//! for a heading containing "current" or "shipped" and collect the bullet
//! list underneath it.

use serde::Serialize;
use std::path::Path;

const CANDIDATE_FILES: [&str; 3] = ["MILESTONES.md", "PROJECT.md", "ROADMAP.md"];

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Milestones {
    pub current: Vec<String>,
    pub shipped: Vec<String>,
}

/// Try each candidate file in order; `None` if none exist or none parse to
/// anything.
pub fn load(project_dir: &Path) -> Option<Milestones> {
    for name in CANDIDATE_FILES {
        let path = project_dir.join(name);
        if let Ok(content) = std::fs::read_to_string(&path) {
            let parsed = parse(&content);
            if !parsed.current.is_empty() || !parsed.shipped.is_empty() {
                return Some(parsed);
            }
        }
    }
    None
}

fn parse(content: &str) -> Milestones {
    let mut milestones = Milestones::default();
    let mut section: Option<bool> = None; // Some(true) = current, Some(false) = shipped

    for line in content.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix('#') {
            let heading = heading.trim_start_matches('#').trim().to_lowercase();
            section = if heading.contains("current") {
                Some(true)
            } else if heading.contains("shipped") || heading.contains("done") {
                Some(false)
            } else {
                None
            };
            continue;
        }

        let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) else {
            continue;
        };
        match section {
            Some(true) => milestones.current.push(item.trim().to_string()),
            Some(false) => milestones.shipped.push(item.trim().to_string()),
            None => {}
        }
    }

    milestones
}
