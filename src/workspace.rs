// ABOUTME: Gathers git branch and working-tree status for the session banner.
// ABOUTME: Shells out to git with a short timeout; any failure degrades to no info.

use crate::traits::DmChannel;
use std::path::Path;
use std::time::Duration;

const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Working-tree change counts from `git status --porcelain`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkTreeStats {
    pub modified: usize,
    pub added: usize,
    pub deleted: usize,
    pub renamed: usize,
    pub untracked: usize,
}

impl WorkTreeStats {
    pub fn is_clean(&self) -> bool {
        *self == WorkTreeStats::default()
    }
}

async fn run_git(cwd: &Path, args: &[&str]) -> Option<String> {
    let output = tokio::time::timeout(
        GIT_TIMEOUT,
        tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .output(),
    )
    .await
    .ok()?
    .ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Current branch name, or a short commit hash when detached.
/// None when `cwd` is not a git repository or git is unavailable.
pub async fn git_branch(cwd: &Path) -> Option<String> {
    let branch = run_git(cwd, &["rev-parse", "--abbrev-ref", "HEAD"]).await?;
    let branch = branch.trim();
    if branch.is_empty() {
        return None;
    }
    if branch == "HEAD" {
        // Detached head; show the commit instead
        let hash = run_git(cwd, &["rev-parse", "--short", "HEAD"]).await?;
        let hash = hash.trim();
        if hash.is_empty() {
            return None;
        }
        return Some(format!("detached @ {}", hash));
    }
    Some(branch.to_string())
}

/// Working-tree stats, or None when status could not be read
pub async fn git_status(cwd: &Path) -> Option<WorkTreeStats> {
    let output = run_git(cwd, &["status", "--porcelain"]).await?;
    Some(parse_porcelain(&output))
}

/// Parse `git status --porcelain` output into change counts
pub fn parse_porcelain(output: &str) -> WorkTreeStats {
    let mut stats = WorkTreeStats::default();
    for line in output.lines() {
        if line.len() < 2 {
            continue;
        }
        let code = &line[..2];
        if code == "??" {
            stats.untracked += 1;
            continue;
        }
        if code.starts_with('R') {
            stats.renamed += 1;
            continue;
        }
        let mut chars = code.chars();
        let index = chars.next().unwrap_or(' ');
        let worktree = chars.next().unwrap_or(' ');
        match index {
            'M' => stats.modified += 1,
            'A' => stats.added += 1,
            'D' => stats.deleted += 1,
            _ => {}
        }
        match worktree {
            'M' => stats.modified += 1,
            'D' => stats.deleted += 1,
            _ => {}
        }
    }
    stats
}

/// Replace the home directory prefix with `~` for display
pub fn shorten_path(path: &Path) -> String {
    let display = path.display().to_string();
    if let Ok(home) = std::env::var("HOME") {
        if !home.is_empty() {
            if let Some(rest) = display.strip_prefix(&home) {
                if rest.is_empty() {
                    return "~".to_string();
                }
                if rest.starts_with('/') {
                    return format!("~{}", rest);
                }
            }
        }
    }
    display
}

/// Format the one-time banner describing where the session is working
pub fn format_workspace_info(
    cwd: &Path,
    branch: Option<&str>,
    stats: Option<&WorkTreeStats>,
) -> String {
    let mut lines = vec![format!("📍 Working in `{}`", shorten_path(cwd))];
    match branch {
        None => lines.push("```\nnot a git repository\n```".to_string()),
        Some(branch) => {
            let status = match stats {
                Some(stats) if !stats.is_clean() => {
                    let mut parts = Vec::new();
                    if stats.modified > 0 {
                        parts.push(format!("{} modified", stats.modified));
                    }
                    if stats.added > 0 {
                        parts.push(format!("{} added", stats.added));
                    }
                    if stats.deleted > 0 {
                        parts.push(format!("{} deleted", stats.deleted));
                    }
                    if stats.renamed > 0 {
                        parts.push(format!("{} renamed", stats.renamed));
                    }
                    if stats.untracked > 0 {
                        parts.push(format!("{} untracked", stats.untracked));
                    }
                    parts.join(", ")
                }
                _ => "clean".to_string(),
            };
            lines.push(format!("```\nbranch: {}\nstatus: {}\n```", branch, status));
        }
    }
    lines.join("\n")
}

/// Send the workspace banner for `cwd`, swallowing every failure.
/// The banner is informational; it must never affect the session.
pub async fn notify_workspace_info(channel: &dyn DmChannel, cwd: &Path) {
    let branch = git_branch(cwd).await;
    let stats = match branch {
        Some(_) => git_status(cwd).await,
        None => None,
    };
    let banner = format_workspace_info(cwd, branch.as_deref(), stats.as_ref());
    if let Err(e) = channel.send(&banner).await {
        tracing::debug!(channel = %channel.id(), error = %e, "Failed to send workspace banner");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_porcelain_counts_each_kind() {
        let output = " M src/main.rs\nM  src/lib.rs\nA  new.rs\n D gone.rs\nR  a.rs -> b.rs\n?? scratch.txt\n";
        let stats = parse_porcelain(output);
        assert_eq!(stats.modified, 2);
        assert_eq!(stats.added, 1);
        assert_eq!(stats.deleted, 1);
        assert_eq!(stats.renamed, 1);
        assert_eq!(stats.untracked, 1);
    }

    #[test]
    fn test_parse_porcelain_staged_and_unstaged_same_file() {
        // "MM" means staged modification plus further worktree changes
        let stats = parse_porcelain("MM src/main.rs\n");
        assert_eq!(stats.modified, 2);
    }

    #[test]
    fn test_parse_porcelain_empty_is_clean() {
        assert!(parse_porcelain("").is_clean());
    }

    #[test]
    fn test_format_non_repo() {
        let banner = format_workspace_info(&PathBuf::from("/tmp/work"), None, None);
        assert!(banner.contains("📍 Working in"));
        assert!(banner.contains("not a git repository"));
    }

    #[test]
    fn test_format_clean_repo() {
        let banner = format_workspace_info(
            &PathBuf::from("/tmp/work"),
            Some("main"),
            Some(&WorkTreeStats::default()),
        );
        assert!(banner.contains("branch: main"));
        assert!(banner.contains("status: clean"));
    }

    #[test]
    fn test_format_dirty_repo() {
        let stats = WorkTreeStats {
            modified: 3,
            untracked: 1,
            ..Default::default()
        };
        let banner =
            format_workspace_info(&PathBuf::from("/tmp/work"), Some("feature/x"), Some(&stats));
        assert!(banner.contains("branch: feature/x"));
        assert!(banner.contains("3 modified, 1 untracked"));
    }

    #[test]
    fn test_shorten_path_outside_home() {
        assert_eq!(shorten_path(&PathBuf::from("/opt/data")), "/opt/data");
    }
}
