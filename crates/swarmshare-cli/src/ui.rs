//! UI utilities for the swarmshare CLI.

use swarmshare_core::wire::{ActivePeer, DirectoryEntry};

const RULE_WIDTH: usize = 60;

/// Print the version banner.
pub fn print_banner() {
    println!();
    println!("Swarmshare v{}", swarmshare_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
}

/// Print a horizontal rule.
pub fn rule() {
    println!("{}", "─".repeat(RULE_WIDTH));
}

/// Print online peers as a table.
pub fn display_peers(peers: &[ActivePeer]) {
    println!("Online Peers:");
    rule();
    println!("  {:6}  {:22}  {}", "ID", "Address", "Directories");
    rule();

    if peers.is_empty() {
        println!("  (nobody is online)");
        rule();
        return;
    }

    for peer in peers {
        let dirs = if peer.directories.is_empty() {
            "-".to_string()
        } else {
            peer.directories
                .iter()
                .map(|d| d.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "  {:6}  {:22}  {}",
            peer.user_id,
            peer.addr().to_string(),
            truncate_string(&dirs, 26)
        );
    }

    rule();
}

/// Print shared directories as `name - path` lines.
pub fn display_directories(dirs: &[DirectoryEntry]) {
    if dirs.is_empty() {
        println!("  (no shared directories)");
        return;
    }
    for dir in dirs {
        println!("  {} - {}", dir.name, dir.path);
    }
}

/// Shorten `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate_string(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = s.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("music", 10), "music");
        assert_eq!(truncate_string("music, video, docs", 10), "music, ...");
        assert_eq!(truncate_string("abc", 3), "abc");
    }
}
