use crate::backend::preloader::PreloadStats;

/// Short cache badge such as `⟳ 3/5`. `None` when nothing is cached yet.
pub fn minimal(stats: &PreloadStats) -> Option<String> {
    if stats.total == 0 {
        return None;
    }

    let icon = if stats.loading > 0 || stats.active_loads > 0 {
        "⟳"
    } else if stats.errors > 0 {
        "!"
    } else {
        "✓"
    };
    Some(format!("{} {}/{}", icon, stats.loaded, stats.total))
}

/// Full cache line: percentage, per-state counts and queue length.
/// Zero counts are left out.
pub fn detailed(stats: &PreloadStats) -> Option<String> {
    if stats.total == 0 {
        return None;
    }

    let progress = (stats.loaded as f64 / stats.total as f64 * 100.0).round();
    let mut line = format!("Page cache {}%", progress);

    let parts: Vec<String> = [
        (stats.loaded, "ready"),
        (stats.loading, "loading"),
        (stats.errors, "failed"),
    ]
    .iter()
    .filter(|(count, _)| *count > 0)
    .map(|(count, label)| format!("{} {}", count, label))
    .collect();

    if !parts.is_empty() {
        line.push_str(" | ");
        line.push_str(&parts.join(", "));
    }
    if stats.queue_length > 0 {
        line.push_str(&format!(" | {} queued", stats.queue_length));
    }
    Some(line)
}
