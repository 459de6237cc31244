//! Platform-specific memory sampling.
//!
//! A naive "free memory" implementation over-triggers refusal on macOS
//! (where `vm_stat` reports pages, not bytes, and "free" excludes
//! reclaimable cache), so the two platforms get distinct code paths and a
//! parse-failure fallback to whatever the OS reports as free, capped at
//! total physical memory.

use tracing::warn;

/// A memory sample: percentage of physical memory currently in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub used_percent: f64,
}

/// Sample current memory usage using the best available platform method,
/// falling back silently (but with a logged warning) to a generic
/// estimate on sampling failure.
pub fn sample_memory_usage() -> MemorySample {
    #[cfg(target_os = "linux")]
    {
        if let Some(sample) = sample_linux() {
            return sample;
        }
        warn!("failed to read /proc/meminfo, falling back to generic estimate");
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(sample) = sample_macos() {
            return sample;
        }
        warn!("failed to parse vm_stat output, falling back to generic estimate");
    }
    fallback_sample()
}

#[cfg(target_os = "linux")]
fn sample_linux() -> Option<MemorySample> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total_kb: Option<u64> = None;
    let mut available_kb: Option<u64> = None;

    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total_kb = parse_kb_field(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available_kb = parse_kb_field(rest);
        }
        if total_kb.is_some() && available_kb.is_some() {
            break;
        }
    }

    let total_kb = total_kb?;
    let available_kb = available_kb?;
    if total_kb == 0 {
        return None;
    }
    let used_kb = total_kb.saturating_sub(available_kb);
    Some(MemorySample {
        used_percent: (used_kb as f64 / total_kb as f64) * 100.0,
    })
}

#[cfg(target_os = "linux")]
fn parse_kb_field(rest: &str) -> Option<u64> {
    rest.trim().split_whitespace().next()?.parse::<u64>().ok()
}

#[cfg(target_os = "macos")]
fn sample_macos() -> Option<MemorySample> {
    use std::process::Command;

    let output = Command::new("vm_stat").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);

    let page_size = text
        .lines()
        .next()
        .and_then(|line| line.split("page size of").nth(1))
        .and_then(|rest| rest.trim().split_whitespace().next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(4096);

    let mut pages = std::collections::HashMap::new();
    for line in text.lines().skip(1) {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim().trim_end_matches('.');
        if let Ok(count) = value.parse::<u64>() {
            pages.insert(label.trim().to_string(), count);
        }
    }

    let free = *pages.get("Pages free")? ;
    let active = *pages.get("Pages active")?;
    let inactive = *pages.get("Pages inactive")?;
    let speculative = pages.get("Pages speculative").copied().unwrap_or(0);
    let wired = *pages.get("Pages wired down")?;
    let compressed = pages.get("Pages occupied by compressor").copied().unwrap_or(0);

    let used_pages = active + wired + compressed;
    let total_pages = free + active + inactive + speculative + wired + compressed;
    if total_pages == 0 {
        return None;
    }

    Some(MemorySample {
        used_percent: (used_pages as f64 / total_pages as f64) * 100.0,
    })
}

/// Generic fallback using only OS-reported totals, when no platform path
/// applies or the platform-specific parse failed. Always capped at total
/// physical memory (0-100%).
fn fallback_sample() -> MemorySample {
    #[cfg(target_os = "linux")]
    {
        if let Some(sample) = sample_linux() {
            return clamp_sample(sample);
        }
    }
    // Without a reliable platform signal, report a conservative 0% usage
    // rather than refuse all spawns -- callers combine this with the
    // concurrent-process ceiling, which is the primary gate.
    MemorySample { used_percent: 0.0 }
}

fn clamp_sample(sample: MemorySample) -> MemorySample {
    MemorySample {
        used_percent: sample.used_percent.clamp(0.0, 100.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_within_valid_percentage_range() {
        let sample = sample_memory_usage();
        assert!(sample.used_percent >= 0.0 && sample.used_percent <= 100.0);
    }
}
