// AI
//! 📊 stats.rs: "how much have we actually sampled?" Asked by everyone, answered here.
//!
//! Plain atomic counters bumped by the scheduler and the reader, a `Copy`
//! snapshot for whoever asks, and a comfy-table rendering for the CLI's
//! closing credits. Relaxed ordering everywhere: these are vibes with numbers,
//! not synchronization.
//!
//! 🦆 The duck counts too. It just doesn't tell anyone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};

/// 🔢 Live counters. Shared by reference between the reader and its scheduler.
#[derive(Debug)]
pub struct SamplerStats {
    refill_cycles: AtomicU64,
    empty_cycles: AtomicU64,
    objects_fetched: AtomicU64,
    bytes_fetched: AtomicU64,
    lines_parsed: AtomicU64,
    lines_dropped: AtomicU64,
    paths_appended: AtomicU64,
    paths_served: AtomicU64,
    started_at: Instant,
}

/// 📸 A frozen moment of [`SamplerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// 🔄 refill cycles that ran to completion (including no-op cycles)
    pub refill_cycles: u64,
    /// 🫥 cycles that found an empty listing
    pub empty_cycles: u64,
    pub objects_fetched: u64,
    pub bytes_fetched: u64,
    pub lines_parsed: u64,
    /// 🗑️ too short, or rejected by the pattern
    pub lines_dropped: u64,
    pub paths_appended: u64,
    pub paths_served: u64,
    pub elapsed: Duration,
}

impl Default for SamplerStats {
    fn default() -> Self {
        Self {
            refill_cycles: AtomicU64::new(0),
            empty_cycles: AtomicU64::new(0),
            objects_fetched: AtomicU64::new(0),
            bytes_fetched: AtomicU64::new(0),
            lines_parsed: AtomicU64::new(0),
            lines_dropped: AtomicU64::new(0),
            paths_appended: AtomicU64::new(0),
            paths_served: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }
}

impl SamplerStats {
    pub(crate) fn record_empty_cycle(&self) {
        self.empty_cycles.fetch_add(1, Ordering::Relaxed);
        self.refill_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fetch(&self, bytes: usize) {
        self.objects_fetched.fetch_add(1, Ordering::Relaxed);
        self.bytes_fetched.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_parse(&self, lines_seen: usize, lines_dropped: usize, paths: usize) {
        self.lines_parsed.fetch_add(lines_seen as u64, Ordering::Relaxed);
        self.lines_dropped.fetch_add(lines_dropped as u64, Ordering::Relaxed);
        self.paths_appended.fetch_add(paths as u64, Ordering::Relaxed);
        self.refill_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_served(&self) {
        self.paths_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            refill_cycles: self.refill_cycles.load(Ordering::Relaxed),
            empty_cycles: self.empty_cycles.load(Ordering::Relaxed),
            objects_fetched: self.objects_fetched.load(Ordering::Relaxed),
            bytes_fetched: self.bytes_fetched.load(Ordering::Relaxed),
            lines_parsed: self.lines_parsed.load(Ordering::Relaxed),
            lines_dropped: self.lines_dropped.load(Ordering::Relaxed),
            paths_appended: self.paths_appended.load(Ordering::Relaxed),
            paths_served: self.paths_served.load(Ordering::Relaxed),
            elapsed: self.started_at.elapsed(),
        }
    }
}

impl StatsSnapshot {
    /// 🍽️ Two-column summary table. No borders. We are minimalists.
    pub fn render_table(&self) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);

        let the_rows = [
            ("refill cycles", format_number(self.refill_cycles)),
            ("empty cycles", format_number(self.empty_cycles)),
            ("objects fetched", format_number(self.objects_fetched)),
            ("bytes fetched", format_number(self.bytes_fetched)),
            ("lines parsed", format_number(self.lines_parsed)),
            ("lines dropped", format_number(self.lines_dropped)),
            ("paths queued", format_number(self.paths_appended)),
            ("paths served", format_number(self.paths_served)),
            ("elapsed", format_duration(self.elapsed)),
        ];
        for (the_label, the_value) in the_rows {
            table.add_row(vec![
                Cell::new(the_label),
                Cell::new(the_value).set_alignment(CellAlignment::Right),
            ]);
        }

        table.to_string()
    }
}

/// 🔢 "1000000" → "1,000,000": you're welcome, eyes.
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS if you left it running over lunch.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
