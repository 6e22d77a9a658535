//! Run statistics
//!
//! Counters collected by the orchestrator while a run progresses, printed
//! once the output file is written.

use crate::extract::PdfBackend;
use crate::state::FailureKind;
use std::collections::BTreeMap;
use std::time::Duration;

/// Counters for one crawl run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Sources that reached Fetching
    pub dispatched: u64,

    /// Sources whose content came from the network
    pub fetched: u64,

    /// Sources served from the content cache
    pub cache_hits: u64,

    /// Sources that went through the rendered extractor
    pub escalations: u64,

    /// Escalations that fell back to the static result
    pub render_failures: u64,

    /// PDFs whose text came from the per-page fallback
    pub pdf_fallbacks: u64,

    /// PDF pages that could not be read at all
    pub pdf_failed_pages: u64,

    /// Sources completed with content
    pub completed: u64,

    /// Failed sources by kind, budget cancellations included
    pub failures: BTreeMap<FailureKind, u64>,

    /// Output items written
    pub items: u64,

    pub elapsed: Duration,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_failure(&mut self, kind: FailureKind) {
        *self.failures.entry(kind).or_insert(0) += 1;
    }

    /// Counts how a freshly extracted PDF was read
    pub fn record_pdf(&mut self, backend: PdfBackend, failed_pages: usize) {
        if backend == PdfBackend::Lopdf {
            self.pdf_fallbacks += 1;
        }
        self.pdf_failed_pages += failed_pages as u64;
    }

    /// Number of failed sources, budget cancellations included
    pub fn total_failures(&self) -> u64 {
        self.failures.values().sum()
    }

    /// Number of queued sources dropped when the page budget ran out
    pub fn budget_cancelled(&self) -> u64 {
        self.failures
            .get(&FailureKind::BudgetExceeded)
            .copied()
            .unwrap_or(0)
    }

    /// Completed sources per second of wall time
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &RunStats) {
    println!("=== Harvest Statistics ===\n");

    println!("Sources:");
    println!("  Dispatched: {}", stats.dispatched);
    println!("  Fetched: {}", stats.fetched);
    println!("  Cache hits: {}", stats.cache_hits);
    println!("  Completed: {}", stats.completed);
    println!();

    println!("Extraction:");
    println!("  Escalated to rendering: {}", stats.escalations);
    println!("  Render failures: {}", stats.render_failures);
    println!("  PDF per-page fallbacks: {}", stats.pdf_fallbacks);
    println!("  Unreadable PDF pages: {}", stats.pdf_failed_pages);
    println!("  Output items: {}", stats.items);
    println!();

    if !stats.failures.is_empty() {
        println!("Failures:");
        let mut counts: Vec<_> = stats.failures.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1));

        for (kind, count) in counts {
            println!("  {}: {}", kind, count);
        }
        println!();
    }

    println!(
        "Finished in {:.1}s ({:.2} sources/sec)",
        stats.elapsed.as_secs_f64(),
        stats.rate()
    );
}
