//! Presentation formatter: buckets, colors, frequency summary.
//!
//! `Report::build` is pure; given a detection list it performs no I/O and
//! always produces the same buckets, fragments, and summary.

use crate::detect::Detection;
use crate::labels::{self, Bucket, DisplayColor};

/// One detection prepared for display.
#[derive(Clone, Debug)]
pub struct ReportEntry {
    pub label: String,
    pub confidence: f32,
    pub color: DisplayColor,
}

impl ReportEntry {
    /// Colored HTML fragment with the confidence rounded to two decimals.
    pub fn html(&self) -> String {
        format!(
            "<span style='color:{}; font-size:18px;'><b>{}</b> — Confidence: {:.2}</span>",
            self.color.css_name(),
            self.label,
            self.confidence
        )
    }

    /// Plain-text rendering for the CLI.
    pub fn text(&self) -> String {
        format!("{} (confidence {:.2})", self.label, self.confidence)
    }
}

/// One line of the frequency summary.
#[derive(Clone, Debug)]
pub struct SummaryLine {
    pub label: String,
    pub count: usize,
    pub color: DisplayColor,
}

impl SummaryLine {
    pub fn html(&self) -> String {
        format!(
            "<span style='color:{}; font-size:16px;'>• {}: {}</span>",
            self.color.css_name(),
            self.label,
            self.count
        )
    }

    pub fn text(&self) -> String {
        format!("{}: {}", self.label, self.count)
    }
}

/// Categorized, display-ready view of one detection list.
#[derive(Clone, Debug, Default)]
pub struct Report {
    safe_equipment: Vec<ReportEntry>,
    other_objects: Vec<ReportEntry>,
    unsafe_conditions: Vec<ReportEntry>,
    summary: Vec<SummaryLine>,
}

impl Report {
    pub fn build(detections: &[Detection]) -> Self {
        let mut report = Report::default();

        for detection in detections {
            let entry = ReportEntry {
                label: detection.label.clone(),
                confidence: detection.confidence,
                color: labels::color_for(&detection.label),
            };
            match labels::bucket_for(&detection.label) {
                Bucket::SafeEquipment => report.safe_equipment.push(entry),
                Bucket::OtherObjects => report.other_objects.push(entry),
                Bucket::UnsafeConditions => report.unsafe_conditions.push(entry),
            }
        }

        report.summary = build_summary(detections);
        report
    }

    pub fn entries(&self, bucket: Bucket) -> &[ReportEntry] {
        match bucket {
            Bucket::SafeEquipment => &self.safe_equipment,
            Bucket::OtherObjects => &self.other_objects,
            Bucket::UnsafeConditions => &self.unsafe_conditions,
        }
    }

    pub fn summary(&self) -> &[SummaryLine] {
        &self.summary
    }

    /// True when no objects were detected at all.
    pub fn is_empty(&self) -> bool {
        self.safe_equipment.is_empty()
            && self.other_objects.is_empty()
            && self.unsafe_conditions.is_empty()
    }
}

/// Per-label counts sorted by descending frequency. Ties keep first-seen
/// order (stable sort over first-appearance accumulation).
fn build_summary(detections: &[Detection]) -> Vec<SummaryLine> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for detection in detections {
        match counts.iter_mut().find(|(label, _)| *label == detection.label) {
            Some((_, count)) => *count += 1,
            None => counts.push((detection.label.clone(), 1)),
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .into_iter()
        .map(|(label, count)| SummaryLine {
            color: labels::color_for(&label),
            label,
            count,
        })
        .collect()
}
