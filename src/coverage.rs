// src/coverage.rs
use crate::schedule_parser::Visit;

/// Daily window that should be covered by visits, and the longest tolerated gap inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverageWindow {
    pub start_hour: u32,
    pub end_hour: u32,
    pub max_gap_minutes: u32,
}

impl Default for CoverageWindow {
    fn default() -> Self {
        Self {
            start_hour: 9,
            end_hour: 18,
            max_gap_minutes: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoverageGapResult {
    pub has_gap: bool,
    /// Longest gap above the limit, 0 when there is none.
    pub gap_minutes: u32,
}

impl CoverageWindow {
    fn start_minutes(&self) -> u32 {
        self.start_hour * 60
    }

    fn end_minutes(&self) -> u32 {
        self.end_hour * 60
    }

    pub fn analyze(&self, visits: &[Visit]) -> CoverageGapResult {
        let window_start = self.start_minutes();
        let window_end = self.end_minutes();

        if visits.is_empty() {
            return CoverageGapResult {
                has_gap: true,
                gap_minutes: window_end.saturating_sub(window_start),
            };
        }

        let mut sorted: Vec<&Visit> = visits.iter().collect();
        sorted.sort_by_key(|v| v.start);

        // Window start to the first start, each end to the next start, last end to window end.
        let mut gaps = Vec::new();
        let mut previous_end = window_start;
        for visit in &sorted {
            let start = visit.start.minutes();
            if start > previous_end {
                gaps.push(start - previous_end);
            }
            previous_end = visit.end.minutes();
        }
        if window_end > previous_end {
            gaps.push(window_end - previous_end);
        }

        let over_limit = gaps.into_iter().filter(|g| *g > self.max_gap_minutes);
        let gap_minutes = over_limit.max().unwrap_or(0);
        CoverageGapResult {
            has_gap: gap_minutes > 0,
            gap_minutes,
        }
    }
}
