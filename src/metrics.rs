/// Per-page counters collected while a report runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub band_count: usize,
    pub command_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunMetrics {
    pub pages: Vec<PageMetrics>,
    pub record_count: usize,
    pub column_breaks: usize,
    pub deferred_continuations: usize,
}

impl RunMetrics {
    pub fn total_bands(&self) -> usize {
        self.pages.iter().map(|p| p.band_count).sum()
    }
}
