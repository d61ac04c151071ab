/// Runtime configuration for a `DriveDb` instance.
#[derive(Debug, Clone)]
pub struct DriveDbConfig {
    /// Upper bound on a single page; `limit` values above this are rejected
    /// with `InvalidArgument` before any scan starts.
    pub max_page_size: usize,
    /// Upper bound on the number of values in any single `any_of` filter
    /// list. Oversized lists are a caller bug, not a scan we should run.
    pub max_filter_values: usize,
}

impl Default for DriveDbConfig {
    fn default() -> Self {
        Self {
            max_page_size: 10_000,
            max_filter_values: 512,
        }
    }
}

impl DriveDbConfig {
    /// Profile for test suites that page through large seeded drives.
    pub fn unbounded_pages() -> Self {
        Self {
            max_page_size: usize::MAX - 1,
            ..Self::default()
        }
    }
}
