use std::fmt;

/// Page window plus totals filled in after the count query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Paginator {
    /// 1-based page number
    pub page: u64,
    pub per_page: u64,
    pub offset: u64,
    pub total_entries_size: u64,
    pub current_entries_size: u64,
    pub total_pages: u64,
}

impl Paginator {
    pub const DEFAULT_PER_PAGE: u64 = 20;

    /// `page < 1` becomes 1 and `per_page < 1` becomes 20.
    pub fn new(page: i64, per_page: i64) -> Self {
        let page = u64::try_from(page).ok().filter(|p| *p >= 1).unwrap_or(1);
        let per_page = u64::try_from(per_page)
            .ok()
            .filter(|p| *p >= 1)
            .unwrap_or(Self::DEFAULT_PER_PAGE);
        Self {
            page,
            per_page,
            offset: (page - 1).saturating_mul(per_page).min(i64::MAX as u64),
            ..Self::default()
        }
    }

    pub(crate) fn finish(&mut self, total: u64, current: u64) {
        self.total_entries_size = total;
        self.current_entries_size = current;
        self.total_pages = total.div_ceil(self.per_page);
    }
}

impl fmt::Display for Paginator {
    #[cfg(feature = "serde")]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }

    #[cfg(not(feature = "serde"))]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "page {} of {} ({} per page, {} total)",
            self.page, self.total_pages, self.per_page, self.total_entries_size
        )
    }
}
