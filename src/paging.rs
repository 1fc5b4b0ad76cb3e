use std::ops::Range;

use crate::error::{MarkletError, MarkletResult};

/// The rows shown on one page.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct PageWindow {
    /// Absolute index of the first row.
    pub offset: usize,
    pub len: usize,
}

impl PageWindow {
    pub const fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Page arithmetic for pageable repeaters. Pages are numbered from zero.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "PagerFields"))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Pager {
    total_rows: usize,
    rows_per_page: usize,
}

/// Deserialized pagers go through [`Pager::new`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct PagerFields {
    total_rows: usize,
    rows_per_page: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<PagerFields> for Pager {
    type Error = MarkletError;

    fn try_from(fields: PagerFields) -> MarkletResult<Self> {
        Self::new(fields.total_rows, fields.rows_per_page)
    }
}

impl Pager {
    /// # Errors
    /// - [`MarkletError::Paging`] if `rows_per_page` is zero.
    pub fn new(total_rows: usize, rows_per_page: usize) -> MarkletResult<Self> {
        if rows_per_page == 0 {
            return Err(MarkletError::Paging {
                message: "rows per page must be at least 1".to_string(),
            });
        }
        Ok(Self {
            total_rows,
            rows_per_page,
        })
    }

    pub const fn total_rows(&self) -> usize {
        self.total_rows
    }

    pub const fn rows_per_page(&self) -> usize {
        self.rows_per_page
    }

    pub const fn page_count(&self) -> usize {
        self.total_rows.div_ceil(self.rows_per_page)
    }

    /// The page holding absolute row `row`.
    pub const fn page_of(&self, row: usize) -> usize {
        row / self.rows_per_page
    }

    /// The rows of `page`. Pages past the last one are empty windows at
    /// `total_rows`.
    pub fn window(&self, page: usize) -> PageWindow {
        let offset = page.saturating_mul(self.rows_per_page).min(self.total_rows);
        PageWindow {
            offset,
            len: self.rows_per_page.min(self.total_rows.saturating_sub(offset)),
        }
    }

    /// The part of `rows` shown on `page`.
    pub fn slice<'a, T>(&self, rows: &'a [T], page: usize) -> &'a [T] {
        let window = self.window(page);
        let end = window.range().end.min(rows.len());
        rows.get(window.offset.min(end)..end).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ntest::timeout(100)]
    fn test_last_page_holds_the_remainder() {
        let pager = Pager::new(20, 6).unwrap();
        assert_eq!(pager.page_count(), 4);
        assert_eq!(pager.window(3), PageWindow { offset: 18, len: 2 });
        assert_eq!(pager.window(0).range(), 0..6);
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_page_beyond_last_is_empty() {
        let pager = Pager::new(20, 6).unwrap();
        let window = pager.window(4);
        assert!(window.is_empty());
        assert_eq!(window.offset, 20);
        assert!(pager.window(usize::MAX).is_empty());
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_zero_rows_per_page_is_rejected() {
        assert!(matches!(Pager::new(20, 0), Err(MarkletError::Paging { .. })));
    }

    #[test]
    #[ntest::timeout(100)]
    fn test_slice_and_page_of() {
        let rows: Vec<u32> = (0..20).collect();
        let pager = Pager::new(rows.len(), 6).unwrap();
        assert_eq!(pager.slice(&rows, 3), &[18, 19]);
        assert_eq!(pager.page_of(18), 3);
        assert_eq!(Pager::new(0, 5).unwrap().page_count(), 0);
    }
}
