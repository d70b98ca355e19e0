use std::ops::Range;

/// Contiguous run of messages drawn from the top of the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    pub fn range(self) -> Range<usize> {
        self.start..self.end
    }

    pub fn is_empty(self) -> bool {
        self.start >= self.end
    }
}

/// Pick the visible messages for a scrolling frame.
///
/// If everything (plus the indicator row) fits, the window starts at the first
/// message. Otherwise the latest messages are accumulated backwards until the
/// next earlier one would overflow. The newest message is always kept, even if
/// it alone exceeds the viewport; it then overflows at the bottom.
pub fn visible_window(heights: &[u32], indicator: u32, viewport: u32) -> Window {
    let end = heights.len();
    let total = heights
        .iter()
        .map(|height| u64::from(*height))
        .sum::<u64>()
        + u64::from(indicator);
    if total <= u64::from(viewport) {
        return Window { start: 0, end };
    }

    let mut used = u64::from(indicator);
    let mut start = end;
    for (idx, height) in heights.iter().enumerate().rev() {
        let next = used + u64::from(*height);
        if next > u64::from(viewport) && start < end {
            break;
        }
        used = next;
        start = idx;
    }
    Window { start, end }
}

/// Split messages into consecutive pages with the same height arithmetic as
/// [`visible_window`], scanning forward. A message never spans two pages; one
/// taller than the viewport gets a page to itself.
pub fn paginate(heights: &[u32], viewport: u32) -> Vec<Range<usize>> {
    let mut pages = Vec::new();
    let mut page_start = 0;
    let mut used = 0_u64;

    for (idx, height) in heights.iter().enumerate() {
        let height = u64::from(*height);
        if idx > page_start && used + height > u64::from(viewport) {
            pages.push(page_start..idx);
            page_start = idx;
            used = 0;
        }
        used += height;
    }
    if page_start < heights.len() {
        pages.push(page_start..heights.len());
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitting_content_starts_at_first_message() {
        let window = visible_window(&[100, 100, 100], 50, 400);
        assert_eq!(window, Window { start: 0, end: 3 });
    }

    #[test]
    fn overflow_keeps_latest_suffix() {
        let heights = [100, 100, 100, 100, 100];
        let window = visible_window(&heights, 0, 350);
        assert_eq!(window, Window { start: 2, end: 5 });

        let with_indicator = visible_window(&heights, 60, 350);
        assert_eq!(with_indicator, Window { start: 3, end: 5 });
    }

    #[test]
    fn oversized_latest_message_stays_visible() {
        let window = visible_window(&[50, 900], 0, 300);
        assert_eq!(window, Window { start: 1, end: 2 });
    }

    #[test]
    fn empty_list_is_empty_window() {
        assert!(visible_window(&[], 40, 300).is_empty());
        assert!(paginate(&[], 300).is_empty());
    }

    #[test]
    fn pages_break_before_overflow() {
        let pages = paginate(&[100, 100, 100, 250, 50], 300);
        assert_eq!(pages, vec![0..3, 3..5]);
    }

    #[test]
    fn oversized_message_gets_its_own_page() {
        let pages = paginate(&[100, 900, 100], 300);
        assert_eq!(pages, vec![0..1, 1..2, 2..3]);
    }
}
