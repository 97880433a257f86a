// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page selection: resolve All/Odd/Even/Custom selections against a document's
// page count.
//
// Custom syntax: comma-separated page numbers and `start-end` inclusive
// ranges, 1-indexed. The result is de-duplicated and ascending; pages past the
// end of the document are dropped silently.

use std::collections::BTreeSet;

use kioskprint_core::error::{KioskError, Result};
use kioskprint_core::types::PageSelection;

/// Resolve a selection to the 1-indexed pages to keep.
pub fn select_pages(selection: &PageSelection, page_count: u32) -> Result<Vec<u32>> {
    let pages = match selection {
        PageSelection::All => (1..=page_count).collect(),
        PageSelection::Odd => (1..=page_count).step_by(2).collect(),
        PageSelection::Even => (2..=page_count).step_by(2).collect(),
        PageSelection::Custom(spec) => parse_custom_range(spec, page_count)?,
    };
    Ok(pages)
}

/// Parse a custom range such as `"1,3-5,2"`.
///
/// A range whose start lies past the end of the document contributes nothing;
/// one that straddles the end is clipped. Malformed tokens are a validation
/// error rather than being ignored, so a typo never prints the wrong pages.
pub fn parse_custom_range(spec: &str, page_count: u32) -> Result<Vec<u32>> {
    let mut pages = BTreeSet::new();

    for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (start, end) = match token.split_once('-') {
            Some((start, end)) => (parse_page(start, token)?, parse_page(end, token)?),
            None => {
                let page = parse_page(token, token)?;
                (page, page)
            }
        };

        if start > end {
            return Err(KioskError::Validation(format!(
                "page range '{token}' runs backwards"
            )));
        }

        pages.extend((start..=end.min(page_count)).filter(|p| *p >= 1));
    }

    if pages.is_empty() {
        return Err(KioskError::Validation(format!(
            "page range '{spec}' selects no pages of a {page_count} page document"
        )));
    }

    Ok(pages.into_iter().collect())
}

fn parse_page(raw: &str, token: &str) -> Result<u32> {
    let page: u32 = raw
        .trim()
        .parse()
        .map_err(|_| KioskError::Validation(format!("invalid page range token '{token}'")))?;
    if page == 0 {
        return Err(KioskError::Validation(format!(
            "page numbers start at 1 (got '{token}')"
        )));
    }
    Ok(page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_range_dedups_and_sorts() {
        assert_eq!(parse_custom_range("1,3-5,2", 6).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn custom_range_clips_past_end() {
        assert_eq!(parse_custom_range("4-10", 6).unwrap(), vec![4, 5, 6]);
        assert_eq!(parse_custom_range("2, 9, 12-14", 6).unwrap(), vec![2]);
    }

    #[test]
    fn overlapping_ranges_collapse() {
        assert_eq!(parse_custom_range("1-3, 2-4 ,4", 10).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn nothing_selected_is_an_error() {
        assert!(parse_custom_range("8-9", 6).is_err());
        assert!(parse_custom_range("", 6).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        assert!(parse_custom_range("1,a", 6).is_err());
        assert!(parse_custom_range("0-2", 6).is_err());
        assert!(parse_custom_range("5-3", 6).is_err());
    }

    #[test]
    fn odd_and_even() {
        assert_eq!(select_pages(&PageSelection::Odd, 5).unwrap(), vec![1, 3, 5]);
        assert_eq!(select_pages(&PageSelection::Even, 5).unwrap(), vec![2, 4]);
        assert_eq!(select_pages(&PageSelection::All, 3).unwrap(), vec![1, 2, 3]);
        assert!(select_pages(&PageSelection::Even, 1).unwrap().is_empty());
    }
}
