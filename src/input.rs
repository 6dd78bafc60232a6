//! Batch input parsing
//!
//! The only structured input the pipeline owns: line-delimited text where
//! each useful line is `label://url-suffix` or a bare `scheme://url`.

use crate::error::ParseError;
use crate::types::RawEntry;

/// Counts of recognized link categories, for the pre-flight report
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkCensus {
    /// Lines whose URL contains `.pdf`
    pub pdf: u32,
    /// Lines ending in an image suffix
    pub image: u32,
    /// Lines whose URL contains `.zip`
    pub zip: u32,
    /// Everything else
    pub other: u32,
}

impl LinkCensus {
    /// Total recognized links
    pub fn total(&self) -> u32 {
        self.pdf + self.image + self.zip + self.other
    }
}

/// Parse batch input text into entries
///
/// Lines without a `://` separator are skipped, not treated as errors.
/// Fails with [`ParseError::EmptyInput`] on empty text and
/// [`ParseError::NoLinks`] when nothing parseable remains.
pub fn parse_batch_lines(content: &str) -> Result<(Vec<RawEntry>, LinkCensus), ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyInput);
    }

    let mut entries = Vec::new();
    let mut census = LinkCensus::default();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((label, url_suffix)) = line.split_once("://") else {
            continue;
        };
        if url_suffix.is_empty() {
            continue;
        }

        if url_suffix.contains(".pdf") {
            census.pdf += 1;
        } else if url_suffix.ends_with(".png")
            || url_suffix.ends_with(".jpeg")
            || url_suffix.ends_with(".jpg")
        {
            census.image += 1;
        } else if url_suffix.contains(".zip") {
            census.zip += 1;
        } else {
            census.other += 1;
        }

        entries.push(RawEntry {
            label: label.to_string(),
            url_suffix: url_suffix.to_string(),
        });
    }

    if entries.is_empty() {
        return Err(ParseError::NoLinks);
    }

    Ok((entries, census))
}

/// Validate a 1-based start index against the parsed list
pub fn check_start_index(start: u32, count: usize) -> Result<(), ParseError> {
    let count = count as u32;
    if start == 0 || start > count {
        return Err(ParseError::StartOutOfRange {
            start,
            count,
        });
    }
    Ok(())
}
