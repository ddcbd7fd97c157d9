//! Capture file ordering
//!
//! Rotated captures are usually named with an embedded counter
//! (`trace_1.dlt`, `trace_2.dlt`, ..., `trace_10.dlt`). Ordering them
//! lexically would put `10` before `2`, so files are ordered by the first
//! digit run of their file name compared as a number.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// Ordering key derived from a file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOrderKey {
    /// First run of ASCII digits in the file name, leading zeros stripped
    number: Option<String>,
    name: String,
}

impl FileOrderKey {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self {
            number: first_digit_run(&name),
            name,
        }
    }

    /// Numeric part of the key, if the name has one and it fits in 64 bits
    pub fn sequence(&self) -> Option<u64> {
        self.number.as_deref().and_then(|n| n.parse().ok())
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Ord for FileOrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.number, &other.number) {
            // digit strings without leading zeros: shorter means smaller
            (Some(a), Some(b)) => a
                .len()
                .cmp(&b.len())
                .then_with(|| a.cmp(b))
                .then_with(|| self.name.cmp(&other.name)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.name.cmp(&other.name),
        }
    }
}

impl PartialOrd for FileOrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn first_digit_run(name: &str) -> Option<String> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let digits: String = name[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0" } else { trimmed }.to_string())
}

/// Order capture files for ingestion
///
/// Numbered files come first in ascending numeric order, then unnumbered files
/// by name. The sort is stable: paths with identical keys keep their input order.
pub fn order_files<I, P>(paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut keyed: Vec<(FileOrderKey, PathBuf)> = paths
        .into_iter()
        .map(|p| {
            let path = p.as_ref().to_path_buf();
            (FileOrderKey::from_path(&path), path)
        })
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, path)| path).collect()
}
