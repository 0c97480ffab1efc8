use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Range;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeRegionError {
    #[error("merged region {new} overlaps existing region {existing}")]
    Overlap { new: Range, existing: Range },
    #[error("merged region {0} covers a single cell")]
    SingleCell(Range),
}

/// The merged-cell regions of one worksheet, kept in insertion order.
///
/// Regions never overlap: [`MergedRegions::add`] rejects a region that intersects an
/// existing one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedRegions {
    regions: Vec<Range>,
}

impl MergedRegions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range> {
        self.regions.iter()
    }

    pub fn as_slice(&self) -> &[Range] {
        &self.regions
    }

    pub fn contains(&self, range: &Range) -> bool {
        self.regions.contains(range)
    }

    pub fn add(&mut self, range: Range) -> Result<(), MergeRegionError> {
        if range.is_single_cell() {
            return Err(MergeRegionError::SingleCell(range));
        }
        if let Some(existing) = self.regions.iter().find(|r| r.intersects(&range)) {
            return Err(MergeRegionError::Overlap {
                new: range,
                existing: *existing,
            });
        }
        self.regions.push(range);
        Ok(())
    }

    /// Remove an exact region. Returns `false` when it was not present.
    pub fn remove(&mut self, range: &Range) -> bool {
        let before = self.regions.len();
        self.regions.retain(|r| r != range);
        before != self.regions.len()
    }

    pub fn retain(&mut self, f: impl FnMut(&Range) -> bool) {
        self.regions.retain(f);
    }

    /// Regions whose rows all lie within `first..=last`.
    pub fn within_rows(&self, first: u32, last: u32) -> Vec<Range> {
        self.regions
            .iter()
            .filter(|r| r.within_rows(first, last))
            .copied()
            .collect()
    }

    pub(crate) fn replace_all(&mut self, regions: Vec<Range>) {
        self.regions = regions;
    }
}
