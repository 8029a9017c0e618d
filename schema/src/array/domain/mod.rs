#[cfg(any(test, feature = "proptest-strategies"))]
pub mod strategy;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::array::dimension::DimensionData;

/// Encapsulation of data needed to construct a domain: the ordered list
/// of dimensions, outermost (slowest-varying under row-major order) first.
#[derive(Clone, Default, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct DomainData {
    pub dimension: Vec<DimensionData>,
}

impl DomainData {
    /// Total number of cells spanned by the domain, or `None` if it
    /// overflows `usize`.
    pub fn num_cells(&self) -> Option<usize> {
        let mut total = 1u128;
        for d in self.dimension.iter() {
            let (low, high) = d.domain_i128();
            total = total.checked_mul(1 + (high - low) as u128)?;
        }
        usize::try_from(total).ok()
    }

    /// Number of cells in a single tile, or `None` if any dimension has no
    /// tile extent (sparse arrays are not required to have one) or the
    /// product overflows `usize`.
    pub fn num_cells_per_tile(&self) -> Option<usize> {
        let mut total = 1usize;
        for d in self.dimension.iter() {
            total = total.checked_mul(d.constraints.num_cells_per_tile()?)?;
        }
        Some(total)
    }

    /// The inclusive `[low, high]` domain bounds of each dimension, in
    /// dimension order, widened to `i128`.
    pub fn bounds(&self) -> Vec<(i128, i128)> {
        self.dimension.iter().map(|d| d.domain_i128()).collect()
    }
}
