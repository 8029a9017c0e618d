#[cfg(any(test, feature = "proptest-strategies"))]
pub mod strategy;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use cellstore_common::array::CellValNum;
use cellstore_common::array::dimension::DimensionConstraints;
use cellstore_common::datatype::Datatype;

/// Encapsulation of data needed to construct a dimension.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct DimensionData {
    pub name: String,
    pub datatype: Datatype,
    pub constraints: DimensionConstraints,
}

impl DimensionData {
    pub fn cell_val_num(&self) -> CellValNum {
        self.constraints.cell_val_num()
    }

    /// Returns the inclusive `[low, high]` domain bounds of this dimension,
    /// widened to `i128` (signed) or `u128`-compatible range depending on
    /// sign; callers needing the exact physical type should match on
    /// `self.constraints` directly via `dimension_constraints_go!`.
    pub fn domain_i128(&self) -> (i128, i128) {
        cellstore_common::dimension_constraints_go!(
            &self.constraints,
            _DT,
            [low, high],
            _,
            (*low as i128, *high as i128)
        )
    }
}
