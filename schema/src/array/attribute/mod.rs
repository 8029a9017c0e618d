#[cfg(any(test, feature = "proptest-strategies"))]
pub mod strategy;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use cellstore_common::array::CellValNum;
use cellstore_common::datatype::Datatype;

/// Encapsulation of data needed to construct an attribute.
///
/// `fill` is the raw fill value bytes used for cells an unsorted/sorted
/// read needs to synthesize (a dense hole, or the nullity default);
/// `None` means zero-fill. When present, it must be exactly
/// `SchemaData::cell_size` bytes for this attribute — validated at
/// schema construction, not here, since this type carries no reference
/// to its owning schema.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct AttributeData {
    pub name: String,
    pub datatype: Datatype,
    pub cell_val_num: Option<CellValNum>,
    pub fill: Option<Vec<u8>>,
}

impl AttributeData {
    pub fn cell_val_num(&self) -> CellValNum {
        self.cell_val_num.unwrap_or_default()
    }
}
