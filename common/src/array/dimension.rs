use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::array::CellValNum;
use crate::datatype::{Datatype, Error as DatatypeError};

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("Invalid datatype: {0}")]
    Datatype(#[from] DatatypeError),
}

/// The domain and tile extent of a dimension, keyed by its physical type.
///
/// Each variant holds `[low, high]` (inclusive domain bounds) and an
/// optional tile extent; `None` extent means the dimension has no tiling
/// (every cell along it belongs to the same tile).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum DimensionConstraints {
    Int8([i8; 2], Option<i8>),
    Int16([i16; 2], Option<i16>),
    Int32([i32; 2], Option<i32>),
    Int64([i64; 2], Option<i64>),
    UInt8([u8; 2], Option<u8>),
    UInt16([u16; 2], Option<u16>),
    UInt32([u32; 2], Option<u32>),
    UInt64([u64; 2], Option<u64>),
    Float32([f32; 2], Option<f32>),
    Float64([f64; 2], Option<f64>),
}

/// Apply a generic expression with a static type binding for the dimension
/// domain's range and extent bound to the dynamic `$expr`.
#[macro_export]
macro_rules! dimension_constraints_go {
    ($expr:expr, $DT:ident, $range:pat, $extent:pat, $then:expr) => {{
        use $crate::array::dimension::DimensionConstraints;
        match $expr {
            #[allow(unused_variables)]
            DimensionConstraints::Int8($range, $extent) => {
                #[allow(dead_code)]
                type $DT = i8;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::Int16($range, $extent) => {
                #[allow(dead_code)]
                type $DT = i16;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::Int32($range, $extent) => {
                #[allow(dead_code)]
                type $DT = i32;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::Int64($range, $extent) => {
                #[allow(dead_code)]
                type $DT = i64;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::UInt8($range, $extent) => {
                #[allow(dead_code)]
                type $DT = u8;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::UInt16($range, $extent) => {
                #[allow(dead_code)]
                type $DT = u16;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::UInt32($range, $extent) => {
                #[allow(dead_code)]
                type $DT = u32;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::UInt64($range, $extent) => {
                #[allow(dead_code)]
                type $DT = u64;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::Float32($range, $extent) => {
                #[allow(dead_code)]
                type $DT = f32;
                $then
            }
            #[allow(unused_variables)]
            DimensionConstraints::Float64($range, $extent) => {
                #[allow(dead_code)]
                type $DT = f64;
                $then
            }
        }
    }};
}

macro_rules! dimension_constraints_impl {
    ($($V:ident : $U:ty),+) => {
        $(
            impl From<[$U; 2]> for DimensionConstraints {
                fn from(value: [$U; 2]) -> DimensionConstraints {
                    DimensionConstraints::$V(value, None)
                }
            }

            impl From<([$U; 2], $U)> for DimensionConstraints {
                fn from(value: ([$U; 2], $U)) -> DimensionConstraints {
                    DimensionConstraints::$V([value.0[0], value.0[1]], Some(value.1))
                }
            }

            impl From<([$U; 2], Option<$U>)> for DimensionConstraints {
                fn from(value: ([$U; 2], Option<$U>)) -> DimensionConstraints {
                    DimensionConstraints::$V([value.0[0], value.0[1]], value.1)
                }
            }
        )+
    }
}

dimension_constraints_impl!(Int8: i8, Int16: i16, Int32: i32, Int64: i64);
dimension_constraints_impl!(UInt8: u8, UInt16: u16, UInt32: u32, UInt64: u64);
dimension_constraints_impl!(Float32: f32, Float64: f64);

impl DimensionConstraints {
    /// Returns the [`Datatype`] which represents the physical type of this constraint.
    pub fn physical_datatype(&self) -> Datatype {
        match self {
            Self::Int8(_, _) => Datatype::Int8,
            Self::Int16(_, _) => Datatype::Int16,
            Self::Int32(_, _) => Datatype::Int32,
            Self::Int64(_, _) => Datatype::Int64,
            Self::UInt8(_, _) => Datatype::UInt8,
            Self::UInt16(_, _) => Datatype::UInt16,
            Self::UInt32(_, _) => Datatype::UInt32,
            Self::UInt64(_, _) => Datatype::UInt64,
            Self::Float32(_, _) => Datatype::Float32,
            Self::Float64(_, _) => Datatype::Float64,
        }
    }

    pub fn cell_val_num(&self) -> CellValNum {
        CellValNum::single()
    }

    pub fn verify_type_compatible(&self, datatype: Datatype) -> Result<(), Error> {
        dimension_constraints_go!(self, DT, _range, _extent, {
            if !datatype.is_compatible_type::<DT>() {
                return Err(Error::Datatype(DatatypeError::physical_type_incompatible::<
                    DT,
                >(datatype)));
            }
        });

        Ok(())
    }

    /// Returns the number of cells spanned by this constraint.
    pub fn num_cells(&self) -> u128 {
        let (low, high) = crate::dimension_constraints_go!(
            self,
            _DT,
            [low, high],
            _,
            (*low as i128, *high as i128)
        );

        1 + (high - low) as u128
    }

    /// Returns the number of cells spanned by a single tile under this
    /// constraint, if a tile extent was set.
    pub fn num_cells_per_tile(&self) -> Option<usize> {
        crate::dimension_constraints_go!(self, _DT, _, extent, {
            extent.map(|extent| {
                #[allow(clippy::unnecessary_fallible_conversions)]
                usize::try_from(extent).unwrap()
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn num_cells() {
        let dim = DimensionConstraints::from([0i32, 99i32]);
        assert_eq!(100, dim.num_cells());
    }

    #[test]
    fn verify_type_compatible() {
        let dim = DimensionConstraints::from([0i32, 99i32]);
        assert!(dim.verify_type_compatible(Datatype::Int32).is_ok());
        assert!(dim.verify_type_compatible(Datatype::Int64).is_err());
    }
}
