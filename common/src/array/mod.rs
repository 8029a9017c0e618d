pub mod dimension;

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::num::NonZeroU32;

use thiserror::Error;

#[cfg(feature = "proptest-strategies")]
use proptest::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Whether an array stores one value per coordinate in its domain (`Dense`)
/// or only the coordinates an application has actually written (`Sparse`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum ArrayType {
    #[default]
    Dense,
    Sparse,
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for ArrayType {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![Just(ArrayType::Dense), Just(ArrayType::Sparse)].boxed()
    }
}

/// The order in which whole tiles are laid out within a fragment.
///
/// `Hilbert` is representable here because a schema produced by some other
/// component may name it, but this crate's readers reject it at
/// construction time: see `ErrorKind::QueryMisuse` in the `reader` crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum TileOrder {
    RowMajor,
    ColumnMajor,
    Hilbert,
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for TileOrder {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![Just(TileOrder::RowMajor), Just(TileOrder::ColumnMajor)]
            .boxed()
    }
}

/// The order in which cells within a single tile are laid out, and (for
/// `Global`) the order in which an [`crate::array::ArrayType::Sparse`]
/// fragment's own cells are physically stored.
///
/// `Hilbert` is representable here because a schema produced by some other
/// component may name it, but this crate's readers reject it at
/// construction time: see `ErrorKind::QueryMisuse` in the `reader` crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CellOrder {
    Unordered,
    RowMajor,
    ColumnMajor,
    Global,
    Hilbert,
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for CellOrder {
    type Strategy = BoxedStrategy<CellOrder>;
    type Parameters = Option<ArrayType>;

    fn arbitrary_with(args: Self::Parameters) -> Self::Strategy {
        match args {
            None => prop_oneof![
                Just(CellOrder::Unordered),
                Just(CellOrder::RowMajor),
                Just(CellOrder::ColumnMajor),
                Just(CellOrder::Global),
            ]
            .boxed(),
            Some(ArrayType::Sparse) => prop_oneof![
                Just(CellOrder::Unordered),
                Just(CellOrder::RowMajor),
                Just(CellOrder::ColumnMajor),
            ]
            .boxed(),
            Some(ArrayType::Dense) => prop_oneof![
                Just(CellOrder::RowMajor),
                Just(CellOrder::ColumnMajor),
            ]
            .boxed(),
        }
    }
}

/// Represents the number of values carried within a single cell of an attribute or dimension.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum CellValNum {
    /// The number of values per cell is a specific fixed number.
    Fixed(std::num::NonZeroU32),
    /// The number of values per cell varies.
    /// When this option is used for a dimension or attribute, queries must allocate additional
    /// space to hold structural information about each cell. The values will be concatenated
    /// together in a single buffer, and the structural data buffer contains the offset
    /// of each record into the values buffer.
    Var,
}

impl CellValNum {
    pub fn single() -> Self {
        CellValNum::Fixed(NonZeroU32::new(1).unwrap())
    }

    pub fn is_var_sized(&self) -> bool {
        matches!(self, CellValNum::Var)
    }

    pub fn is_single_valued(&self) -> bool {
        matches!(self, CellValNum::Fixed(nz) if nz.get() == 1)
    }

    /// Return the fixed number of values per cell, if not variable.
    pub fn fixed(&self) -> Option<NonZeroU32> {
        if let CellValNum::Fixed(nz) = self {
            Some(*nz)
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum CellValNumError {
    #[error("{} cannot be zero", std::any::type_name::<CellValNum>())]
    CannotBeZero,
}

impl Default for CellValNum {
    fn default() -> Self {
        Self::single()
    }
}

impl PartialEq<u32> for CellValNum {
    fn eq(&self, other: &u32) -> bool {
        match self {
            CellValNum::Fixed(val) => val.get() == *other,
            CellValNum::Var => *other == u32::MAX,
        }
    }
}

impl Display for CellValNum {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        Debug::fmt(self, f)
    }
}

/// `u32::MAX` is the wire sentinel for `Var`, matching the schema binary format.
impl TryFrom<u32> for CellValNum {
    type Error = CellValNumError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Err(CellValNumError::CannotBeZero),
            u32::MAX => Ok(CellValNum::Var),
            v => Ok(CellValNum::Fixed(NonZeroU32::new(v).unwrap())),
        }
    }
}

impl From<CellValNum> for u32 {
    fn from(value: CellValNum) -> Self {
        match value {
            CellValNum::Fixed(nz) => nz.get(),
            CellValNum::Var => u32::MAX,
        }
    }
}

#[cfg(feature = "proptest-strategies")]
impl Arbitrary for CellValNum {
    type Strategy = BoxedStrategy<CellValNum>;
    type Parameters = Option<std::ops::Range<NonZeroU32>>;

    fn arbitrary_with(r: Self::Parameters) -> Self::Strategy {
        if let Some(range) = r {
            (range.start.get()..range.end.get())
                .prop_map(|nz| CellValNum::try_from(nz).unwrap())
                .boxed()
        } else {
            prop_oneof![
                30 => Just(CellValNum::single()),
                30 => Just(CellValNum::Var),
                25 => (2u32..=8).prop_map(|nz| CellValNum::try_from(nz).unwrap()),
                10 => (9u32..=16).prop_map(|nz| CellValNum::try_from(nz).unwrap()),
                5 => (17u32..=32).prop_map(|nz| CellValNum::try_from(nz).unwrap()),
            ].boxed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_val_num_wire_roundtrip() {
        assert_eq!(CellValNum::Var, CellValNum::try_from(u32::MAX).unwrap());
        assert_eq!(u32::MAX, u32::from(CellValNum::Var));

        let fixed = CellValNum::try_from(4u32).unwrap();
        assert_eq!(4u32, u32::from(fixed));

        assert!(CellValNum::try_from(0u32).is_err());
    }
}
