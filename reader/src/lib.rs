//! The read path over a typed, tile-organized array: durable fragments
//! are merged into global cell order by [`unsorted::UnsortedReader`],
//! then (optionally) rearranged into the caller's requested row- or
//! column-major order by [`sorted::SortedReader`].

pub mod domain_arithmetic;
pub mod error;
pub mod fragment;
pub mod query;
pub mod sorted;
pub mod storage;
pub mod unsorted;

pub use error::{Error, ErrorKind, Result};

use cellstore_common::array::{CellOrder, TileOrder};
use cellstore_schema::array::SchemaData;

/// Rejects schemas this crate's readers cannot serve.
///
/// `Hilbert` cell/tile order is representable in [`SchemaData`] because
/// some other component may produce it, but linearizing by a space-filling
/// curve is out of scope here (`spec.md` Open Question #1): callers get
/// a `QueryMisuse` instead of a reader that silently falls back to
/// row-major.
pub fn validate_schema(schema: &SchemaData) -> Result<()> {
    if schema.cell_order == Some(CellOrder::Hilbert) {
        return Err(Error::query_misuse(
            "Hilbert cell order is not supported by this reader",
        ));
    }
    if schema.tile_order == Some(TileOrder::Hilbert) {
        return Err(Error::query_misuse(
            "Hilbert tile order is not supported by this reader",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellstore_common::array::{ArrayType, TileOrder};
    use cellstore_schema::array::attribute::AttributeData;
    use cellstore_schema::array::dimension::DimensionData;
    use cellstore_schema::array::domain::DomainData;
    use cellstore_common::array::dimension::DimensionConstraints;
    use cellstore_common::datatype::Datatype;

    fn schema_with_cell_order(cell_order: CellOrder) -> SchemaData {
        SchemaData::new(
            "a",
            ArrayType::Dense,
            DomainData {
                dimension: vec![DimensionData {
                    name: "d".into(),
                    datatype: Datatype::Int32,
                    constraints: DimensionConstraints::from(([0i32, 9i32], 10i32)),
                }],
            },
            vec![AttributeData {
                name: "a".into(),
                datatype: Datatype::Int32,
                cell_val_num: None,
                fill: None,
            }],
            None,
            Some(cell_order),
            Some(TileOrder::RowMajor),
            0,
        )
        .unwrap()
    }

    #[test]
    fn hilbert_cell_order_is_rejected() {
        let schema = schema_with_cell_order(CellOrder::Hilbert);
        let err = validate_schema(&schema).unwrap_err();
        assert_eq!(ErrorKind::QueryMisuse, err.kind());
    }

    #[test]
    fn row_major_cell_order_is_accepted() {
        let schema = schema_with_cell_order(CellOrder::RowMajor);
        assert!(validate_schema(&schema).is_ok());
    }
}
