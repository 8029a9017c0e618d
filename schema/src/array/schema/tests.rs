use cellstore_common::array::{ArrayType, CellOrder, CellValNum, TileOrder};
use cellstore_common::array::dimension::DimensionConstraints;
use cellstore_common::datatype::Datatype;

use super::*;

fn scenario_schema() -> SchemaData {
    // D=2, int32 coords, row-major, tile extents 2x2, domain [1..4]x[1..4],
    // one int32 attribute with values-per-cell 1.
    let domain = DomainData {
        dimension: vec![
            DimensionData {
                name: "row".to_string(),
                datatype: Datatype::Int32,
                constraints: DimensionConstraints::from(([1i32, 4i32], 2i32)),
            },
            DimensionData {
                name: "col".to_string(),
                datatype: Datatype::Int32,
                constraints: DimensionConstraints::from(([1i32, 4i32], 2i32)),
            },
        ],
    };
    let attributes = vec![AttributeData {
        name: "a".to_string(),
        datatype: Datatype::Int32,
        cell_val_num: Some(CellValNum::single()),
        fill: None,
    }];
    SchemaData::new(
        "scenario",
        ArrayType::Dense,
        domain,
        attributes,
        None,
        Some(CellOrder::RowMajor),
        Some(TileOrder::RowMajor),
        0,
    )
    .unwrap()
}

#[test]
fn cell_size_fixed_and_var() {
    let mut s = scenario_schema();
    assert_eq!(Some(4), s.cell_size(0));

    s.attributes.push(AttributeData {
        name: "b".to_string(),
        datatype: Datatype::Int64,
        cell_val_num: Some(CellValNum::Var),
        fill: None,
    });
    assert_eq!(Some(OFFSET_WIDTH), s.cell_size(1));
}

#[test]
fn coords_size_is_d_times_width() {
    let s = scenario_schema();
    assert_eq!(8, s.coords_size());
}

#[test]
fn cells_per_tile_dense_only() {
    let dense = scenario_schema();
    assert_eq!(Some(4), dense.cells_per_tile());
}

#[test]
fn attribute_lookup() {
    let s = scenario_schema();
    assert_eq!(Some(0), s.attribute_id("a"));
    assert_eq!(None, s.attribute_id("nope"));
    assert!(!s.is_var(0));
}

#[test]
fn field_lookup_by_index_and_name() {
    let s = scenario_schema();
    assert_eq!(2, s.num_fields());
    assert!(s.field(0).unwrap().is_dimension());
    assert!(s.field(2).unwrap().is_attribute());
    assert_eq!("row", s.field("row").unwrap().name());
    assert_eq!("a", s.field("a").unwrap().name());
    assert!(s.field("missing").is_none());
}

#[test]
fn tile_coord_and_offset() {
    let s = scenario_schema();
    // cell (3, 2) is zero-based (2, 1) from the domain lower bound 1;
    // with a 2x2 tile, that's tile (1, 0) offset (0, 1).
    assert_eq!(vec![1, 0], s.tile_coord_of(&[3, 2]));
    assert_eq!(vec![0, 1], s.tile_offset_of(&[3, 2]));
}

#[test]
fn linearize_matches_scenario_a() {
    // Scenario A: a = row*4 + col for a 4x4 domain, zero-based.
    for row in 0..4i128 {
        for col in 0..4i128 {
            let pos = SchemaData::linearize_row_major(&[row, col], &[4, 4]);
            assert_eq!(row * 4 + col, pos);
        }
    }
}

#[test]
fn linearize_col_major_is_transpose_of_row_major() {
    let bounds = [3i128, 5i128];
    for row in 0..3i128 {
        for col in 0..5i128 {
            let row_major =
                SchemaData::linearize_row_major(&[row, col], &bounds);
            let col_major = SchemaData::linearize_col_major(
                &[col, row],
                &[bounds[1], bounds[0]],
            );
            assert_eq!(row_major, col_major);
        }
    }
}

#[test]
fn serialize_roundtrip() {
    let s = scenario_schema();
    let bytes = s.serialize();
    assert_eq!(b"TDBS", &bytes[0..4]);
    let back = SchemaData::deserialize(&bytes).unwrap();
    assert_eq!(s.array_name, back.array_name);
    assert_eq!(s.array_type, back.array_type);
    assert_eq!(s.domain.bounds(), back.domain.bounds());
    assert_eq!(s.attributes.len(), back.attributes.len());
    assert_eq!(s.cells_per_tile(), back.cells_per_tile());
}

#[test]
fn deserialize_rejects_bad_magic() {
    let mut bytes = scenario_schema().serialize();
    bytes[0] = b'X';
    assert!(matches!(
        SchemaData::deserialize(&bytes),
        Err(Error::BadMagic)
    ));
}

#[test]
fn deserialize_rejects_truncated_input() {
    let bytes = scenario_schema().serialize();
    assert!(SchemaData::deserialize(&bytes[0..8]).is_err());
}

#[test]
fn duplicate_field_name_rejected() {
    let mut s = scenario_schema();
    s.attributes[0].name = "row".to_string();
    assert!(matches!(
        SchemaData::new(
            s.array_name,
            s.array_type,
            s.domain,
            s.attributes,
            s.capacity,
            s.cell_order,
            s.tile_order,
            s.consolidation_step,
        ),
        Err(Error::DuplicateFieldName(_))
    ));
}

#[test]
fn dense_without_tile_extents_rejected() {
    let domain = DomainData {
        dimension: vec![DimensionData {
            name: "row".to_string(),
            datatype: Datatype::Int32,
            constraints: DimensionConstraints::from([1i32, 4i32]),
        }],
    };
    assert!(matches!(
        SchemaData::new(
            "bad",
            ArrayType::Dense,
            domain,
            vec![],
            None,
            None,
            None,
            0,
        ),
        Err(Error::MissingTileExtents)
    ));
}

#[test]
fn fill_value_wrong_size_rejected() {
    let mut s = scenario_schema();
    s.attributes[0].fill = Some(vec![0u8; 3]);
    assert!(matches!(
        SchemaData::new(
            s.array_name,
            s.array_type,
            s.domain,
            s.attributes,
            s.capacity,
            s.cell_order,
            s.tile_order,
            s.consolidation_step,
        ),
        Err(Error::FillValueSize { .. })
    ));
}
