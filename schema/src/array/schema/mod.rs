#[cfg(any(test, feature = "proptest-strategies"))]
pub mod strategy;

#[cfg(test)]
mod tests;

use std::iter::FusedIterator;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cellstore_common::array::{ArrayType, CellOrder, CellValNum, TileOrder};
use cellstore_common::datatype::Datatype;
use cellstore_common::key::LookupKey;

use crate::array::attribute::AttributeData;
use crate::array::dimension::DimensionData;
use crate::array::domain::DomainData;

/// Tile capacity used for sparse arrays when `capacity` is not set.
pub const DEFAULT_SPARSE_TILE_CAPACITY: u64 = 10000;

const MAGIC: [u8; 4] = *b"TDBS";
const VERSION: u32 = 1;
const VAR_SENTINEL: u32 = u32::MAX;

/// Offset buffers use a fixed 8-byte (`u64`) width regardless of the
/// attribute's value type.
pub const OFFSET_WIDTH: usize = std::mem::size_of::<u64>();

#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    #[error("domain must have at least one dimension")]
    EmptyDomain,
    #[error("duplicate field name: {0}")]
    DuplicateFieldName(String),
    #[error("dimension datatypes must agree: {0} vs {1}")]
    MixedCoordinateDatatype(String, String),
    #[error("dense arrays require a tile extent on every dimension")]
    MissingTileExtents,
    #[error(
        "fill value for attribute {name} must be {expected} bytes, got {actual}"
    )]
    FillValueSize {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("truncated schema bytes: expected at least {0} more bytes")]
    Truncated(usize),
    #[error("bad magic bytes, this is not a schema")]
    BadMagic,
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u32),
    #[error("invalid datatype tag {0}")]
    InvalidDatatypeTag(u8),
    #[error("invalid order tag {0}")]
    InvalidOrderTag(u8),
    #[error("invalid cell_val_num {0}")]
    InvalidCellValNum(u32),
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
}

/// Encapsulation of data needed to construct a schema: the "what" of an
/// array, answering sizing and ordering questions without touching any
/// fragment's bytes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct SchemaData {
    pub array_name: String,
    pub array_type: ArrayType,
    pub domain: DomainData,
    pub attributes: Vec<AttributeData>,
    pub capacity: Option<u64>,
    pub cell_order: Option<CellOrder>,
    pub tile_order: Option<TileOrder>,
    pub consolidation_step: u32,
}

impl SchemaData {
    /// Validates and constructs a schema. Fails with [`Error`] (mapped by
    /// callers to `schema_misuse`) if dimension/attribute names collide,
    /// the domain is empty, dimensions disagree on coordinate datatype,
    /// a dense array is missing a tile extent on some dimension, or a
    /// fill value is the wrong size for its attribute.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        array_name: impl Into<String>,
        array_type: ArrayType,
        domain: DomainData,
        attributes: Vec<AttributeData>,
        capacity: Option<u64>,
        cell_order: Option<CellOrder>,
        tile_order: Option<TileOrder>,
        consolidation_step: u32,
    ) -> Result<Self, Error> {
        let schema = SchemaData {
            array_name: array_name.into(),
            array_type,
            domain,
            attributes,
            capacity,
            cell_order,
            tile_order,
            consolidation_step,
        };
        schema.validate()?;
        Ok(schema)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.domain.dimension.is_empty() {
            return Err(Error::EmptyDomain);
        }

        let mut names = std::collections::HashSet::new();
        for f in self.fields() {
            if !names.insert(f.name().to_string()) {
                return Err(Error::DuplicateFieldName(f.name().to_string()));
            }
        }

        let coord_dtype = self.domain.dimension[0].datatype;
        for d in self.domain.dimension.iter().skip(1) {
            if d.datatype != coord_dtype {
                return Err(Error::MixedCoordinateDatatype(
                    format!("{}", coord_dtype),
                    format!("{}", d.datatype),
                ));
            }
        }

        if matches!(self.array_type, ArrayType::Dense)
            && self.domain.num_cells_per_tile().is_none()
        {
            return Err(Error::MissingTileExtents);
        }

        for a in self.attributes.iter() {
            if let Some(fill) = a.fill.as_ref() {
                let expected = self.cell_size_of(a);
                if fill.len() != expected {
                    return Err(Error::FillValueSize {
                        name: a.name.clone(),
                        expected,
                        actual: fill.len(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn num_fields(&self) -> usize {
        self.domain.dimension.len() + self.attributes.len()
    }

    pub fn fields(&self) -> FieldDataIter {
        FieldDataIter {
            schema: self,
            pos: 0,
        }
    }

    pub fn field<K: Into<LookupKey>>(&self, key: K) -> Option<FieldData> {
        match key.into() {
            LookupKey::Index(i) => {
                let ndim = self.domain.dimension.len();
                if i < ndim {
                    Some(FieldData::Dimension(
                        self.domain.dimension[i].clone(),
                    ))
                } else {
                    self.attributes
                        .get(i - ndim)
                        .cloned()
                        .map(FieldData::Attribute)
                }
            }
            LookupKey::Name(name) => self.fields().find(|f| f.name() == name),
        }
    }

    pub fn attribute_id(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == name)
    }

    pub fn attribute(&self, id: usize) -> Option<&AttributeData> {
        self.attributes.get(id)
    }

    /// The coordinate datatype shared by every dimension (validated
    /// uniform at construction).
    pub fn coord_dtype(&self) -> Datatype {
        self.domain.dimension[0].datatype
    }

    pub fn is_var(&self, id: usize) -> bool {
        self.attribute(id)
            .map(|a| a.cell_val_num().is_var_sized())
            .unwrap_or(false)
    }

    fn cell_size_of(&self, a: &AttributeData) -> usize {
        match a.cell_val_num() {
            CellValNum::Var => OFFSET_WIDTH,
            CellValNum::Fixed(nz) => a.datatype.size() * nz.get() as usize,
        }
    }

    /// Bytes occupied by a single cell of attribute `id`; for a `VAR`
    /// attribute this is the offset buffer's element width, not the
    /// value width (the value buffer has no fixed per-cell size).
    pub fn cell_size(&self, id: usize) -> Option<usize> {
        self.attribute(id).map(|a| self.cell_size_of(a))
    }

    /// `D * width(coord_dtype)`: the byte size of one coordinate tuple.
    pub fn coords_size(&self) -> usize {
        self.domain.dimension.len() * self.coord_dtype().size()
    }

    /// Product of tile extents; only meaningful (and only `Some`) for
    /// dense arrays, where every dimension has a tile extent by
    /// construction.
    pub fn cells_per_tile(&self) -> Option<usize> {
        if matches!(self.array_type, ArrayType::Dense) {
            self.domain.num_cells_per_tile()
        } else {
            None
        }
    }

    /// Tile capacity to use for sparse writes: `capacity`, falling back
    /// to [`DEFAULT_SPARSE_TILE_CAPACITY`].
    pub fn sparse_tile_capacity(&self) -> u64 {
        self.capacity.unwrap_or(DEFAULT_SPARSE_TILE_CAPACITY)
    }

    /// Maps a global coordinate to the per-dimension tile index it falls
    /// into, using each dimension's tile extent and domain lower bound.
    /// Panics if any dimension lacks a tile extent; callers should only
    /// call this for dense schemas (see [`Self::cells_per_tile`]).
    pub fn tile_coord_of(&self, coord: &[i128]) -> Vec<i128> {
        assert_eq!(coord.len(), self.domain.dimension.len());
        self.domain
            .dimension
            .iter()
            .zip(coord.iter())
            .map(|(d, &c)| {
                let (low, _high) = d.domain_i128();
                let extent = d
                    .constraints
                    .num_cells_per_tile()
                    .expect("tile_coord_of requires a tile extent")
                    as i128;
                (c - low).div_euclid(extent)
            })
            .collect()
    }

    /// Maps a global coordinate to its offset within its own tile.
    pub fn tile_offset_of(&self, coord: &[i128]) -> Vec<i128> {
        assert_eq!(coord.len(), self.domain.dimension.len());
        self.domain
            .dimension
            .iter()
            .zip(coord.iter())
            .map(|(d, &c)| {
                let (low, _high) = d.domain_i128();
                let extent = d
                    .constraints
                    .num_cells_per_tile()
                    .expect("tile_offset_of requires a tile extent")
                    as i128;
                (c - low).rem_euclid(extent)
            })
            .collect()
    }

    /// Maps a D-tuple `coord` (each component zero-based within `bounds`)
    /// to its linear position under row-major order: the last dimension
    /// varies fastest.
    pub fn linearize_row_major(coord: &[i128], bounds: &[i128]) -> i128 {
        assert_eq!(coord.len(), bounds.len());
        let mut pos = 0i128;
        for i in 0..coord.len() {
            pos = pos * bounds[i] + coord[i];
        }
        pos
    }

    /// As [`Self::linearize_row_major`] but the first dimension varies
    /// fastest.
    pub fn linearize_col_major(coord: &[i128], bounds: &[i128]) -> i128 {
        assert_eq!(coord.len(), bounds.len());
        let mut pos = 0i128;
        for i in (0..coord.len()).rev() {
            pos = pos * bounds[i] + coord[i];
        }
        pos
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(&VERSION.to_le_bytes());
        write_string(&mut out, &self.array_name);

        out.extend_from_slice(&(self.attributes.len() as u32).to_le_bytes());
        for a in self.attributes.iter() {
            write_string(&mut out, &a.name);
            out.push(datatype_tag(a.datatype));
            let cvn: u32 = a.cell_val_num().into();
            out.extend_from_slice(&cvn.to_le_bytes());
        }

        out.extend_from_slice(
            &(self.domain.dimension.len() as u32).to_le_bytes(),
        );
        for d in self.domain.dimension.iter() {
            write_string(&mut out, &d.name);
        }

        out.push(datatype_tag(self.coord_dtype()));

        cellstore_common::datatype_go!(self.coord_dtype(), DT, {
            for d in self.domain.dimension.iter() {
                let (low, high) = d.domain_i128();
                out.extend_from_slice(&i128_to_dt::<DT>(low).to_le_bytes_vec());
                out.extend_from_slice(&i128_to_dt::<DT>(high).to_le_bytes_vec());
            }

            let has_tile_extents = self.domain.num_cells_per_tile().is_some();
            out.push(has_tile_extents as u8);
            if has_tile_extents {
                for d in self.domain.dimension.iter() {
                    let extent =
                        d.constraints.num_cells_per_tile().unwrap() as i128;
                    out.extend_from_slice(
                        &i128_to_dt::<DT>(extent).to_le_bytes_vec(),
                    );
                }
            }
        });

        out.push(order_tag(self.cell_order.unwrap_or(CellOrder::RowMajor)));
        out.push(order_tag_tile(
            self.tile_order.unwrap_or(TileOrder::RowMajor),
        ));

        out.extend_from_slice(&self.sparse_tile_capacity().to_le_bytes());
        out.extend_from_slice(&self.consolidation_step.to_le_bytes());
        out.push(matches!(self.array_type, ArrayType::Dense) as u8);

        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(bytes);
        if r.take(4)? != MAGIC {
            return Err(Error::BadMagic);
        }
        let version = r.u32()?;
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let array_name = r.string()?;

        let attribute_count = r.u32()? as usize;
        let mut attributes = Vec::with_capacity(attribute_count);
        for _ in 0..attribute_count {
            let name = r.string()?;
            let datatype = datatype_from_tag(r.u8()?)?;
            let cvn = r.u32()?;
            let cell_val_num = Some(cell_val_num_from_wire(cvn)?);
            attributes.push(AttributeData {
                name,
                datatype,
                cell_val_num,
                fill: None,
            });
        }

        let dim_count = r.u32()? as usize;
        let mut dim_names = Vec::with_capacity(dim_count);
        for _ in 0..dim_count {
            dim_names.push(r.string()?);
        }

        let coord_dtype = datatype_from_tag(r.u8()?)?;

        let mut dimension = Vec::with_capacity(dim_count);
        cellstore_common::datatype_go!(coord_dtype, DT, {
            let mut bounds = Vec::with_capacity(dim_count);
            for _ in 0..dim_count {
                let low =
                    DT::from_le_bytes_vec(r.take(std::mem::size_of::<DT>())?);
                let high =
                    DT::from_le_bytes_vec(r.take(std::mem::size_of::<DT>())?);
                bounds.push((low, high));
            }

            let has_tile_extents = r.u8()? == 1;
            let extents: Vec<Option<DT>> = if has_tile_extents {
                let mut v = Vec::with_capacity(dim_count);
                for _ in 0..dim_count {
                    v.push(Some(DT::from_le_bytes_vec(
                        r.take(std::mem::size_of::<DT>())?,
                    )));
                }
                v
            } else {
                vec![None; dim_count]
            };

            for (name, ((low, high), extent)) in dim_names
                .into_iter()
                .zip(bounds.into_iter().zip(extents.into_iter()))
            {
                dimension.push(DimensionData {
                    name,
                    datatype: coord_dtype,
                    constraints:
                        cellstore_common::array::dimension::DimensionConstraints::from((
                            [low, high],
                            extent,
                        )),
                });
            }
        });

        let cell_order = Some(order_from_tag(r.u8()?)?);
        let tile_order = Some(order_from_tag_tile(r.u8()?)?);

        let capacity = r.u64()?;
        let consolidation_step = r.u32()?;
        let dense = r.u8()? != 0;

        SchemaData::new(
            array_name,
            if dense {
                ArrayType::Dense
            } else {
                ArrayType::Sparse
            },
            DomainData { dimension },
            attributes,
            Some(capacity),
            cell_order,
            tile_order,
            consolidation_step,
        )
    }
}

/// Field accessed by position or name: either a dimension (part of the
/// coordinate domain) or an attribute (a value carried per cell).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldData {
    Dimension(DimensionData),
    Attribute(AttributeData),
}

impl FieldData {
    pub fn is_dimension(&self) -> bool {
        matches!(self, FieldData::Dimension(_))
    }

    pub fn is_attribute(&self) -> bool {
        matches!(self, FieldData::Attribute(_))
    }

    pub fn name(&self) -> &str {
        match self {
            FieldData::Dimension(d) => &d.name,
            FieldData::Attribute(a) => &a.name,
        }
    }

    pub fn datatype(&self) -> Datatype {
        match self {
            FieldData::Dimension(d) => d.datatype,
            FieldData::Attribute(a) => a.datatype,
        }
    }

    pub fn cell_val_num(&self) -> CellValNum {
        match self {
            FieldData::Dimension(d) => d.cell_val_num(),
            FieldData::Attribute(a) => a.cell_val_num(),
        }
    }
}

impl From<DimensionData> for FieldData {
    fn from(value: DimensionData) -> Self {
        FieldData::Dimension(value)
    }
}

impl From<AttributeData> for FieldData {
    fn from(value: AttributeData) -> Self {
        FieldData::Attribute(value)
    }
}

pub struct FieldDataIter<'a> {
    schema: &'a SchemaData,
    pos: usize,
}

impl Iterator for FieldDataIter<'_> {
    type Item = FieldData;

    fn next(&mut self) -> Option<Self::Item> {
        let field = self.schema.field(self.pos)?;
        self.pos += 1;
        Some(field)
    }
}

impl FusedIterator for FieldDataIter<'_> {}

fn write_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn datatype_tag(dt: Datatype) -> u8 {
    match dt {
        Datatype::Int8 => 0,
        Datatype::Int16 => 1,
        Datatype::Int32 => 2,
        Datatype::Int64 => 3,
        Datatype::UInt8 => 4,
        Datatype::UInt16 => 5,
        Datatype::UInt32 => 6,
        Datatype::UInt64 => 7,
        Datatype::Float32 => 8,
        Datatype::Float64 => 9,
        Datatype::Byte => 10,
        Datatype::Char => 11,
    }
}

fn datatype_from_tag(tag: u8) -> Result<Datatype, Error> {
    Ok(match tag {
        0 => Datatype::Int8,
        1 => Datatype::Int16,
        2 => Datatype::Int32,
        3 => Datatype::Int64,
        4 => Datatype::UInt8,
        5 => Datatype::UInt16,
        6 => Datatype::UInt32,
        7 => Datatype::UInt64,
        8 => Datatype::Float32,
        9 => Datatype::Float64,
        10 => Datatype::Byte,
        11 => Datatype::Char,
        other => return Err(Error::InvalidDatatypeTag(other)),
    })
}

fn cell_val_num_from_wire(v: u32) -> Result<CellValNum, Error> {
    if v == VAR_SENTINEL {
        Ok(CellValNum::Var)
    } else {
        CellValNum::try_from(v).map_err(|_| Error::InvalidCellValNum(v))
    }
}

fn order_tag(order: CellOrder) -> u8 {
    match order {
        CellOrder::RowMajor | CellOrder::Unordered | CellOrder::Global => 0,
        CellOrder::ColumnMajor => 1,
        CellOrder::Hilbert => 2,
    }
}

fn order_from_tag(tag: u8) -> Result<CellOrder, Error> {
    Ok(match tag {
        0 => CellOrder::RowMajor,
        1 => CellOrder::ColumnMajor,
        2 => CellOrder::Hilbert,
        other => return Err(Error::InvalidOrderTag(other)),
    })
}

fn order_tag_tile(order: TileOrder) -> u8 {
    match order {
        TileOrder::RowMajor => 0,
        TileOrder::ColumnMajor => 1,
        TileOrder::Hilbert => 2,
    }
}

fn order_from_tag_tile(tag: u8) -> Result<TileOrder, Error> {
    Ok(match tag {
        0 => TileOrder::RowMajor,
        1 => TileOrder::ColumnMajor,
        2 => TileOrder::Hilbert,
        other => return Err(Error::InvalidOrderTag(other)),
    })
}

/// Narrows an `i128` domain bound back to the dimension's physical type
/// for wire encoding. Values here always originated from that same
/// physical type (see [`DimensionData::domain_i128`]), so the cast is
/// exact.
fn i128_to_dt<DT: LeBytes>(v: i128) -> DT {
    DT::from_i128_truncating(v)
}

/// Minimal little-endian codec used only for schema (de)serialization of
/// the coordinate physical types.
trait LeBytes: Copy {
    fn to_le_bytes_vec(self) -> Vec<u8>;
    fn from_le_bytes_vec(bytes: Vec<u8>) -> Self;
    fn from_i128_truncating(v: i128) -> Self;
}

macro_rules! impl_le_bytes {
    ($($t:ty),+) => {
        $(
            impl LeBytes for $t {
                fn to_le_bytes_vec(self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
                fn from_le_bytes_vec(bytes: Vec<u8>) -> Self {
                    let arr: [u8; std::mem::size_of::<$t>()] =
                        bytes.try_into().expect("wrong byte width");
                    <$t>::from_le_bytes(arr)
                }
                fn from_i128_truncating(v: i128) -> Self {
                    v as $t
                }
            }
        )+
    };
}

impl_le_bytes!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64);

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        if self.bytes.len() - self.pos < n {
            return Err(Error::Truncated(n - (self.bytes.len() - self.pos)));
        }
        let out = self.bytes[self.pos..self.pos + n].to_vec();
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, Error> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, Error> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<String, Error> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidUtf8)
    }
}
