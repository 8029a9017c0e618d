//! The caller-facing query surface (`spec.md` §3 `Query`, §6 Read API):
//! a builder that pins down the array, subarray, selected attributes,
//! mode, and caller buffers, and a `Query` handle that drives reads
//! through [`crate::unsorted::UnsortedReader`] or
//! [`crate::sorted::SortedReader`] depending on mode.

use std::collections::HashSet;
use std::sync::Arc;

use cellstore_schema::array::SchemaData;

use crate::domain_arithmetic::Subarray;
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::sorted::SortedReader;
use crate::unsorted::UnsortedReader;

/// How the caller wants cells ordered, per `spec.md` §3 `Query.mode`
/// (`write`/`write_unsorted` are out of scope for this crate's read
/// path).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueryLayout {
    Global,
    SortedRow,
    SortedCol,
}

/// The subset of `tiledb-common`'s `QueryStatus` state names this
/// crate's read path can actually produce (`spec.md` §6,
/// `SPEC_FULL.md` §6 ADDED). There is no `Uninitialized`/`Initialized`/
/// `InProgress` here: a `Query` is either mid-flight (tracked by the
/// caller holding it), incomplete, completed, or failed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum QueryStatus {
    Completed,
    /// `incomplete_overflow(attr_id set)`: re-invoke with larger or
    /// drained buffers to continue.
    Incomplete(HashSet<usize>),
    Failed,
}

/// One fixed-size attribute's caller buffer and its in/out byte cursor.
pub struct FixedBuffer<'a> {
    pub attr: usize,
    pub data: &'a mut [u8],
    pub written: usize,
}

/// One variable-length attribute's caller buffers (offsets, values) and
/// their in/out byte cursors.
pub struct VarBuffer<'a> {
    pub attr: usize,
    pub offsets: &'a mut [u8],
    pub offsets_written: usize,
    pub values: &'a mut [u8],
    pub values_written: usize,
}

/// Either flavor of per-attribute buffer a caller hands in for one
/// `read()` call, per `spec.md` §3 invariant I3.
pub enum AttributeBuffer<'a> {
    Fixed(FixedBuffer<'a>),
    Var(VarBuffer<'a>),
}

impl AttributeBuffer<'_> {
    fn attr(&self) -> usize {
        match self {
            AttributeBuffer::Fixed(b) => b.attr,
            AttributeBuffer::Var(b) => b.attr,
        }
    }
}

enum Reader {
    Unsorted(UnsortedReader),
    Sorted(SortedReader),
}

/// A built, not-yet-finalized read query over one array.
///
/// `Query` owns the merge/rearrangement state (an `UnsortedReader` or a
/// `SortedReader`, depending on `layout`) and is driven by repeated
/// calls to [`Self::read`] until it reports [`QueryStatus::Completed`]
/// or [`QueryStatus::Failed`].
pub struct Query {
    reader: Reader,
    attribute_ids: Vec<usize>,
    finalized: bool,
}

impl Query {
    fn new(reader: Reader, attribute_ids: Vec<usize>) -> Self {
        Query {
            reader,
            attribute_ids,
            finalized: false,
        }
    }

    /// Drives one step of the query, writing into `buffers` (one entry
    /// per selected attribute, in `attribute_ids` order) and reporting
    /// the resulting [`QueryStatus`].
    ///
    /// Per `spec.md` §6, a zero-byte write for an attribute means that
    /// attribute is either finished or overflowed; the returned status
    /// disambiguates via the `Incomplete` attribute-id set.
    pub fn read(&mut self, buffers: &mut [AttributeBuffer<'_>]) -> Result<QueryStatus> {
        if self.finalized {
            return Err(Error::query_misuse("read() called on a finalized query"));
        }

        let mut incomplete = HashSet::new();
        for buf in buffers.iter_mut() {
            let attr = buf.attr();
            if !self.attribute_ids.contains(&attr) {
                return Err(Error::query_misuse(format!(
                    "attribute {attr} was not selected for this query"
                )));
            }

            let done = match (&mut self.reader, buf) {
                (Reader::Unsorted(r), AttributeBuffer::Fixed(b)) => {
                    let mut off = b.written;
                    let done = r.read_attribute(attr, b.data, &mut off)?;
                    b.written = off;
                    done
                }
                (Reader::Unsorted(r), AttributeBuffer::Var(b)) => {
                    let mut offs_off = b.offsets_written;
                    let mut vals_off = b.values_written;
                    let done = r.read_attribute_var(
                        attr,
                        b.offsets,
                        &mut offs_off,
                        b.values,
                        &mut vals_off,
                    )?;
                    b.offsets_written = offs_off;
                    b.values_written = vals_off;
                    done
                }
                (Reader::Sorted(r), AttributeBuffer::Fixed(b)) => {
                    let mut off = b.written;
                    let done = r.read_attribute(attr, b.data, &mut off)?;
                    b.written = off;
                    done
                }
                (Reader::Sorted(r), AttributeBuffer::Var(b)) => {
                    let mut offs_off = b.offsets_written;
                    let mut vals_off = b.values_written;
                    let done = r.read_attribute_var(
                        attr,
                        b.offsets,
                        &mut offs_off,
                        b.values,
                        &mut vals_off,
                    )?;
                    b.offsets_written = offs_off;
                    b.values_written = vals_off;
                    done
                }
            };

            if !done {
                incomplete.insert(attr);
            }
        }

        if incomplete.is_empty() {
            Ok(QueryStatus::Completed)
        } else {
            Ok(QueryStatus::Incomplete(incomplete))
        }
    }

    /// Idempotent finalize (`spec.md` §8 P8): the first call releases
    /// this query's readers; later calls are a no-op and still report
    /// `Completed`.
    pub fn finalize(&mut self) -> QueryStatus {
        self.finalized = true;
        QueryStatus::Completed
    }
}

/// Builds a [`Query`] over one array handle's schema and fragments, per
/// `spec.md` §3 `Query` and §6 Read API.
pub struct QueryBuilder {
    schema: SchemaData,
    fragments: Vec<Arc<dyn Fragment>>,
    layout: QueryLayout,
    subarray: Option<Subarray>,
    attribute_ids: Vec<usize>,
    sparse_bank_capacity: std::collections::HashMap<usize, usize>,
}

impl QueryBuilder {
    pub fn new(schema: SchemaData, fragments: Vec<Arc<dyn Fragment>>) -> Self {
        QueryBuilder {
            schema,
            fragments,
            layout: QueryLayout::Global,
            subarray: None,
            attribute_ids: Vec::new(),
            sparse_bank_capacity: std::collections::HashMap::new(),
        }
    }

    pub fn layout(mut self, layout: QueryLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn subarray(mut self, subarray: Subarray) -> Self {
        self.subarray = Some(subarray);
        self
    }

    /// Selects the attributes this query materializes. Per `spec.md`
    /// §3, must be non-empty and unique; checked in [`Self::build`].
    pub fn attributes(mut self, attribute_ids: Vec<usize>) -> Self {
        self.attribute_ids = attribute_ids;
        self
    }

    /// Open Question #3 resolution (`SPEC_FULL.md` §9 item 3): per-
    /// attribute initial sparse bank capacity for [`SortedReader`],
    /// rather than one shared knob.
    pub fn sparse_bank_capacity(mut self, attr: usize, capacity: usize) -> Self {
        self.sparse_bank_capacity.insert(attr, capacity);
        self
    }

    pub fn build(self) -> Result<Query> {
        crate::validate_schema(&self.schema)?;

        if self.attribute_ids.is_empty() {
            return Err(Error::query_misuse("a query must select at least one attribute"));
        }
        let mut seen = HashSet::new();
        for &a in &self.attribute_ids {
            if !seen.insert(a) {
                return Err(Error::query_misuse(format!("attribute {a} selected twice")));
            }
            if self.schema.attribute(a).is_none() {
                return Err(Error::query_misuse(format!("no such attribute: {a}")));
            }
        }

        let subarray = self
            .subarray
            .ok_or_else(|| Error::query_misuse("a query must specify a subarray"))?;

        let reader = match self.layout {
            QueryLayout::Global => Reader::Unsorted(UnsortedReader::new(
                self.schema,
                self.fragments,
                subarray,
            )?),
            QueryLayout::SortedRow => Reader::Sorted(SortedReader::new(
                self.schema,
                self.fragments,
                subarray,
                crate::sorted::SortOrder::Row,
                self.sparse_bank_capacity,
            )?),
            QueryLayout::SortedCol => Reader::Sorted(SortedReader::new(
                self.schema,
                self.fragments,
                subarray,
                crate::sorted::SortOrder::Col,
                self.sparse_bank_capacity,
            )?),
        };

        Ok(Query::new(reader, self.attribute_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellstore_common::array::{ArrayType, CellOrder, CellValNum, TileOrder};
    use cellstore_common::array::dimension::DimensionConstraints;
    use cellstore_common::datatype::Datatype;
    use cellstore_schema::array::attribute::AttributeData;
    use cellstore_schema::array::dimension::DimensionData;
    use cellstore_schema::array::domain::DomainData;

    use crate::fragment::{AttributeStorage, MemFragment};

    fn schema() -> SchemaData {
        SchemaData::new(
            "a",
            ArrayType::Dense,
            DomainData {
                dimension: vec![DimensionData {
                    name: "d".into(),
                    datatype: Datatype::Int32,
                    constraints: DimensionConstraints::from(([0i32, 3i32], 4i32)),
                }],
            },
            vec![AttributeData {
                name: "a".into(),
                datatype: Datatype::Int8,
                cell_val_num: Some(CellValNum::single()),
                fill: None,
            }],
            None,
            Some(CellOrder::RowMajor),
            Some(TileOrder::RowMajor),
            0,
        )
        .unwrap()
    }

    fn fragments() -> Vec<Arc<dyn Fragment>> {
        vec![Arc::new(
            MemFragment::dense(
                1,
                CellOrder::RowMajor,
                vec![(0, 3)],
                vec![AttributeStorage::Fixed(vec![1, 2, 3, 4])],
            )
            .unwrap(),
        ) as Arc<dyn Fragment>]
    }

    #[test]
    fn global_query_reads_to_completion() {
        let mut query = QueryBuilder::new(schema(), fragments())
            .layout(QueryLayout::Global)
            .subarray(vec![(0, 3)])
            .attributes(vec![0])
            .build()
            .unwrap();

        let mut data = vec![0u8; 4];
        let mut buffers = vec![AttributeBuffer::Fixed(FixedBuffer {
            attr: 0,
            data: &mut data,
            written: 0,
        })];
        let status = query.read(&mut buffers).unwrap();
        assert_eq!(QueryStatus::Completed, status);
        drop(buffers);
        assert_eq!(vec![1, 2, 3, 4], data);
    }

    #[test]
    fn unselected_attribute_is_query_misuse() {
        let mut query = QueryBuilder::new(schema(), fragments())
            .layout(QueryLayout::Global)
            .subarray(vec![(0, 3)])
            .attributes(vec![0])
            .build()
            .unwrap();

        let mut data = vec![0u8; 4];
        let mut buffers = vec![AttributeBuffer::Fixed(FixedBuffer {
            attr: 7,
            data: &mut data,
            written: 0,
        })];
        let err = query.read(&mut buffers).unwrap_err();
        assert_eq!(crate::ErrorKind::QueryMisuse, err.kind());
    }

    #[test]
    fn empty_attribute_selection_rejected_at_build() {
        let err = QueryBuilder::new(schema(), fragments())
            .layout(QueryLayout::Global)
            .subarray(vec![(0, 3)])
            .build()
            .unwrap_err();
        assert_eq!(crate::ErrorKind::QueryMisuse, err.kind());
    }

    fn schema_2d() -> SchemaData {
        SchemaData::new(
            "a",
            ArrayType::Dense,
            DomainData {
                dimension: vec![
                    DimensionData {
                        name: "row".into(),
                        datatype: Datatype::Int32,
                        constraints: DimensionConstraints::from(([0i32, 3i32], 4i32)),
                    },
                    DimensionData {
                        name: "col".into(),
                        datatype: Datatype::Int32,
                        constraints: DimensionConstraints::from(([0i32, 3i32], 1i32)),
                    },
                ],
            },
            vec![AttributeData {
                name: "a".into(),
                datatype: Datatype::Int8,
                cell_val_num: Some(CellValNum::single()),
                fill: None,
            }],
            None,
            Some(CellOrder::RowMajor),
            Some(TileOrder::RowMajor),
            0,
        )
        .unwrap()
    }

    #[test]
    fn sorted_col_query_rearranges_through_the_builder() {
        let values: Vec<u8> = (0..16).collect();
        let fragments: Vec<Arc<dyn Fragment>> = vec![Arc::new(
            MemFragment::dense(
                1,
                CellOrder::RowMajor,
                vec![(0, 3), (0, 3)],
                vec![AttributeStorage::Fixed(values)],
            )
            .unwrap(),
        ) as Arc<dyn Fragment>];

        let mut query = QueryBuilder::new(schema_2d(), fragments)
            .layout(QueryLayout::SortedCol)
            .subarray(vec![(0, 3), (0, 3)])
            .attributes(vec![0])
            .build()
            .unwrap();

        let mut data = vec![0u8; 16];
        let mut buffers = vec![AttributeBuffer::Fixed(FixedBuffer {
            attr: 0,
            data: &mut data,
            written: 0,
        })];
        let status = query.read(&mut buffers).unwrap();
        assert_eq!(QueryStatus::Completed, status);
        drop(buffers);
        assert_eq!(
            vec![0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15],
            data
        );
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut query = QueryBuilder::new(schema(), fragments())
            .layout(QueryLayout::Global)
            .subarray(vec![(0, 3)])
            .attributes(vec![0])
            .build()
            .unwrap();
        assert_eq!(QueryStatus::Completed, query.finalize());
        assert_eq!(QueryStatus::Completed, query.finalize());
    }

    #[test]
    fn finalized_query_rejects_further_reads() {
        let mut query = QueryBuilder::new(schema(), fragments())
            .layout(QueryLayout::Global)
            .subarray(vec![(0, 3)])
            .attributes(vec![0])
            .build()
            .unwrap();
        query.finalize();

        let mut data = vec![0u8; 4];
        let mut buffers = vec![AttributeBuffer::Fixed(FixedBuffer {
            attr: 0,
            data: &mut data,
            written: 0,
        })];
        let err = query.read(&mut buffers).unwrap_err();
        assert_eq!(crate::ErrorKind::QueryMisuse, err.kind());
    }
}
