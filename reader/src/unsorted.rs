//! Global-order merge across a fixed set of fragments (`spec.md` §4.3).
//!
//! The whole read plan for a subarray is resolved once, at construction,
//! into an ordered list of [`Emission`]s: either a contiguous run of
//! cells copied out of a single fragment, or (dense arrays only) a run
//! of cells with no fragment contribution that must be synthesized from
//! the attribute's fill value. Each attribute then walks this list with
//! its own cursor, so one attribute overflowing its caller buffer never
//! blocks another attribute's progress, and a later call with a fresh
//! buffer resumes exactly where the overflowing attribute left off.

use std::collections::HashMap;
use std::sync::Arc;

use cellstore_common::array::ArrayType;
use cellstore_schema::array::SchemaData;

use crate::domain_arithmetic::{self, Coord, Subarray};
use crate::error::{Error, Result};
use crate::fragment::{self, CopyOutcome, Fragment, FragmentId};

const OFFSET_WIDTH: usize = cellstore_schema::array::schema::OFFSET_WIDTH;

#[derive(Clone, Debug)]
enum Emission {
    /// `[pos_range.0, pos_range.1]` fragment-local positions, contiguous,
    /// all owned by `fragment_idx` after newest-wins resolution.
    Cells {
        fragment_idx: usize,
        pos_range: (usize, usize),
    },
    /// `len` consecutive cells (in cell order) with no surviving
    /// fragment contribution.
    Hole { len: usize },
}

struct EmissionBuilder {
    out: Vec<Emission>,
    hole_run: usize,
    cell_run: Option<(usize, usize, usize)>,
}

impl EmissionBuilder {
    fn new() -> Self {
        EmissionBuilder {
            out: Vec::new(),
            hole_run: 0,
            cell_run: None,
        }
    }

    fn flush_hole(&mut self) {
        if self.hole_run > 0 {
            self.out.push(Emission::Hole { len: self.hole_run });
            self.hole_run = 0;
        }
    }

    fn flush_cells(&mut self) {
        if let Some((fragment_idx, s, e)) = self.cell_run.take() {
            self.out.push(Emission::Cells {
                fragment_idx,
                pos_range: (s, e),
            });
        }
    }

    fn push_cell(&mut self, fragment_idx: usize, pos: usize) {
        self.flush_hole();
        match &mut self.cell_run {
            Some((fi, _s, e)) if *fi == fragment_idx && *e + 1 == pos => {
                *e = pos;
            }
            _ => {
                self.flush_cells();
                self.cell_run = Some((fragment_idx, pos, pos));
            }
        }
    }

    fn push_hole(&mut self) {
        self.flush_cells();
        self.hole_run += 1;
    }

    fn finish(mut self) -> Vec<Emission> {
        self.flush_cells();
        self.flush_hole();
        self.out
    }
}

/// Resolves every fragment's contribution to one tile (or, for sparse
/// arrays, the whole subarray) into ordered [`Emission`]s: newest
/// fragment id wins cell-for-cell, duplicate cells within the winning
/// fragment all survive in that fragment's own storage order, and for
/// dense arrays cells no fragment covers become [`Emission::Hole`]s.
fn emit_region(
    schema: &SchemaData,
    fragments: &[Arc<dyn Fragment>],
    region: &Subarray,
    builder: &mut EmissionBuilder,
) {
    let cell_order = schema
        .cell_order
        .unwrap_or(cellstore_common::array::CellOrder::RowMajor);

    let mut per_fragment: Vec<(usize, Vec<usize>)> = Vec::new();
    for (idx, f) in fragments.iter().enumerate() {
        let ranges = f.next_cell_ranges(region, region);
        let mut positions = Vec::new();
        for r in ranges {
            positions.extend(r.pos_range.0..=r.pos_range.1);
        }
        if !positions.is_empty() {
            per_fragment.push((idx, positions));
        }
    }

    let coord_lists: Vec<(FragmentId, Vec<Coord>)> = per_fragment
        .iter()
        .map(|(idx, positions)| {
            let f = &fragments[*idx];
            (
                f.id(),
                positions.iter().map(|&p| f.coord_at(p).to_vec()).collect(),
            )
        })
        .collect();
    let winner = fragment::ownership(coord_lists.iter().map(|(id, c)| (*id, c.as_slice())));

    let mut items: Vec<(Coord, usize, usize)> = Vec::new();
    for (idx, positions) in &per_fragment {
        let id = fragments[*idx].id();
        for &p in positions {
            let c = fragments[*idx].coord_at(p).to_vec();
            if winner.get(&c) == Some(&id) {
                items.push((c, *idx, p));
            }
        }
    }
    items.sort_by(|a, b| domain_arithmetic::cell_order_cmp(cell_order, &a.0, &b.0));

    if matches!(schema.array_type, ArrayType::Dense) {
        let full = domain_arithmetic::enumerate_cells(region, cell_order);
        let mut items = items.into_iter().peekable();
        for coord in full {
            let mut matched = false;
            while let Some((c, _, _)) = items.peek() {
                if *c == coord {
                    matched = true;
                    let (_, idx, pos) = items.next().unwrap();
                    builder.push_cell(idx, pos);
                } else {
                    break;
                }
            }
            if !matched {
                builder.push_hole();
            }
        }
    } else {
        for (_, idx, pos) in items {
            builder.push_cell(idx, pos);
        }
    }
}

/// Merges a fixed set of fragments into one global-order cell stream
/// over a subarray, per `spec.md` §4.3.
pub struct UnsortedReader {
    schema: SchemaData,
    fragments: Vec<Arc<dyn Fragment>>,
    emissions: Vec<Emission>,
    cursors: HashMap<usize, usize>,
}

impl UnsortedReader {
    pub fn new(
        schema: SchemaData,
        fragments: Vec<Arc<dyn Fragment>>,
        subarray: Subarray,
    ) -> Result<Self> {
        if subarray.len() != schema.domain.dimension.len() {
            return Err(Error::query_misuse(format!(
                "subarray has {} dimensions, schema has {}",
                subarray.len(),
                schema.domain.dimension.len()
            )));
        }

        let mut builder = EmissionBuilder::new();
        match schema.array_type {
            ArrayType::Dense => {
                let tile_order = schema
                    .tile_order
                    .unwrap_or(cellstore_common::array::TileOrder::RowMajor);
                let tile_domain = domain_arithmetic::tile_domain(&subarray, &schema);
                for tile_coord in domain_arithmetic::enumerate_tile_coords(&tile_domain, tile_order)
                {
                    let tile_box = domain_arithmetic::tile_bounding_box(&tile_coord, &schema);
                    let Some(region) = domain_arithmetic::intersect(&tile_box, &subarray) else {
                        continue;
                    };
                    emit_region(&schema, &fragments, &region, &mut builder);
                }
            }
            ArrayType::Sparse => {
                emit_region(&schema, &fragments, &subarray, &mut builder);
            }
        }

        Ok(UnsortedReader {
            schema,
            fragments,
            emissions: builder.finish(),
            cursors: HashMap::new(),
        })
    }

    pub fn is_complete(&self, attr: usize) -> bool {
        self.cursors.get(&attr).copied().unwrap_or(0) >= self.emissions.len()
    }

    /// Copies cells for a fixed-size attribute starting from this
    /// attribute's own cursor. Returns `Ok(true)` if the whole subarray
    /// was consumed, `Ok(false)` if `out` filled up first — in which
    /// case the cursor is left exactly before the emission that didn't
    /// fit, and a later call with a fresh buffer resumes there.
    pub fn read_attribute(&mut self, attr: usize, out: &mut [u8], out_off: &mut usize) -> Result<bool> {
        let mut cursor = *self.cursors.get(&attr).unwrap_or(&0);
        while cursor < self.emissions.len() {
            let outcome = match &self.emissions[cursor] {
                Emission::Cells {
                    fragment_idx,
                    pos_range,
                } => self.fragments[*fragment_idx].copy_values(attr, *pos_range, out, out_off)?,
                Emission::Hole { len } => {
                    let fill = fragment::empty_fill(&self.schema, attr, *len);
                    if *out_off + fill.len() > out.len() {
                        CopyOutcome::Overflow
                    } else {
                        out[*out_off..*out_off + fill.len()].copy_from_slice(&fill);
                        *out_off += fill.len();
                        CopyOutcome::Done
                    }
                }
            };
            match outcome {
                CopyOutcome::Done => cursor += 1,
                CopyOutcome::Overflow => break,
            }
        }
        self.cursors.insert(attr, cursor);
        Ok(cursor >= self.emissions.len())
    }

    /// The variable-length counterpart of [`Self::read_attribute`].
    #[allow(clippy::too_many_arguments)]
    pub fn read_attribute_var(
        &mut self,
        attr: usize,
        offs_out: &mut [u8],
        offs_off: &mut usize,
        vals_out: &mut [u8],
        vals_off: &mut usize,
    ) -> Result<bool> {
        let mut cursor = *self.cursors.get(&attr).unwrap_or(&0);
        // Offsets written by both branches below are call-relative (start
        // at 0 at the top of each emission's own write); `running` is the
        // number of value bytes this *call* has already written, so every
        // offset actually stored is shifted to be relative to the start
        // of `vals_out`, keeping P2's "strictly increasing, ends at
        // bytes_written_val" invariant across however many emissions one
        // call processes, not just within a single emission.
        let mut running: u64 = 0;
        while cursor < self.emissions.len() {
            let before_vals_off = *vals_off;
            let before_offs_off = *offs_off;
            let outcome = match &self.emissions[cursor] {
                Emission::Cells {
                    fragment_idx,
                    pos_range,
                } => self.fragments[*fragment_idx].copy_values_var(
                    attr, *pos_range, offs_out, offs_off, vals_out, vals_off,
                )?,
                Emission::Hole { len } => {
                    let fill = fragment::var_fill_bytes(&self.schema, attr);
                    let offs_needed = len * OFFSET_WIDTH;
                    let vals_needed = fill.len() * len;
                    if *offs_off + offs_needed > offs_out.len()
                        || *vals_off + vals_needed > vals_out.len()
                    {
                        CopyOutcome::Overflow
                    } else {
                        let mut local = 0u64;
                        for i in 0..*len {
                            let dst = &mut offs_out[*offs_off + i * 8..*offs_off + (i + 1) * 8];
                            dst.copy_from_slice(&local.to_le_bytes());
                            local += fill.len() as u64;
                        }
                        *offs_off += offs_needed;
                        for _ in 0..*len {
                            vals_out[*vals_off..*vals_off + fill.len()].copy_from_slice(&fill);
                            *vals_off += fill.len();
                        }
                        CopyOutcome::Done
                    }
                }
            };
            if outcome == CopyOutcome::Done {
                if running > 0 {
                    let mut i = before_offs_off;
                    while i < *offs_off {
                        let cur = u64::from_le_bytes(offs_out[i..i + 8].try_into().unwrap());
                        offs_out[i..i + 8].copy_from_slice(&(cur + running).to_le_bytes());
                        i += 8;
                    }
                }
                running += (*vals_off - before_vals_off) as u64;
                cursor += 1;
            } else {
                break;
            }
        }
        self.cursors.insert(attr, cursor);
        Ok(cursor >= self.emissions.len())
    }

    /// The coordinate of every emitted cell, in emission order. Used by
    /// [`crate::sorted::SortedReader`] to sort a sparse bank's cells into
    /// the caller's requested row-/column-major order; dense readers
    /// never need this since a dense region's emission order is exactly
    /// `domain_arithmetic::enumerate_cells(region, cell_order)` and can be
    /// recomputed without consulting any fragment.
    ///
    /// Panics if called on a reader that produced a [`Emission::Hole`]
    /// (dense arrays only); sparse arrays never do.
    pub(crate) fn coords(&self) -> Vec<Coord> {
        self.emissions
            .iter()
            .flat_map(|e| match e {
                Emission::Cells {
                    fragment_idx,
                    pos_range,
                } => (pos_range.0..=pos_range.1)
                    .map(|p| self.fragments[*fragment_idx].coord_at(p).to_vec())
                    .collect::<Vec<_>>(),
                Emission::Hole { .. } => {
                    unreachable!("sparse readers never emit holes")
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellstore_common::array::{CellOrder, CellValNum, TileOrder};
    use cellstore_common::datatype::Datatype;
    use cellstore_schema::array::attribute::AttributeData;
    use cellstore_schema::array::dimension::DimensionData;
    use cellstore_schema::array::domain::DomainData;
    use cellstore_common::array::dimension::DimensionConstraints;

    use crate::fragment::{AttributeStorage, MemFragment};

    fn dim(lo: i32, hi: i32, extent: i32) -> DimensionData {
        DimensionData {
            name: "d".into(),
            datatype: Datatype::Int32,
            constraints: DimensionConstraints::from(([lo, hi], extent)),
        }
    }

    fn attr(name: &str) -> AttributeData {
        AttributeData {
            name: name.into(),
            datatype: Datatype::Int8,
            cell_val_num: Some(CellValNum::single()),
            fill: None,
        }
    }

    fn dense_schema(dims: Vec<DimensionData>) -> SchemaData {
        SchemaData::new(
            "a",
            ArrayType::Dense,
            DomainData { dimension: dims },
            vec![attr("a")],
            None,
            Some(CellOrder::RowMajor),
            Some(TileOrder::RowMajor),
            0,
        )
        .unwrap()
    }

    #[test]
    fn single_fragment_whole_array() {
        let schema = dense_schema(vec![dim(0, 1, 2), dim(0, 1, 2)]);
        let f = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(0, 1), (0, 1)],
            vec![AttributeStorage::Fixed(vec![1, 2, 3, 4])],
        )
        .unwrap();
        let mut reader = UnsortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 1), (0, 1)],
        )
        .unwrap();

        let mut out = vec![0u8; 4];
        let mut off = 0;
        assert!(reader.read_attribute(0, &mut out, &mut off).unwrap());
        assert_eq!(vec![1, 2, 3, 4], out);
    }

    #[test]
    fn newest_fragment_wins_overlapping_region() {
        let schema = dense_schema(vec![dim(1, 2, 2), dim(1, 4, 4)]);
        let older = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(1, 2), (1, 4)],
            vec![AttributeStorage::Fixed(vec![1; 8])],
        )
        .unwrap();
        let newer = MemFragment::dense(
            2,
            CellOrder::RowMajor,
            vec![(1, 1), (1, 4)],
            vec![AttributeStorage::Fixed(vec![2; 4])],
        )
        .unwrap();

        let mut reader = UnsortedReader::new(
            schema,
            vec![
                Arc::new(older) as Arc<dyn Fragment>,
                Arc::new(newer) as Arc<dyn Fragment>,
            ],
            vec![(1, 2), (1, 4)],
        )
        .unwrap();

        let mut out = vec![0u8; 8];
        let mut off = 0;
        assert!(reader.read_attribute(0, &mut out, &mut off).unwrap());
        assert_eq!(vec![2, 2, 2, 2, 1, 1, 1, 1], out);
    }

    #[test]
    fn dense_hole_uses_zero_fill_by_default() {
        let schema = dense_schema(vec![dim(0, 0, 1), dim(1, 4, 4)]);
        let f = MemFragment::sparse(
            1,
            CellOrder::RowMajor,
            vec![vec![0, 2], vec![0, 3]],
            vec![AttributeStorage::Fixed(vec![9, 9])],
        )
        .unwrap();

        let mut reader = UnsortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 0), (1, 4)],
        )
        .unwrap();

        let mut out = vec![0u8; 4];
        let mut off = 0;
        assert!(reader.read_attribute(0, &mut out, &mut off).unwrap());
        assert_eq!(vec![0, 9, 9, 0], out);
    }

    #[test]
    fn sparse_duplicate_coordinates_all_survive_in_storage_order() {
        let schema = SchemaData::new(
            "a",
            ArrayType::Sparse,
            DomainData {
                dimension: vec![dim(0, 9, 10), dim(0, 9, 10)],
            },
            vec![attr("a")],
            None,
            Some(CellOrder::RowMajor),
            None,
            0,
        )
        .unwrap();
        let f = MemFragment::sparse(
            1,
            CellOrder::RowMajor,
            vec![vec![0, 0], vec![0, 0], vec![0, 1]],
            vec![AttributeStorage::Fixed(vec![1, 2, 3])],
        )
        .unwrap();

        let mut reader = UnsortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 9), (0, 9)],
        )
        .unwrap();

        let mut out = vec![0u8; 3];
        let mut off = 0;
        assert!(reader.read_attribute(0, &mut out, &mut off).unwrap());
        assert_eq!(vec![1, 2, 3], out);
    }

    #[test]
    fn overflow_resumes_per_attribute_without_duplicating_cells() {
        // Four tiles of width 1, each written by its own fragment, so
        // each tile contributes its own emission and a 2-cell buffer
        // exercises a real mid-stream overflow rather than all-or-nothing
        // on one big contiguous run.
        let schema = dense_schema(vec![dim(0, 0, 1), dim(0, 3, 1)]);
        let fragments: Vec<Arc<dyn Fragment>> = (0..4i128)
            .map(|i| {
                Arc::new(
                    MemFragment::dense(
                        i as FragmentId + 1,
                        CellOrder::RowMajor,
                        vec![(0, 0), (i, i)],
                        vec![AttributeStorage::Fixed(vec![i as u8 + 1])],
                    )
                    .unwrap(),
                ) as Arc<dyn Fragment>
            })
            .collect();

        let mut reader = UnsortedReader::new(schema, fragments, vec![(0, 0), (0, 3)]).unwrap();

        let mut out = vec![0u8; 2];
        let mut off = 0;
        assert!(!reader.read_attribute(0, &mut out, &mut off).unwrap());
        assert_eq!(vec![1, 2], out);

        let mut out2 = vec![0u8; 2];
        let mut off2 = 0;
        assert!(reader.read_attribute(0, &mut out2, &mut off2).unwrap());
        assert_eq!(vec![3, 4], out2);
    }

    #[test]
    fn var_offsets_accumulate_across_multiple_emissions_in_one_call() {
        // Two separate fragments covering two tiles, so a single
        // read_attribute_var call processes two distinct Cells emissions;
        // offsets for the second emission's cells must continue from
        // where the first emission's value bytes left off, not restart
        // at zero.
        let schema = dense_schema(vec![dim(0, 0, 1), dim(0, 1, 1)]);
        let f0 = MemFragment::new(
            1,
            ArrayType::Dense,
            CellOrder::RowMajor,
            vec![(0, 0), (0, 0)],
            vec![vec![0, 0]],
            vec![AttributeStorage::Var {
                spans: vec![(0, 2)],
                values: vec![b'a', b'b', b'c'],
            }],
        )
        .unwrap();
        let f1 = MemFragment::new(
            2,
            ArrayType::Dense,
            CellOrder::RowMajor,
            vec![(0, 0), (1, 1)],
            vec![vec![0, 1]],
            vec![AttributeStorage::Var {
                spans: vec![(0, 2)],
                values: vec![b'x', b'y'],
            }],
        )
        .unwrap();

        let mut reader = UnsortedReader::new(
            schema,
            vec![Arc::new(f0) as Arc<dyn Fragment>, Arc::new(f1) as Arc<dyn Fragment>],
            vec![(0, 0), (0, 1)],
        )
        .unwrap();

        let mut offs = vec![0u8; 16];
        let mut offs_off = 0;
        let mut vals = vec![0u8; 5];
        let mut vals_off = 0;
        assert!(reader
            .read_attribute_var(0, &mut offs, &mut offs_off, &mut vals, &mut vals_off)
            .unwrap());
        assert_eq!(16, offs_off);
        assert_eq!(5, vals_off);
        assert_eq!(0u64, u64::from_le_bytes(offs[0..8].try_into().unwrap()));
        assert_eq!(3u64, u64::from_le_bytes(offs[8..16].try_into().unwrap()));
        assert_eq!(b"abcxy", vals.as_slice());
    }
}
