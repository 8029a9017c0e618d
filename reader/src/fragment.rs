//! The read-only view of one previously written fragment (`spec.md`
//! §4.2). A `Fragment` never mutates the bytes it was built from; it
//! only exposes the cells that overlap a query's subarray, addressed by
//! fragment-local position in the fragment's own global order.

use std::collections::HashMap;

use cellstore_common::array::{ArrayType, CellOrder};
use cellstore_schema::array::SchemaData;

use crate::domain_arithmetic::{self, Coord, Subarray};
use crate::error::{Error, Result};

pub type FragmentId = u64;

/// How a fragment's contribution to one tile relates to the whole tile,
/// per `spec.md` §4.2.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OverlapType {
    Full,
    PartialContig,
    PartialNonContig,
}

/// A candidate run of fragment-local cell positions overlapping a query,
/// all lying within one tile.
#[derive(Clone, Debug)]
pub struct FragmentCellRange {
    pub fragment_id: FragmentId,
    /// Inclusive `[first, last]` fragment-local positions.
    pub pos_range: (usize, usize),
    pub overlap: OverlapType,
}

/// Whether a copy into a caller buffer completed or the buffer would
/// have overflowed. Per `spec.md` §4.2/§4.3, an overflowing copy writes
/// nothing and leaves the output cursor unchanged.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CopyOutcome {
    Done,
    Overflow,
}

/// One attribute's data as stored by a fragment: either a flat
/// fixed-width buffer, or variable-length spans into a values buffer.
#[derive(Clone, Debug)]
pub enum AttributeStorage {
    Fixed(Vec<u8>),
    Var {
        /// `[start, end)` byte span into `values` for each stored cell.
        spans: Vec<(usize, usize)>,
        values: Vec<u8>,
    },
}

/// The public contract a reader needs from one committed fragment.
///
/// `original_source`'s `StorageManager` only renames a fragment directory
/// to drop its leading `.` once every tile of every attribute has been
/// flushed and fsynced; implementors of this trait MUST only construct a
/// value for a fully committed fragment, so the reader never has to
/// tolerate a partially written one.
pub trait Fragment: Send + Sync {
    fn id(&self) -> FragmentId;
    fn array_type(&self) -> ArrayType;
    fn cell_order(&self) -> CellOrder;

    /// The tile-aligned region this fragment covers (dense) or the MBR
    /// of its coordinates (sparse).
    fn bounding_box(&self) -> &[(i128, i128)];

    fn num_cells(&self) -> usize;

    /// The coordinate of the fragment-local cell at `pos`, in this
    /// fragment's own storage order.
    fn coord_at(&self, pos: usize) -> &[i128];

    /// `(first_cell_coord, last_cell_coord)` in this fragment's own
    /// global order.
    fn bounding_coords(&self) -> (Coord, Coord) {
        let last = self.num_cells().saturating_sub(1);
        (self.coord_at(0).to_vec(), self.coord_at(last).to_vec())
    }

    /// Cell ranges overlapping `tile ∩ subarray`, in increasing
    /// fragment-local position order.
    fn next_cell_ranges(
        &self,
        subarray: &[(i128, i128)],
        tile: &[(i128, i128)],
    ) -> Vec<FragmentCellRange>;

    fn copy_values(
        &self,
        attr: usize,
        pos_range: (usize, usize),
        out: &mut [u8],
        out_off: &mut usize,
    ) -> Result<CopyOutcome>;

    #[allow(clippy::too_many_arguments)]
    fn copy_values_var(
        &self,
        attr: usize,
        pos_range: (usize, usize),
        offs_out: &mut [u8],
        offs_off: &mut usize,
        vals_out: &mut [u8],
        vals_off: &mut usize,
    ) -> Result<CopyOutcome>;
}

/// An in-memory fragment view, standing in for the on-disk tile codec
/// (out of scope per `spec.md` §1). Tests and callers who have already
/// materialized fragment bytes (e.g. by reading them through a
/// [`crate::storage::Storage`]) construct these directly.
pub struct MemFragment {
    id: FragmentId,
    array_type: ArrayType,
    cell_order: CellOrder,
    bounding_box: Subarray,
    /// Explicit coordinates in storage order, one per cell; for a dense
    /// fragment this is `bounding_box` enumerated in `cell_order`, kept
    /// explicit so `coord_at` never has to re-derive it.
    coords: Vec<Coord>,
    attributes: Vec<AttributeStorage>,
}

impl MemFragment {
    pub fn new(
        id: FragmentId,
        array_type: ArrayType,
        cell_order: CellOrder,
        bounding_box: Subarray,
        coords: Vec<Coord>,
        attributes: Vec<AttributeStorage>,
    ) -> Result<Self> {
        let n = coords.len();
        for a in &attributes {
            if let AttributeStorage::Var { spans, .. } = a {
                if spans.len() != n {
                    return Err(Error::fragment_corrupt(format!(
                        "attribute has {} cells, expected {n}",
                        spans.len()
                    )));
                }
            }
        }
        Ok(MemFragment {
            id,
            array_type,
            cell_order,
            bounding_box,
            coords,
            attributes,
        })
    }

    /// Builds a dense fragment by enumerating `bounding_box` in
    /// `cell_order` and pairing each coordinate with the next value from
    /// each attribute buffer in turn.
    pub fn dense(
        id: FragmentId,
        cell_order: CellOrder,
        bounding_box: Subarray,
        attributes: Vec<AttributeStorage>,
    ) -> Result<Self> {
        let coords = domain_arithmetic::enumerate_cells(&bounding_box, cell_order);
        MemFragment::new(id, ArrayType::Dense, cell_order, bounding_box, coords, attributes)
    }

    /// Builds a sparse fragment from explicit, caller-ordered
    /// coordinates (which may repeat). The bounding box is the MBR.
    pub fn sparse(
        id: FragmentId,
        cell_order: CellOrder,
        coords: Vec<Coord>,
        attributes: Vec<AttributeStorage>,
    ) -> Result<Self> {
        let bounding_box = mbr(&coords);
        MemFragment::new(id, ArrayType::Sparse, cell_order, bounding_box, coords, attributes)
    }

}

fn mbr(coords: &[Coord]) -> Subarray {
    let d = coords.first().map(|c| c.len()).unwrap_or(0);
    let mut bounds = vec![(i128::MAX, i128::MIN); d];
    for c in coords {
        for (b, &v) in bounds.iter_mut().zip(c.iter()) {
            b.0 = b.0.min(v);
            b.1 = b.1.max(v);
        }
    }
    bounds
}

impl Fragment for MemFragment {
    fn id(&self) -> FragmentId {
        self.id
    }

    fn array_type(&self) -> ArrayType {
        self.array_type
    }

    fn cell_order(&self) -> CellOrder {
        self.cell_order
    }

    fn bounding_box(&self) -> &[(i128, i128)] {
        &self.bounding_box
    }

    fn num_cells(&self) -> usize {
        self.coords.len()
    }

    fn coord_at(&self, pos: usize) -> &[i128] {
        &self.coords[pos]
    }

    fn next_cell_ranges(
        &self,
        subarray: &[(i128, i128)],
        tile: &[(i128, i128)],
    ) -> Vec<FragmentCellRange> {
        let Some(region) = domain_arithmetic::intersect(tile, subarray)
            .and_then(|r| domain_arithmetic::intersect(&r, &self.bounding_box))
        else {
            return Vec::new();
        };

        let mut raw_runs = Vec::new();
        let mut run_start: Option<usize> = None;
        for pos in 0..self.coords.len() {
            let inside = self.coords[pos]
                .iter()
                .zip(region.iter())
                .all(|(&x, &(lo, hi))| x >= lo && x <= hi);
            match (inside, run_start) {
                (true, None) => run_start = Some(pos),
                (false, Some(start)) => {
                    raw_runs.push((start, pos - 1));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            raw_runs.push((start, self.coords.len() - 1));
        }

        let tile_is_fully_covered = domain_arithmetic::intersect(tile, &self.bounding_box)
            .map(|t| t == region)
            .unwrap_or(false)
            && domain_arithmetic::intersect(tile, subarray)
                .map(|s| s == region)
                .unwrap_or(false);

        let overlap = if raw_runs.len() == 1 && tile_is_fully_covered {
            OverlapType::Full
        } else if raw_runs.len() == 1 {
            OverlapType::PartialContig
        } else {
            OverlapType::PartialNonContig
        };

        raw_runs
            .into_iter()
            .map(|pos_range| FragmentCellRange {
                fragment_id: self.id,
                pos_range,
                overlap,
            })
            .collect()
    }

    fn copy_values(
        &self,
        attr: usize,
        pos_range: (usize, usize),
        out: &mut [u8],
        out_off: &mut usize,
    ) -> Result<CopyOutcome> {
        let AttributeStorage::Fixed(data) = &self.attributes[attr] else {
            return Err(Error::internal("copy_values called on a var attribute"));
        };
        let n = pos_range.1 - pos_range.0 + 1;
        let cell_size = data.len() / self.num_cells().max(1);
        let nbytes = n * cell_size;
        if *out_off + nbytes > out.len() {
            return Ok(CopyOutcome::Overflow);
        }
        let src = &data[pos_range.0 * cell_size..(pos_range.1 + 1) * cell_size];
        out[*out_off..*out_off + nbytes].copy_from_slice(src);
        *out_off += nbytes;
        Ok(CopyOutcome::Done)
    }

    fn copy_values_var(
        &self,
        attr: usize,
        pos_range: (usize, usize),
        offs_out: &mut [u8],
        offs_off: &mut usize,
        vals_out: &mut [u8],
        vals_off: &mut usize,
    ) -> Result<CopyOutcome> {
        let AttributeStorage::Var { spans, values } = &self.attributes[attr] else {
            return Err(Error::internal("copy_values_var called on a fixed attribute"));
        };
        let n = pos_range.1 - pos_range.0 + 1;
        let offs_needed = n * cellstore_schema::array::schema::OFFSET_WIDTH;
        let vals_needed: usize = spans[pos_range.0..=pos_range.1]
            .iter()
            .map(|&(s, e)| e - s)
            .sum();
        if *offs_off + offs_needed > offs_out.len() || *vals_off + vals_needed > vals_out.len() {
            return Ok(CopyOutcome::Overflow);
        }

        let mut running = 0u64;
        for (i, &(s, e)) in spans[pos_range.0..=pos_range.1].iter().enumerate() {
            let off_bytes = running.to_le_bytes();
            let dst = &mut offs_out[*offs_off + i * 8..*offs_off + (i + 1) * 8];
            dst.copy_from_slice(&off_bytes);
            running += (e - s) as u64;
        }
        *offs_off += offs_needed;

        for &(s, e) in &spans[pos_range.0..=pos_range.1] {
            let len = e - s;
            vals_out[*vals_off..*vals_off + len].copy_from_slice(&values[s..e]);
            *vals_off += len;
        }
        Ok(CopyOutcome::Done)
    }
}

/// Attribute fill bytes for a hole in a dense array, looked up from the
/// schema (`AttributeData::fill`, `None` meaning zero-fill).
pub fn empty_fill(schema: &SchemaData, attr: usize, cell_count: usize) -> Vec<u8> {
    let cell_size = schema.cell_size(attr).unwrap_or(0);
    let template = schema
        .attribute(attr)
        .and_then(|a| a.fill.clone())
        .unwrap_or_else(|| vec![0u8; cell_size]);
    template.repeat(cell_count)
}

/// The fill value bytes for one empty cell of a variable-length
/// attribute. `None` (no configured fill) means a zero-length value.
pub fn var_fill_bytes(schema: &SchemaData, attr: usize) -> Vec<u8> {
    schema
        .attribute(attr)
        .and_then(|a| a.fill.clone())
        .unwrap_or_default()
}

pub(crate) fn ownership<'a, I>(per_fragment: I) -> HashMap<Coord, FragmentId>
where
    I: IntoIterator<Item = (FragmentId, &'a [Coord])>,
{
    let mut winner: HashMap<Coord, FragmentId> = HashMap::new();
    for (id, coords) in per_fragment {
        for c in coords {
            winner
                .entry(c.clone())
                .and_modify(|w| *w = (*w).max(id))
                .or_insert(id);
        }
    }
    winner
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_2x2(id: FragmentId, fill: u8) -> MemFragment {
        let data: Vec<u8> = (0..4).map(|i| fill + i).collect();
        MemFragment::dense(
            id,
            CellOrder::RowMajor,
            vec![(0, 1), (0, 1)],
            vec![AttributeStorage::Fixed(data)],
        )
        .unwrap()
    }

    #[test]
    fn dense_storage_order_is_row_major() {
        let f = dense_2x2(1, 0);
        assert_eq!(vec![0, 0], f.coord_at(0));
        assert_eq!(vec![0, 1], f.coord_at(1));
        assert_eq!(vec![1, 0], f.coord_at(2));
        assert_eq!(vec![1, 1], f.coord_at(3));
    }

    #[test]
    fn next_cell_ranges_full_tile() {
        let f = dense_2x2(1, 0);
        let ranges = f.next_cell_ranges(&[(0, 1), (0, 1)], &[(0, 1), (0, 1)]);
        assert_eq!(1, ranges.len());
        assert_eq!((0, 3), ranges[0].pos_range);
        assert_eq!(OverlapType::Full, ranges[0].overlap);
    }

    #[test]
    fn next_cell_ranges_partial_row() {
        let f = dense_2x2(1, 0);
        let ranges = f.next_cell_ranges(&[(0, 0), (0, 1)], &[(0, 1), (0, 1)]);
        assert_eq!(1, ranges.len());
        assert_eq!((0, 1), ranges[0].pos_range);
        assert_eq!(OverlapType::PartialContig, ranges[0].overlap);
    }

    #[test]
    fn copy_values_writes_requested_range() {
        let f = dense_2x2(1, 10);
        let mut out = vec![0u8; 4];
        let mut off = 0;
        let outcome = f.copy_values(0, (1, 2), &mut out, &mut off).unwrap();
        assert_eq!(CopyOutcome::Done, outcome);
        assert_eq!(2, off);
        assert_eq!(vec![11, 12, 0, 0], out);
    }

    #[test]
    fn copy_values_overflow_leaves_cursor_unchanged() {
        let f = dense_2x2(1, 10);
        let mut out = vec![0u8; 1];
        let mut off = 0;
        let outcome = f.copy_values(0, (0, 3), &mut out, &mut off).unwrap();
        assert_eq!(CopyOutcome::Overflow, outcome);
        assert_eq!(0, off);
    }

    #[test]
    fn sparse_mbr_and_duplicate_coords_preserved() {
        let coords = vec![vec![0, 0], vec![0, 0], vec![2, 1]];
        let data = vec![AttributeStorage::Fixed(vec![1, 2, 3])];
        let f = MemFragment::sparse(1, CellOrder::RowMajor, coords, data).unwrap();
        assert_eq!(&[(0, 2), (0, 1)], f.bounding_box());
        assert_eq!(3, f.num_cells());
        assert_eq!(f.coord_at(0), f.coord_at(1));
    }

    #[test]
    fn copy_values_var_writes_offsets_and_values() {
        let spans = vec![(0, 1), (1, 3)];
        let values = vec![b'a', b'b', b'c'];
        let f = MemFragment::new(
            1,
            ArrayType::Sparse,
            CellOrder::RowMajor,
            vec![(0, 1)],
            vec![vec![0], vec![1]],
            vec![AttributeStorage::Var { spans, values }],
        )
        .unwrap();

        let mut offs = vec![0u8; 16];
        let mut offs_off = 0;
        let mut vals = vec![0u8; 3];
        let mut vals_off = 0;
        let outcome = f
            .copy_values_var(0, (0, 1), &mut offs, &mut offs_off, &mut vals, &mut vals_off)
            .unwrap();
        assert_eq!(CopyOutcome::Done, outcome);
        assert_eq!(16, offs_off);
        assert_eq!(3, vals_off);
        assert_eq!(0u64, u64::from_le_bytes(offs[0..8].try_into().unwrap()));
        assert_eq!(1u64, u64::from_le_bytes(offs[8..16].try_into().unwrap()));
        assert_eq!(b"abc", vals.as_slice());
    }

    #[test]
    fn ownership_newest_fragment_id_wins() {
        let older = vec![vec![0, 0], vec![0, 1]];
        let newer = vec![vec![0, 0]];
        let winner = ownership([(1u64, older.as_slice()), (2u64, newer.as_slice())]);
        assert_eq!(Some(&2), winner.get(&vec![0i128, 0]));
        assert_eq!(Some(&1), winner.get(&vec![0i128, 1]));
    }
}
