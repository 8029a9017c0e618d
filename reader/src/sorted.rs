//! Rearranges cells produced by [`crate::unsorted::UnsortedReader`] into
//! the caller's requested row-/column-major SUBARRAY order, with a
//! pipelined two-buffer prefetch (`spec.md` §4.4, §5).
//!
//! Tile-slab decomposition and the double-buffered fill/copy pipeline
//! are exactly as in `original_source`'s `array_sorted_read_state.h`,
//! reduced to their essential shape: one background thread fills the
//! next slab's bank while the calling thread rearranges the current
//! bank into the caller's buffers. Where the historical source
//! precomputes per-tile offset tables (`cell_slab_num`, `start_offsets`,
//! ...) to drive a memcpy loop, this port precomputes one permutation
//! vector per slab (`storage index -> output position`) and reuses the
//! plain per-cell copy already written for [`crate::fragment::Fragment`]
//! values — logically equivalent, since both ultimately visit the same
//! cells in the same order, just expressed as a lookup table instead of
//! nested per-dimension loops.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use log::{trace, warn};

use cellstore_common::array::{ArrayType, CellOrder};
use cellstore_schema::array::SchemaData;

use crate::domain_arithmetic::{self, Coord, Subarray};
use crate::error::{Error, Result};
use crate::fragment::Fragment;
use crate::unsorted::UnsortedReader;

const OFFSET_WIDTH: usize = cellstore_schema::array::schema::OFFSET_WIDTH;

/// Baseline initial sparse bank capacity (bytes) for an attribute with no
/// entry in the caller-supplied `sparse_bank_capacity` map.
const DEFAULT_SPARSE_BANK_BYTES: usize = 4096;

/// The requested subarray order (`spec.md` §4.4 `O ∈ {row, col}`).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SortOrder {
    Row,
    Col,
}

impl SortOrder {
    fn as_cell_order(self) -> CellOrder {
        match self {
            SortOrder::Row => CellOrder::RowMajor,
            SortOrder::Col => CellOrder::ColumnMajor,
        }
    }
}

/// One fully-materialized internal buffer bank: every selected
/// attribute's bytes for one slab, still in the array's global cell
/// order, plus the permutation that rearranges them into the requested
/// order.
struct Bank {
    slab_idx: usize,
    /// `order_idx[k]` is the storage-order cell index that belongs at
    /// output position `k`.
    order_idx: Vec<usize>,
    fixed: HashMap<usize, Vec<u8>>,
    /// `(cumulative offsets including a trailing total, raw values)`,
    /// both in storage order.
    var: HashMap<usize, (Vec<u64>, Vec<u8>)>,
}

impl Bank {
    fn num_cells(&self) -> usize {
        self.order_idx.len()
    }
}

/// Per-attribute progress through the pipeline: which slab it is
/// currently draining and how many of that slab's (output-order) cells
/// have already been copied to the caller.
#[derive(Clone, Copy, Default)]
struct AttrCursor {
    slab_idx: usize,
    cells_done: usize,
}

enum BankSlot {
    Empty,
    /// Being materialized by the worker thread.
    Filling,
    Ready(Bank),
    /// Checked out by [`SortedReader::acquire_bank`] for the calling thread
    /// to rearrange; distinct from `Filling` so [`worker_loop`] never
    /// mistakes a caller's in-flight bank for an empty slot it can start
    /// filling, and [`SortedReader::release_bank_if_idle`] never mistakes
    /// the worker's in-progress slot for the one the caller checked out.
    CheckedOut,
}

struct Shared {
    banks: [BankSlot; 2],
    /// Next slab index the worker should start filling.
    fill_cursor: usize,
    stop: bool,
    err: Option<String>,
}

struct Pipeline {
    state: Mutex<Shared>,
    cond: Condvar,
    schema: SchemaData,
    fragments: Vec<Arc<dyn Fragment>>,
    slabs: Vec<Subarray>,
    schema_cell_order: CellOrder,
    requested_order: CellOrder,
    attribute_ids: Vec<usize>,
    sparse_bank_capacity: HashMap<usize, usize>,
}

impl Pipeline {
    fn total_slabs(&self) -> usize {
        self.slabs.len()
    }

    /// Fills one slab's bank: constructs a fresh [`UnsortedReader`] over
    /// that slab's region and materializes every selected attribute to
    /// completion, growing buffers on overflow per §4.4's overflow
    /// policy (doubling, retaining already-written bytes).
    fn fill_slab(&self, slab_idx: usize) -> Result<Bank> {
        let region = self.slabs[slab_idx].clone();
        let dense = matches!(self.schema.array_type, ArrayType::Dense);

        let mut reader = UnsortedReader::new(
            self.schema.clone(),
            self.fragments.clone(),
            region.clone(),
        )?;

        let storage_coords: Vec<Coord> = if dense {
            domain_arithmetic::enumerate_cells(&region, self.schema_cell_order)
        } else {
            reader.coords()
        };

        let mut order_idx: Vec<usize> = (0..storage_coords.len()).collect();
        order_idx.sort_by(|&a, &b| {
            domain_arithmetic::cell_order_cmp(
                self.requested_order,
                &storage_coords[a],
                &storage_coords[b],
            )
        });

        let num_cells = storage_coords.len();
        let mut fixed = HashMap::new();
        let mut var = HashMap::new();
        for &attr in &self.attribute_ids {
            if self.schema.is_var(attr) {
                let initial = self
                    .sparse_bank_capacity
                    .get(&attr)
                    .copied()
                    .unwrap_or(DEFAULT_SPARSE_BANK_BYTES);
                let (offs, vals) = fill_var(&mut reader, attr, num_cells.max(1), initial)?;
                let mut cumulative: Vec<u64> = offs
                    .chunks_exact(OFFSET_WIDTH)
                    .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                    .collect();
                cumulative.push(vals.len() as u64);
                var.insert(attr, (cumulative, vals));
            } else {
                let cell_size = self.schema.cell_size(attr).unwrap_or(0);
                let initial = if dense {
                    num_cells * cell_size
                } else {
                    self.sparse_bank_capacity
                        .get(&attr)
                        .copied()
                        .unwrap_or(DEFAULT_SPARSE_BANK_BYTES)
                };
                fixed.insert(attr, fill_fixed(&mut reader, attr, cell_size, initial)?);
            }
        }

        Ok(Bank {
            slab_idx,
            order_idx,
            fixed,
            var,
        })
    }
}

fn fill_fixed(
    reader: &mut UnsortedReader,
    attr: usize,
    cell_size: usize,
    initial_bytes: usize,
) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; initial_bytes.max(cell_size.max(1))];
    let mut off = 0;
    loop {
        let done = reader.read_attribute(attr, &mut buf, &mut off)?;
        if done {
            buf.truncate(off);
            return Ok(buf);
        }
        let new_len = (buf.len() * 2).max(buf.len() + cell_size.max(1));
        buf.resize(new_len, 0);
    }
}

fn fill_var(
    reader: &mut UnsortedReader,
    attr: usize,
    initial_cells: usize,
    initial_val_bytes: usize,
) -> Result<(Vec<u8>, Vec<u8>)> {
    let mut offs = vec![0u8; initial_cells.max(1) * OFFSET_WIDTH];
    let mut offs_off = 0;
    let mut vals = vec![0u8; initial_val_bytes.max(1)];
    let mut vals_off = 0;
    loop {
        let done =
            reader.read_attribute_var(attr, &mut offs, &mut offs_off, &mut vals, &mut vals_off)?;
        if done {
            offs.truncate(offs_off);
            vals.truncate(vals_off);
            return Ok((offs, vals));
        }
        offs.resize(offs.len() * 2 + OFFSET_WIDTH, 0);
        vals.resize(vals.len() * 2 + 64, 0);
    }
}

fn worker_loop(pipeline: Arc<Pipeline>) {
    trace!("sorted reader prefetch thread starting, {} slabs", pipeline.total_slabs());
    loop {
        let slab_idx;
        let slot;
        {
            let mut st = pipeline.state.lock().unwrap_or_else(|e| e.into_inner());
            loop {
                if st.stop || st.err.is_some() || st.fill_cursor >= pipeline.total_slabs() {
                    return;
                }
                if let Some(s) = st.banks.iter().position(|b| matches!(b, BankSlot::Empty)) {
                    slot = s;
                    slab_idx = st.fill_cursor;
                    st.fill_cursor += 1;
                    st.banks[slot] = BankSlot::Filling;
                    break;
                }
                st = pipeline
                    .cond
                    .wait(st)
                    .unwrap_or_else(|e| e.into_inner());
            }
        }

        trace!("filling slab {slab_idx} into bank {slot}");
        let result = pipeline.fill_slab(slab_idx);

        let mut st = pipeline.state.lock().unwrap_or_else(|e| e.into_inner());
        match result {
            Ok(bank) => st.banks[slot] = BankSlot::Ready(bank),
            Err(e) => {
                warn!("sorted reader prefetch failed on slab {slab_idx}: {e}");
                st.banks[slot] = BankSlot::Empty;
                st.err = Some(e.to_string());
            }
        }
        pipeline.cond.notify_all();
    }
}

/// Wraps [`UnsortedReader`] to present cells in the caller's requested
/// row- or column-major subarray order (`spec.md` §4.4).
pub struct SortedReader {
    /// `None` when the fast path applies: the requested order already
    /// coincides with the schema's cell order, so cells need no
    /// rearrangement and are read straight off a single `UnsortedReader`
    /// (`spec.md` §4.4 "fast-path").
    fast: Option<UnsortedReader>,
    pipeline: Option<Arc<Pipeline>>,
    worker: Option<JoinHandle<()>>,
    cursors: HashMap<usize, AttrCursor>,
}

impl SortedReader {
    pub fn new(
        schema: SchemaData,
        fragments: Vec<Arc<dyn Fragment>>,
        subarray: Subarray,
        order: SortOrder,
        sparse_bank_capacity: HashMap<usize, usize>,
    ) -> Result<Self> {
        if subarray.len() != schema.domain.dimension.len() {
            return Err(Error::query_misuse(format!(
                "subarray has {} dimensions, schema has {}",
                subarray.len(),
                schema.domain.dimension.len()
            )));
        }

        let schema_cell_order = schema.cell_order.unwrap_or(CellOrder::RowMajor);
        let requested_order = order.as_cell_order();

        let slabs = if matches!(schema.array_type, ArrayType::Dense) {
            domain_arithmetic::tile_slabs(&subarray, &schema, requested_order)
        } else {
            vec![subarray.clone()]
        };

        // The fast path skips rearrangement entirely and delegates straight to
        // `UnsortedReader`, which emits cells tile-order-outer,
        // `schema.cell_order`-inner. That sequence only coincides with a flat
        // `requested_order` scan of the whole subarray when there is a single
        // slab to emit from — matching orders alone isn't enough once a dense
        // subarray spans more than one tile along the slab dimension.
        if requested_order == schema_cell_order && slabs.len() <= 1 {
            trace!("sorted reader: requested order matches schema cell order and subarray is single-slab, skipping rearrangement");
            let fast = UnsortedReader::new(schema, fragments, subarray)?;
            return Ok(SortedReader {
                fast: Some(fast),
                pipeline: None,
                worker: None,
                cursors: HashMap::new(),
            });
        }

        let attribute_ids: Vec<usize> = (0..schema.attributes.len()).collect();

        let pipeline = Arc::new(Pipeline {
            state: Mutex::new(Shared {
                banks: [BankSlot::Empty, BankSlot::Empty],
                fill_cursor: 0,
                stop: false,
                err: None,
            }),
            cond: Condvar::new(),
            schema,
            fragments,
            slabs,
            schema_cell_order,
            requested_order,
            attribute_ids,
            sparse_bank_capacity,
        });

        let worker = std::thread::spawn({
            let pipeline = Arc::clone(&pipeline);
            move || worker_loop(pipeline)
        });

        Ok(SortedReader {
            fast: None,
            pipeline: Some(pipeline),
            worker: Some(worker),
            cursors: HashMap::new(),
        })
    }

    pub fn is_complete(&self, attr: usize) -> bool {
        match (&self.fast, &self.pipeline) {
            (Some(r), _) => r.is_complete(attr),
            (None, Some(p)) => {
                let cursor = self.cursors.get(&attr).copied().unwrap_or_default();
                cursor.slab_idx >= p.total_slabs()
            }
            _ => true,
        }
    }

    pub fn read_attribute(&mut self, attr: usize, out: &mut [u8], out_off: &mut usize) -> Result<bool> {
        if let Some(r) = &mut self.fast {
            return r.read_attribute(attr, out, out_off);
        }
        let Some(pipeline) = self.pipeline.clone() else {
            return Ok(true);
        };
        let cell_size = pipeline.schema.cell_size(attr).unwrap_or(0);

        loop {
            let mut cursor = self.cursors.get(&attr).copied().unwrap_or_default();
            if cursor.slab_idx >= pipeline.total_slabs() {
                return Ok(true);
            }

            let (slot, bank) = self.acquire_bank(&pipeline, cursor.slab_idx)?;
            let num_cells = bank.num_cells();
            let data = bank
                .fixed
                .get(&attr)
                .ok_or_else(|| Error::internal(format!("attribute {attr} not fetched by sorted reader")))?;

            while cursor.cells_done < num_cells {
                if *out_off + cell_size > out.len() {
                    self.cursors.insert(attr, cursor);
                    self.release_bank_if_idle(&pipeline, slot, bank);
                    return Ok(false);
                }
                let src_idx = bank.order_idx[cursor.cells_done];
                out[*out_off..*out_off + cell_size]
                    .copy_from_slice(&data[src_idx * cell_size..(src_idx + 1) * cell_size]);
                *out_off += cell_size;
                cursor.cells_done += 1;
            }

            cursor.slab_idx += 1;
            cursor.cells_done = 0;
            self.cursors.insert(attr, cursor);
            self.release_bank_if_idle(&pipeline, slot, bank);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn read_attribute_var(
        &mut self,
        attr: usize,
        offs_out: &mut [u8],
        offs_off: &mut usize,
        vals_out: &mut [u8],
        vals_off: &mut usize,
    ) -> Result<bool> {
        if let Some(r) = &mut self.fast {
            return r.read_attribute_var(attr, offs_out, offs_off, vals_out, vals_off);
        }
        let Some(pipeline) = self.pipeline.clone() else {
            return Ok(true);
        };

        // Offsets are relative to the start of `vals_out` as it stood
        // when this call began, matching `UnsortedReader::read_attribute_var`.
        let call_base = *vals_off as u64;

        loop {
            let mut cursor = self.cursors.get(&attr).copied().unwrap_or_default();
            if cursor.slab_idx >= pipeline.total_slabs() {
                return Ok(true);
            }

            let (slot, bank) = self.acquire_bank(&pipeline, cursor.slab_idx)?;
            let num_cells = bank.num_cells();
            let (cumulative, values) = bank
                .var
                .get(&attr)
                .ok_or_else(|| Error::internal(format!("attribute {attr} not fetched by sorted reader")))?;

            while cursor.cells_done < num_cells {
                let src_idx = bank.order_idx[cursor.cells_done];
                let (start, end) = (cumulative[src_idx], cumulative[src_idx + 1]);
                let len = (end - start) as usize;

                if *offs_off + OFFSET_WIDTH > offs_out.len() || *vals_off + len > vals_out.len() {
                    self.cursors.insert(attr, cursor);
                    self.release_bank_if_idle(&pipeline, slot, bank);
                    return Ok(false);
                }

                let offset = *vals_off as u64 - call_base;
                offs_out[*offs_off..*offs_off + OFFSET_WIDTH]
                    .copy_from_slice(&offset.to_le_bytes());
                *offs_off += OFFSET_WIDTH;

                vals_out[*vals_off..*vals_off + len]
                    .copy_from_slice(&values[start as usize..end as usize]);
                *vals_off += len;
                cursor.cells_done += 1;
            }

            cursor.slab_idx += 1;
            cursor.cells_done = 0;
            self.cursors.insert(attr, cursor);
            self.release_bank_if_idle(&pipeline, slot, bank);
        }
    }

    /// Waits for `slab_idx`'s bank to be ready, taking ownership of it out
    /// of the shared slot. The slot becomes `CheckedOut` - distinct from
    /// `Filling`, which means "the worker owns this slot" - until
    /// [`Self::release_bank_if_idle`] puts it back or frees it. Returns
    /// the slot index so the caller can release into the exact same slot
    /// rather than re-deriving it later.
    fn acquire_bank(&self, pipeline: &Arc<Pipeline>, slab_idx: usize) -> Result<(usize, Bank)> {
        let mut st = pipeline
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(err) = &st.err {
                return Err(Error::internal(err.clone()));
            }
            if let Some(slot) = st.banks.iter().position(|b| {
                matches!(b, BankSlot::Ready(bank) if bank.slab_idx == slab_idx)
            }) {
                let taken = std::mem::replace(&mut st.banks[slot], BankSlot::CheckedOut);
                pipeline.cond.notify_all();
                let BankSlot::Ready(bank) = taken else {
                    unreachable!()
                };
                return Ok((slot, bank));
            }
            st = pipeline.cond.wait(st).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Puts a bank back into `slot` once every selected attribute has
    /// finished draining it, or frees the slot for reuse otherwise. An
    /// attribute whose cursor has not yet reached `bank.slab_idx` - either
    /// it is still blocked partway through it (`==`) or hasn't started it
    /// yet (`<`) - still needs this bank's data, so the liveness check is
    /// "any cursor at or before this slab", not "any cursor exactly at it":
    /// the latter would let an attribute that overflowed on an earlier
    /// slab lose that slab's bank to reuse before it ever resumes.
    fn release_bank_if_idle(&self, pipeline: &Arc<Pipeline>, slot: usize, bank: Bank) {
        let still_in_use = pipeline.attribute_ids.iter().any(|a| {
            let cursor = self.cursors.get(a).copied().unwrap_or_default();
            cursor.slab_idx <= bank.slab_idx
        });

        let mut st = pipeline.state.lock().unwrap_or_else(|e| e.into_inner());
        if still_in_use {
            st.banks[slot] = BankSlot::Ready(bank);
        } else {
            st.banks[slot] = BankSlot::Empty;
        }
        pipeline.cond.notify_all();
    }
}

impl Drop for SortedReader {
    fn drop(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            {
                let mut st = pipeline.state.lock().unwrap_or_else(|e| e.into_inner());
                st.stop = true;
            }
            pipeline.cond.notify_all();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellstore_common::array::dimension::DimensionConstraints;
    use cellstore_common::array::{CellValNum, TileOrder};
    use cellstore_common::datatype::Datatype;
    use cellstore_schema::array::attribute::AttributeData;
    use cellstore_schema::array::dimension::DimensionData;
    use cellstore_schema::array::domain::DomainData;

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

    fn sparse_schema(dims: Vec<DimensionData>) -> SchemaData {
        SchemaData::new(
            "a",
            ArrayType::Sparse,
            DomainData { dimension: dims },
            vec![attr("a")],
            None,
            Some(CellOrder::RowMajor),
            None,
            0,
        )
        .unwrap()
    }

    fn read_all(reader: &mut SortedReader, attr: usize, buf_len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let mut chunk = vec![0u8; buf_len];
            let mut off = 0;
            let done = reader.read_attribute(attr, &mut chunk, &mut off).unwrap();
            out.extend_from_slice(&chunk[..off]);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn row_major_request_on_row_major_schema_takes_fast_path() {
        let schema = dense_schema(vec![dim(0, 1, 2), dim(0, 1, 2)]);
        let f = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(0, 1), (0, 1)],
            vec![AttributeStorage::Fixed(vec![1, 2, 3, 4])],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 1), (0, 1)],
            SortOrder::Row,
            HashMap::new(),
        )
        .unwrap();

        assert!(reader.fast.is_some());
        assert!(reader.pipeline.is_none());
        assert_eq!(vec![1, 2, 3, 4], read_all(&mut reader, 0, 4));
    }

    /// `spec.md` §8 Scenario A: a row-major request on a row-major schema
    /// whose domain spans more than one tile along the slab dimension must
    /// NOT take the fast path — `UnsortedReader` would otherwise emit cells
    /// tile-by-tile instead of as one flat row-major scan of the subarray.
    #[test]
    fn row_major_request_on_multi_tile_row_major_schema_does_not_take_fast_path() {
        let schema = dense_schema(vec![dim(0, 3, 2), dim(0, 3, 2)]);
        let values: Vec<u8> = (0..16).collect();
        let f = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(0, 3), (0, 3)],
            vec![AttributeStorage::Fixed(values)],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 3), (0, 3)],
            SortOrder::Row,
            HashMap::new(),
        )
        .unwrap();

        assert!(reader.fast.is_none());
        assert!(reader.pipeline.is_some());
        let expected: Vec<u8> = (0..16).collect();
        assert_eq!(expected, read_all(&mut reader, 0, 16));
    }

    /// `spec.md` §8 Scenario B: a 4x4 row-major array read in column-major
    /// order, one tile-wide column per slab, exercising the full
    /// background-fill pipeline over four slabs.
    #[test]
    fn column_major_request_rearranges_row_major_storage() {
        let schema = dense_schema(vec![dim(0, 3, 4), dim(0, 3, 1)]);
        let values: Vec<u8> = (0..16).collect();
        let f = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(0, 3), (0, 3)],
            vec![AttributeStorage::Fixed(values)],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 3), (0, 3)],
            SortOrder::Col,
            HashMap::new(),
        )
        .unwrap();

        assert!(reader.pipeline.is_some());
        let expected: Vec<u8> = vec![0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];
        assert_eq!(expected, read_all(&mut reader, 0, 16));
    }

    #[test]
    fn column_major_request_resumes_across_overflowing_calls() {
        let schema = dense_schema(vec![dim(0, 3, 4), dim(0, 3, 1)]);
        let values: Vec<u8> = (0..16).collect();
        let f = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(0, 3), (0, 3)],
            vec![AttributeStorage::Fixed(values)],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 3), (0, 3)],
            SortOrder::Col,
            HashMap::new(),
        )
        .unwrap();

        // A 3-byte buffer can't hold a whole 4-cell slab, forcing at least
        // one mid-slab overflow and resume.
        let expected: Vec<u8> = vec![0, 4, 8, 12, 1, 5, 9, 13, 2, 6, 10, 14, 3, 7, 11, 15];
        assert_eq!(expected, read_all(&mut reader, 0, 3));
    }

    /// `spec.md` §8 Scenario F: cells no fragment covers are filled with
    /// the attribute's (zero, here) fill value, and still participate in
    /// the requested rearrangement.
    #[test]
    fn column_major_request_fills_holes_in_place() {
        let schema = dense_schema(vec![dim(0, 1, 2), dim(0, 1, 1)]);
        let f = MemFragment::sparse(
            1,
            CellOrder::RowMajor,
            vec![vec![0, 0], vec![1, 1]],
            vec![AttributeStorage::Fixed(vec![9, 8])],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 1), (0, 1)],
            SortOrder::Col,
            HashMap::new(),
        )
        .unwrap();

        assert_eq!(vec![9, 0, 0, 8], read_all(&mut reader, 0, 4));
    }

    #[test]
    fn sparse_array_rearranges_by_coords_helper() {
        let schema = sparse_schema(vec![dim(0, 9, 10), dim(0, 9, 10)]);
        let f = MemFragment::sparse(
            1,
            CellOrder::RowMajor,
            vec![vec![0, 3], vec![1, 1], vec![2, 0]],
            vec![AttributeStorage::Fixed(vec![10, 20, 30])],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 9), (0, 9)],
            SortOrder::Col,
            HashMap::new(),
        )
        .unwrap();

        assert!(reader.pipeline.is_some());
        assert_eq!(vec![30, 20, 10], read_all(&mut reader, 0, 3));
    }

    #[test]
    fn dropping_a_partially_read_reader_does_not_hang() {
        let schema = dense_schema(vec![dim(0, 3, 4), dim(0, 3, 1)]);
        let values: Vec<u8> = (0..16).collect();
        let f = MemFragment::dense(
            1,
            CellOrder::RowMajor,
            vec![(0, 3), (0, 3)],
            vec![AttributeStorage::Fixed(values)],
        )
        .unwrap();

        let mut reader = SortedReader::new(
            schema,
            vec![Arc::new(f) as Arc<dyn Fragment>],
            vec![(0, 3), (0, 3)],
            SortOrder::Col,
            HashMap::new(),
        )
        .unwrap();

        let mut out = vec![0u8; 2];
        let mut off = 0;
        let _ = reader.read_attribute(0, &mut out, &mut off).unwrap();
        drop(reader);
    }
}
