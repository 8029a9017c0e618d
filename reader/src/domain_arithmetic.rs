//! Pure functions over coordinate tuples of a typed domain: tile
//! coordinates from cell coordinates, linearization, subarray
//! intersection, and tile-domain enumeration. No component below this
//! one mutates anything; everything here is dispatched once per query
//! via the schema's coordinate `Datatype` and runs on `i128`-widened
//! coordinates from then on.

use std::cmp::Ordering;

use cellstore_common::array::{CellOrder, TileOrder};
use cellstore_schema::array::SchemaData;

pub type Coord = Vec<i128>;

/// An axis-aligned inclusive box, one `(low, high)` pair per dimension.
pub type Subarray = Vec<(i128, i128)>;

/// Intersects two boxes of the same dimensionality. `None` if they are
/// disjoint along any dimension.
pub fn intersect(a: &[(i128, i128)], b: &[(i128, i128)]) -> Option<Subarray> {
    if a.len() != b.len() {
        return None;
    }
    a.iter()
        .zip(b.iter())
        .map(|(&(alo, ahi), &(blo, bhi))| {
            let lo = alo.max(blo);
            let hi = ahi.min(bhi);
            (lo <= hi).then_some((lo, hi))
        })
        .collect()
}

/// Row-major cell order: the LAST dimension varies fastest, so two
/// coordinates compare by their first differing dimension starting from
/// dimension 0.
pub fn row_major_cmp(a: &[i128], b: &[i128]) -> Ordering {
    a.cmp(b)
}

/// Column-major cell order: the FIRST dimension varies fastest, so two
/// coordinates compare by their first differing dimension starting from
/// the LAST dimension.
pub fn col_major_cmp(a: &[i128], b: &[i128]) -> Ordering {
    for i in (0..a.len()).rev() {
        match a[i].cmp(&b[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// The comparator for the array's configured cell order. `Unordered` and
/// `Global` both fall back to row-major: this crate only ever calls this
/// with a schema's `cell_order`, and a schema whose order is `Hilbert` is
/// rejected before a reader is constructed (see `reader::validate_schema`).
pub fn cell_order_cmp(order: CellOrder, a: &[i128], b: &[i128]) -> Ordering {
    match order {
        CellOrder::ColumnMajor => col_major_cmp(a, b),
        _ => row_major_cmp(a, b),
    }
}

/// The inclusive tile-coordinate bounds (in tile-index units, not cell
/// units) of the tiles which intersect `subarray`.
pub fn tile_domain(subarray: &[(i128, i128)], schema: &SchemaData) -> Subarray {
    subarray
        .iter()
        .zip(schema.domain.dimension.iter())
        .map(|(&(lo, hi), dim)| {
            let (dlo, _) = dim.domain_i128();
            let extent = dim.constraints.num_cells_per_tile().unwrap_or(1) as i128;
            ((lo - dlo).div_euclid(extent), (hi - dlo).div_euclid(extent))
        })
        .collect()
}

/// The inclusive cell-coordinate box covered by one tile.
pub fn tile_bounding_box(tile_coord: &[i128], schema: &SchemaData) -> Subarray {
    schema
        .domain
        .dimension
        .iter()
        .zip(tile_coord.iter())
        .map(|(dim, &t)| {
            let (dlo, dhi) = dim.domain_i128();
            let extent = dim.constraints.num_cells_per_tile().unwrap_or(1) as i128;
            let lo = dlo + t * extent;
            (lo, (lo + extent - 1).min(dhi))
        })
        .collect()
}

/// Materializes every tile coordinate in `domain` in the requested tile
/// order. Tile counts in this port's tests and scenarios are small enough
/// that eager enumeration (rather than a lazy odometer) is the simpler,
/// equally correct choice.
pub fn enumerate_tile_coords(domain: &[(i128, i128)], order: TileOrder) -> Vec<Coord> {
    let d = domain.len();
    if d == 0 || domain.iter().any(|&(lo, hi)| lo > hi) {
        return Vec::new();
    }

    // Dimensions listed fastest-varying first, so incrementing in this
    // order and carrying into the next produces the requested tile order.
    // `Hilbert` never reaches here: a schema with a Hilbert tile order is
    // rejected before a reader is constructed (see `reader::validate_schema`).
    let fastest_first: Vec<usize> = match order {
        TileOrder::RowMajor => (0..d).rev().collect(),
        TileOrder::ColumnMajor => (0..d).collect(),
        TileOrder::Hilbert => (0..d).rev().collect(),
    };

    let mut coord: Coord = domain.iter().map(|&(lo, _)| lo).collect();
    let mut out = Vec::new();
    loop {
        out.push(coord.clone());
        let mut carry = true;
        for &dim in &fastest_first {
            if !carry {
                break;
            }
            let (lo, hi) = domain[dim];
            coord[dim] += 1;
            if coord[dim] > hi {
                coord[dim] = lo;
            } else {
                carry = false;
            }
        }
        if carry {
            break;
        }
    }
    out
}

/// Materializes every cell coordinate in `region` in the requested cell
/// order. Used to give a dense in-memory fragment an explicit storage
/// order without re-deriving it from its bounding box on every lookup.
pub fn enumerate_cells(region: &[(i128, i128)], order: CellOrder) -> Vec<Coord> {
    let d = region.len();
    if d == 0 || region.iter().any(|&(lo, hi)| lo > hi) {
        return Vec::new();
    }

    let fastest_first: Vec<usize> = match order {
        CellOrder::ColumnMajor => (0..d).collect(),
        _ => (0..d).rev().collect(),
    };

    let mut coord: Coord = region.iter().map(|&(lo, _)| lo).collect();
    let mut out = Vec::new();
    loop {
        out.push(coord.clone());
        let mut carry = true;
        for &dim in &fastest_first {
            if !carry {
                break;
            }
            let (lo, hi) = region[dim];
            coord[dim] += 1;
            if coord[dim] > hi {
                coord[dim] = lo;
            } else {
                carry = false;
            }
        }
        if carry {
            break;
        }
    }
    out
}

/// A tile slab: a contiguous strip of `subarray` one tile thick along the
/// slowest-varying dimension of `order`. Row-major slabs are thick along
/// dimension 0; column-major slabs are thick along the last dimension.
pub fn tile_slabs(subarray: &[(i128, i128)], schema: &SchemaData, order: CellOrder) -> Vec<Subarray> {
    let slab_dim = match order {
        CellOrder::ColumnMajor => subarray.len() - 1,
        _ => 0,
    };
    let dim = &schema.domain.dimension[slab_dim];
    let (dlo, _) = dim.domain_i128();
    let extent = dim.constraints.num_cells_per_tile().unwrap_or(1) as i128;

    let (slo, shi) = subarray[slab_dim];
    let mut slabs = Vec::new();
    let mut lo = slo;
    while lo <= shi {
        let tile_idx = (lo - dlo).div_euclid(extent);
        let tile_hi = dlo + (tile_idx + 1) * extent - 1;
        let hi = tile_hi.min(shi);
        let mut slab = subarray.to_vec();
        slab[slab_dim] = (lo, hi);
        slabs.push(slab);
        lo = hi + 1;
    }
    slabs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_disjoint() {
        assert_eq!(None, intersect(&[(0, 1)], &[(2, 3)]));
    }

    #[test]
    fn intersect_overlapping() {
        assert_eq!(Some(vec![(1, 2)]), intersect(&[(0, 2)], &[(1, 3)]));
    }

    #[test]
    fn row_major_last_dim_fastest() {
        assert_eq!(Ordering::Less, row_major_cmp(&[0, 1], &[0, 2]));
        assert_eq!(Ordering::Less, row_major_cmp(&[0, 9], &[1, 0]));
    }

    #[test]
    fn col_major_first_dim_fastest() {
        assert_eq!(Ordering::Less, col_major_cmp(&[1, 0], &[2, 0]));
        assert_eq!(Ordering::Less, col_major_cmp(&[9, 0], &[0, 1]));
    }

    #[test]
    fn enumerate_tile_coords_row_major_2x2() {
        let coords = enumerate_tile_coords(&[(0, 1), (0, 1)], TileOrder::RowMajor);
        assert_eq!(
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]],
            coords
        );
    }

    #[test]
    fn enumerate_cells_row_major_2x2() {
        let coords = enumerate_cells(&[(0, 1), (0, 1)], CellOrder::RowMajor);
        assert_eq!(
            vec![vec![0, 0], vec![0, 1], vec![1, 0], vec![1, 1]],
            coords
        );
    }

    #[test]
    fn enumerate_tile_coords_col_major_2x2() {
        let coords = enumerate_tile_coords(&[(0, 1), (0, 1)], TileOrder::ColumnMajor);
        assert_eq!(
            vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]],
            coords
        );
    }
}
