//! The [`LatticeMap`]: basis count, per-axis repetitions and periodicity, and the index
//! arithmetic (neighbour lookup, periodic wrapping, splitting) built on top of it.

use super::coordinate::Coordinate;
use super::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Owns the shape of the lattice: how many basis sites per primitive cell, how many times the
/// cell repeats along each axis, and whether each axis wraps around.
///
/// A global site index decomposes uniquely into `(cell_i, cell_j, cell_k, basis)` via row-major
/// encoding: `index = ((i * rep_b + j) * rep_c + k) * n_basis + basis`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct LatticeMap {
    n_basis: usize,
    repetitions: [usize; 3],
    periodic: [bool; 3],
}

impl LatticeMap {
    /// Constructs a new lattice map from its basis count, per-axis repetitions and periodicity.
    #[must_use]
    pub const fn new(n_basis: usize, repetitions: [usize; 3], periodic: [bool; 3]) -> Self {
        Self {
            n_basis,
            repetitions,
            periodic,
        }
    }

    /// Number of basis sites per primitive cell.
    #[must_use]
    pub const fn n_basis(&self) -> usize {
        self.n_basis
    }

    /// Per-axis repetitions of the primitive cell.
    #[must_use]
    pub const fn repetitions(&self) -> [usize; 3] {
        self.repetitions
    }

    /// Per-axis periodicity.
    #[must_use]
    pub const fn periodic(&self) -> [bool; 3] {
        self.periodic
    }

    /// Total number of sites on the lattice.
    #[must_use]
    pub const fn n_sites(&self) -> usize {
        self.repetitions[0] * self.repetitions[1] * self.repetitions[2] * self.n_basis
    }

    /// The `n_basis` global indices contained in cell `(i, j, k)`, in basis order.
    #[must_use]
    pub fn indices_from_cell(&self, i: usize, j: usize, k: usize) -> Vec<usize> {
        let base = ((i * self.repetitions[1] + j) * self.repetitions[2] + k) * self.n_basis;
        (0..self.n_basis).map(|b| base + b).collect()
    }

    /// Decomposes a global index into its `(cell_i, cell_j, cell_k, basis)` components.
    #[must_use]
    pub fn index_to_cell(&self, index: usize) -> (usize, usize, usize, usize) {
        let basis = index % self.n_basis;
        let rest = index / self.n_basis;
        let k = rest % self.repetitions[2];
        let rest = rest / self.repetitions[2];
        let j = rest % self.repetitions[1];
        let i = rest / self.repetitions[1];
        (i, j, k, basis)
    }

    fn index_from_cell(&self, i: usize, j: usize, k: usize, basis: usize) -> usize {
        ((i * self.repetitions[1] + j) * self.repetitions[2] + k) * self.n_basis + basis
    }

    /// Wraps a signed cell coordinate on `axis` into `0..repetitions[axis]`. Returns `None` if
    /// the axis is not periodic and the coordinate falls outside the lattice.
    fn wrap_cell_axis(&self, axis: usize, coord: isize) -> Option<usize> {
        let rep = self.repetitions[axis] as isize;

        if self.periodic[axis] {
            Some(coord.rem_euclid(rep) as usize)
        } else if coord >= 0 && coord < rep {
            Some(coord as usize)
        } else {
            None
        }
    }

    /// Returns the global indices of all basis sites in every primitive cell whose cell
    /// coordinates differ from `index`'s by at most `shells` on each axis.
    ///
    /// Non-periodic axes cull out-of-bounds cells; periodic axes wrap. Results are ordered with
    /// Δi outermost, then Δj, then Δk, then basis `b`.
    #[must_use]
    pub fn neighbour_indices(&self, index: usize, shells: usize) -> Vec<usize> {
        let (i, j, k, _) = self.index_to_cell(index);
        let shells = shells as isize;

        let mut result = Vec::new();
        for di in -shells..=shells {
            let Some(ni) = self.wrap_cell_axis(0, i as isize + di) else {
                continue;
            };
            for dj in -shells..=shells {
                let Some(nj) = self.wrap_cell_axis(1, j as isize + dj) else {
                    continue;
                };
                for dk in -shells..=shells {
                    let Some(nk) = self.wrap_cell_axis(2, k as isize + dk) else {
                        continue;
                    };
                    for b in 0..self.n_basis {
                        result.push(self.index_from_cell(ni, nj, nk, b));
                    }
                }
            }
        }
        result
    }

    /// Union of [`Self::neighbour_indices`] for every index in `indices`, sorted and
    /// deduplicated.
    #[must_use]
    pub fn superset_neighbour_indices(&self, indices: &[usize], shells: usize) -> Vec<usize> {
        let mut result: Vec<usize> = indices
            .iter()
            .flat_map(|&index| self.neighbour_indices(index, shells))
            .collect();
        result.sort_unstable();
        result.dedup();
        result
    }

    /// Computes the target index reached by moving the particle at `index` by the cell offset
    /// `(di, dj, dk)` and landing on `relative_basis` added to the source's basis.
    #[must_use]
    pub fn index_from_move_info(
        &self,
        index: usize,
        di: isize,
        dj: isize,
        dk: isize,
        relative_basis: isize,
    ) -> Option<usize> {
        let (i, j, k, basis) = self.index_to_cell(index);
        let ni = self.wrap_cell_axis(0, i as isize + di)?;
        let nj = self.wrap_cell_axis(1, j as isize + dj)?;
        let nk = self.wrap_cell_axis(2, k as isize + dk)?;
        let n_basis = self.n_basis as isize;
        let nb = (basis as isize + relative_basis).rem_euclid(n_basis) as usize;
        Some(self.index_from_cell(ni, nj, nk, nb))
    }

    /// Folds every component of `coord` into `[-rep_axis/2, +rep_axis/2)` for axes that are
    /// periodic, leaving non-periodic axes untouched.
    #[must_use]
    pub fn wrap(&self, coord: Coordinate) -> Coordinate {
        Coordinate::new(
            self.wrap_component(coord.x, 0),
            self.wrap_component(coord.y, 1),
            self.wrap_component(coord.z, 2),
        )
    }

    /// Folds a single component of `coord` that lies on `axis`, leaving it untouched if `axis`
    /// is not periodic.
    #[must_use]
    pub fn wrap_axis(&self, value: f64, axis: usize) -> f64 {
        self.wrap_component(value, axis)
    }

    fn wrap_component(&self, value: f64, axis: usize) -> f64 {
        if !self.periodic[axis] {
            return value;
        }

        let rep = self.repetitions[axis] as f64;
        let half = rep / 2.0;

        // fold into [-half, half)
        let mut wrapped = (value + half).rem_euclid(rep) - half;

        // rem_euclid can land exactly on `half` due to floating point rounding; nudge back in
        if wrapped >= half {
            wrapped -= rep;
        }
        wrapped
    }

    /// Partitions the lattice into `nx * ny * nz` equal tiles, in `(x outer, y, z inner)` order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSplit`] unless each per-axis repetition is divisible by the
    /// corresponding divisor.
    pub fn split(&self, nx: usize, ny: usize, nz: usize) -> Result<Vec<SubLatticeMap>> {
        let divisors = [nx, ny, nz];
        if (0..3).any(|axis| divisors[axis] == 0 || self.repetitions[axis] % divisors[axis] != 0)
        {
            return Err(Error::InvalidSplit {
                repetitions: self.repetitions,
                divisors,
            });
        }

        let sub_repetitions = [
            self.repetitions[0] / nx,
            self.repetitions[1] / ny,
            self.repetitions[2] / nz,
        ];
        let sub_map = Self::new(self.n_basis, sub_repetitions, self.periodic);

        let mut tiles = Vec::with_capacity(nx * ny * nz);
        for ti in 0..nx {
            for tj in 0..ny {
                for tk in 0..nz {
                    let origin_cell = (
                        ti * sub_repetitions[0],
                        tj * sub_repetitions[1],
                        tk * sub_repetitions[2],
                    );
                    tiles.push(SubLatticeMap::new(sub_map, *self, origin_cell)?);
                }
            }
        }
        Ok(tiles)
    }
}

/// A [`LatticeMap`] covering a tile of a larger parent lattice, plus the cell-index origin of
/// that tile within the parent.
///
/// Invariant: the parent's repetitions are integer multiples of the tile's per-axis
/// repetitions, and `n_basis` matches.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SubLatticeMap {
    map: LatticeMap,
    parent_repetitions: [usize; 3],
    origin_cell: (usize, usize, usize),
}

impl SubLatticeMap {
    /// Constructs a sub-lattice map, checking the invariant against `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleLatticeMaps`] if `map` does not share `n_basis` with
    /// `parent`, or if `parent`'s repetitions are not integer multiples of `map`'s.
    pub fn new(map: LatticeMap, parent: LatticeMap, origin_cell: (usize, usize, usize)) -> Result<Self> {
        if map.n_basis != parent.n_basis {
            return Err(Error::IncompatibleLatticeMaps(format!(
                "n_basis mismatch: {} vs parent's {}",
                map.n_basis, parent.n_basis
            )));
        }
        for axis in 0..3 {
            if parent.repetitions[axis] % map.repetitions[axis] != 0 {
                return Err(Error::IncompatibleLatticeMaps(format!(
                    "axis {axis}: parent repetitions {} not a multiple of {}",
                    parent.repetitions[axis], map.repetitions[axis]
                )));
            }
        }

        Ok(Self {
            map,
            parent_repetitions: parent.repetitions,
            origin_cell,
        })
    }

    /// The tile's own lattice map.
    #[must_use]
    pub const fn map(&self) -> &LatticeMap {
        &self.map
    }

    /// The origin cell index of this tile within its parent.
    #[must_use]
    pub const fn origin_cell(&self) -> (usize, usize, usize) {
        self.origin_cell
    }

    /// Translates a global index local to this tile into the corresponding global index of the
    /// parent lattice.
    #[must_use]
    pub fn local_to_parent_index(&self, local_index: usize) -> usize {
        let (li, lj, lk, basis) = self.map.index_to_cell(local_index);
        let (oi, oj, ok) = self.origin_cell;
        let i = oi + li;
        let j = oj + lj;
        let k = ok + lk;

        ((i * self.parent_repetitions[1] + j) * self.parent_repetitions[2] + k) * self.map.n_basis
            + basis
    }
}
