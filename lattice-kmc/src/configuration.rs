//! [`Configuration`]: the mutable lattice state — per-site type and atom identity, per-atom
//! tracked coordinates, cached neighbourhood match lists, and slow/fast classification flags.

use super::coordinate::Coordinate;
use super::error::{Error, Result};
use super::lattice_map::{LatticeMap, SubLatticeMap};
use super::match_list::{merge_same_point, ConfigMatchListEntry, MatchList, WILDCARD};
use super::process::Process;
use rustc_hash::FxHashMap;

/// The mutable lattice state.
///
/// Owns parallel arrays of length `N` (the number of lattice sites) plus per-atom-id arrays
/// used to track diffusive motion through periodic images. Mutated only by
/// [`Self::perform_process`], the distributor (via the mutation façade below) and the matcher's
/// `classify_configuration` pass (the `slow_flags` field only) — see the design notes on
/// friend-class access.
pub struct Configuration {
    coordinates: Vec<Coordinate>,
    types: Vec<u32>,
    elements: Vec<String>,
    atom_id: Vec<usize>,
    atom_id_coordinates: Vec<Coordinate>,
    atom_id_elements: Vec<String>,
    slow_flags: Vec<bool>,
    match_lists: Vec<MatchList<ConfigMatchListEntry>>,
    type_names: Vec<String>,
    possible_types: FxHashMap<String, u32>,

    // Scratch buffers written by `perform_process`; sized by `init_match_lists` to the widest
    // observed match-list length and reused across calls to avoid per-step allocation.
    affected_indices: Vec<usize>,
    moved_atom_ids: Vec<usize>,
    recent_move_vectors: Vec<Coordinate>,
    n_moved: usize,
}

impl Configuration {
    /// Constructs a configuration from per-site coordinates, element names and the
    /// possible-types map (`name -> non-negative int`, `0` reserved for the wildcard `"*"`).
    ///
    /// `atom_id[i]` is initialized to `i`, and `atom_id_coordinates` is a copy of `coordinates`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinateMismatch`] if `coordinates` and `elements` have different
    /// lengths, or [`Error::ElementTypeError`] if any element name is not present in
    /// `possible_types`.
    pub fn new(
        coordinates: Vec<Coordinate>,
        elements: Vec<String>,
        possible_types: FxHashMap<String, u32>,
    ) -> Result<Self> {
        let n = coordinates.len();
        if elements.len() != n {
            return Err(Error::CoordinateMismatch(elements.len()));
        }

        let mut types = Vec::with_capacity(n);
        for element in &elements {
            let &t = possible_types
                .get(element)
                .ok_or_else(|| Error::ElementTypeError(element.clone()))?;
            types.push(t);
        }

        let max_type = possible_types.values().copied().max().unwrap_or(0);
        let mut type_names = vec![String::new(); max_type as usize + 1];
        for (name, &t) in &possible_types {
            type_names[t as usize] = name.clone();
        }

        let atom_id: Vec<usize> = (0..n).collect();
        let atom_id_coordinates = coordinates.clone();
        let atom_id_elements = elements.clone();

        Ok(Self {
            coordinates,
            types,
            elements,
            atom_id,
            atom_id_coordinates,
            atom_id_elements,
            slow_flags: vec![true; n],
            match_lists: vec![MatchList::empty(); n],
            type_names,
            possible_types,
            affected_indices: Vec::new(),
            moved_atom_ids: Vec::new(),
            recent_move_vectors: Vec::new(),
            n_moved: 0,
        })
    }

    /// Number of lattice sites.
    #[must_use]
    pub fn n_sites(&self) -> usize {
        self.coordinates.len()
    }

    /// Per-site coordinates (immutable after construction).
    #[must_use]
    pub fn coordinates(&self) -> &[Coordinate] {
        &self.coordinates
    }

    /// Per-site species type.
    #[must_use]
    pub fn types(&self) -> &[u32] {
        &self.types
    }

    /// Per-site element name.
    #[must_use]
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// Which logical particle currently occupies each site.
    #[must_use]
    pub fn atom_id(&self) -> &[usize] {
        &self.atom_id
    }

    /// Cumulative unwrapped coordinate of each atom id, for diffusion tracking.
    #[must_use]
    pub fn atom_id_coordinates(&self) -> &[Coordinate] {
        &self.atom_id_coordinates
    }

    /// Current element of each atom id.
    #[must_use]
    pub fn atom_id_elements(&self) -> &[String] {
        &self.atom_id_elements
    }

    /// Per-site slow/fast classification flag.
    #[must_use]
    pub fn slow_flags(&self) -> &[bool] {
        &self.slow_flags
    }

    /// The cached match list for site `i`.
    #[must_use]
    pub fn match_list_at(&self, i: usize) -> &MatchList<ConfigMatchListEntry> {
        &self.match_lists[i]
    }

    /// Maps a type integer back to its element name.
    #[must_use]
    pub fn type_name(&self, t: u32) -> &str {
        &self.type_names[t as usize]
    }

    /// The possible-types map this configuration was constructed with.
    #[must_use]
    pub const fn possible_types(&self) -> &FxHashMap<String, u32> {
        &self.possible_types
    }

    /// Builds and caches the per-site neighbourhood match list for every site, covering the
    /// widest range any process needs. Also resizes the scratch buffers written by
    /// [`Self::perform_process`] to the largest observed match-list length.
    pub fn init_match_lists(&mut self, lattice_map: &LatticeMap, range: usize) {
        let mut widest = 0;
        for i in 0..self.n_sites() {
            let indices = lattice_map.neighbour_indices(i, range);
            widest = widest.max(indices.len());
            self.match_lists[i] = self.match_list(i, &indices, lattice_map);
        }

        self.affected_indices = vec![0; widest];
        self.moved_atom_ids = vec![0; widest];
        self.recent_move_vectors = vec![Coordinate::zero(); widest];
    }

    /// Constructs a (sorted) configuration match list over `indices`, with coordinates
    /// translated to be relative to `origin` and periodically wrapped per active axis.
    #[must_use]
    pub fn match_list(
        &self,
        origin: usize,
        indices: &[usize],
        lattice_map: &LatticeMap,
    ) -> MatchList<ConfigMatchListEntry> {
        let origin_coord = self.coordinates[origin];

        let entries: Vec<ConfigMatchListEntry> = indices
            .iter()
            .map(|&index| {
                let relative = lattice_map.wrap(self.coordinates[index] - origin_coord);
                ConfigMatchListEntry::new(self.types[index], relative.norm(), relative, index)
            })
            .collect();

        MatchList::new(entries)
    }

    /// Refreshes only the `match_type` field of each cached entry at site `i`, reading the
    /// current `types` of the sites it references. Cheap to call after `types` changes
    /// elsewhere in the neighbourhood.
    pub fn update_match_list(&mut self, i: usize) {
        let types = &self.types;
        for entry in self.match_lists[i].entries_mut() {
            entry.match_type = types[entry.index];
        }
    }

    /// Sets the slow/fast flag of site `i` directly.
    pub fn update_slow_flag(&mut self, i: usize, value: bool) {
        self.slow_flags[i] = value;
    }

    /// Sets every site's `slow_flags` to `true`, except sites whose current element is in
    /// `fast_elements`.
    pub fn reset_slow_flags(&mut self, fast_elements: &[String]) {
        for i in 0..self.n_sites() {
            self.slow_flags[i] = !fast_elements.contains(&self.elements[i]);
        }
    }

    // --- mutation façade: narrow, typed accessors granted to the matcher/distributor modules ---

    /// Overwrites the type (and matching element name) at site `i`.
    pub(crate) fn set_type(&mut self, i: usize, new_type: u32) {
        self.types[i] = new_type;
        self.elements[i] = self.type_names[new_type as usize].clone();
    }

    /// Overwrites the atom id occupying site `i`.
    pub(crate) fn set_atom_id(&mut self, i: usize, atom_id: usize) {
        self.atom_id[i] = atom_id;
    }

    /// Overwrites the tracked element of atom id `a`.
    pub(crate) fn set_atom_id_element(&mut self, a: usize, element: String) {
        self.atom_id_elements[a] = element;
    }

    /// Bulk-overwrites `(type, atom_id, element)` at the given sites, e.g. for the distributor's
    /// shuffles. `updates` is `(site_index, type, atom_id, element)`.
    pub(crate) fn bulk_overwrite(&mut self, updates: &[(usize, u32, usize, String)]) {
        for (site, t, a, element) in updates {
            self.types[*site] = *t;
            self.elements[*site] = element.clone();
            self.atom_id[*site] = *a;
        }
    }

    /// Applies `process` at `site`, which must currently be in `process.sites()`.
    ///
    /// Walks the aligned `(process_entry, config_entry)` pairs in sorted order; for each pair
    /// whose `update_type` differs from the site's current type, updates `types`/`elements`,
    /// advances the moved atom's unwrapped coordinate, and records the affected index / moved
    /// atom id / move vector into the scratch buffers returned by [`Self::last_move`]. Finally
    /// applies `process.id_moves()` to swap atom-id occupancy.
    pub fn perform_process(&mut self, process: &Process, site: usize) {
        self.n_moved = 0;

        let pairs = merge_same_point(process.match_list(), &self.match_lists[site]);
        // process match-list position -> config site index, for the id_moves pass below.
        let mut position_to_site = vec![None; process.match_list().len()];

        for (p_idx, o_idx) in pairs {
            let config_index = self.match_lists[site].entries()[o_idx].index;
            position_to_site[p_idx] = Some(config_index);

            let process_entry = process.match_list().entries()[p_idx];
            if process_entry.update_type > WILDCARD && self.types[config_index] != process_entry.update_type {
                let moved_atom = self.atom_id[config_index];
                self.set_type(config_index, process_entry.update_type);

                let move_vector = process_entry.move_coordinate.unwrap_or(Coordinate::zero());
                self.atom_id_coordinates[moved_atom] = self.atom_id_coordinates[moved_atom] + move_vector;

                if process_entry.move_coordinate.is_none() {
                    self.set_atom_id_element(moved_atom, self.elements[config_index].clone());
                }

                self.affected_indices[self.n_moved] = config_index;
                self.moved_atom_ids[self.n_moved] = moved_atom;
                self.recent_move_vectors[self.n_moved] = move_vector;
                self.n_moved += 1;
            }
        }

        // snapshot every destination's incoming atom-id against the pre-move state first: a
        // two-point exchange declares both (from, to) and (to, from), and applying those
        // sequentially against a live array would have the second move undo the first.
        let snapshot: Vec<(usize, usize)> = process
            .id_moves()
            .iter()
            .filter_map(|&(from, to)| {
                let from_site = position_to_site[from]?;
                let to_site = position_to_site[to]?;
                Some((to_site, self.atom_id[from_site]))
            })
            .collect();

        for (to_site, atom_id) in snapshot {
            self.set_atom_id(to_site, atom_id);
        }
    }

    /// The affected site indices, moved atom ids and move vectors recorded by the most recent
    /// [`Self::perform_process`] call. Callers must only read the first `n_moved` entries of
    /// each returned slice; the buffers are scratch space and not cleared between calls.
    #[must_use]
    pub fn last_move(&self) -> (&[usize], &[usize], &[Coordinate], usize) {
        (
            &self.affected_indices,
            &self.moved_atom_ids,
            &self.recent_move_vectors,
            self.n_moved,
        )
    }

    /// Walks all sites; for every site whose element is in `fast_elements`, records
    /// `(element, site_index)` and overwrites that site with `replace_species`, temporarily
    /// voiding the region so it can be refilled by the distributor.
    pub fn extract_fast_species(&mut self, fast_elements: &[String], replace_species: &str) -> (Vec<String>, Vec<usize>) {
        let replace_type = *self.possible_types.get(replace_species).unwrap_or(&WILDCARD);

        let mut out_species = Vec::new();
        let mut out_indices = Vec::new();

        for i in 0..self.n_sites() {
            if fast_elements.contains(&self.elements[i]) {
                out_species.push(self.elements[i].clone());
                out_indices.push(i);
                self.set_type(i, replace_type);
            }
        }

        (out_species, out_indices)
    }

    /// Partitions this configuration along with `lattice_map.split(x, y, z)`.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidSplit`] from [`LatticeMap::split`].
    pub fn split(&self, lattice_map: &LatticeMap, x: usize, y: usize, z: usize) -> Result<Vec<SubConfiguration>> {
        let tiles = lattice_map.split(x, y, z)?;

        Ok(tiles
            .iter()
            .map(|tile: &SubLatticeMap| {
                let n_local = tile.map().n_sites();
                let mut global_indices = Vec::with_capacity(n_local);
                let mut types = Vec::with_capacity(n_local);
                let mut atom_ids = Vec::with_capacity(n_local);
                let mut elements = Vec::with_capacity(n_local);

                for local_index in 0..n_local {
                    let global_index = tile.local_to_parent_index(local_index);
                    global_indices.push(global_index);
                    types.push(self.types[global_index]);
                    atom_ids.push(self.atom_id[global_index]);
                    elements.push(self.elements[global_index].clone());
                }

                SubConfiguration {
                    global_indices,
                    types,
                    atom_ids,
                    elements,
                }
            })
            .collect())
    }

    /// Writes a [`SubConfiguration`]'s local arrays back into this configuration at the global
    /// indices it was built from.
    pub fn update_local_from_sub_config(&mut self, sub: &SubConfiguration) {
        for local in 0..sub.global_indices.len() {
            let global = sub.global_indices[local];
            self.set_type(global, sub.types[local]);
            self.set_atom_id(global, sub.atom_ids[local]);
        }
    }
}

/// A tile of a [`Configuration`], produced by [`Configuration::split`], carrying the global
/// index mapping needed to write it back.
#[derive(Clone, Debug)]
pub struct SubConfiguration {
    global_indices: Vec<usize>,
    types: Vec<u32>,
    atom_ids: Vec<usize>,
    elements: Vec<String>,
}

impl SubConfiguration {
    /// The global site index each local index maps to.
    #[must_use]
    pub fn global_indices(&self) -> &[usize] {
        &self.global_indices
    }

    /// Local per-site types.
    #[must_use]
    pub fn types(&self) -> &[u32] {
        &self.types
    }

    /// Mutable access to local per-site types, for the distributor's shuffles.
    pub fn types_mut(&mut self) -> &mut [u32] {
        &mut self.types
    }

    /// Local per-site atom ids.
    #[must_use]
    pub fn atom_ids(&self) -> &[usize] {
        &self.atom_ids
    }

    /// Mutable access to local per-site atom ids.
    pub fn atom_ids_mut(&mut self) -> &mut [usize] {
        &mut self.atom_ids
    }

    /// Local per-site element names.
    #[must_use]
    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    /// Mutable access to local per-site element names.
    pub fn elements_mut(&mut self) -> &mut [String] {
        &mut self.elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn possible_types() -> FxHashMap<String, u32> {
        let mut map = FxHashMap::default();
        map.insert("*".to_string(), 0);
        map.insert("A".to_string(), 1);
        map.insert("B".to_string(), 2);
        map
    }

    fn simple_config(n: usize) -> Configuration {
        let coordinates: Vec<Coordinate> = (0..n).map(|i| Coordinate::new(i as f64, 0.0, 0.0)).collect();
        let elements: Vec<String> = (0..n)
            .map(|i| if i % 2 == 0 { "A".to_string() } else { "B".to_string() })
            .collect();
        Configuration::new(coordinates, elements, possible_types()).unwrap()
    }

    #[test]
    fn constructor_rejects_unknown_element() {
        let coordinates = vec![Coordinate::zero()];
        let elements = vec!["unknown".to_string()];
        assert!(matches!(
            Configuration::new(coordinates, elements, possible_types()),
            Err(Error::ElementTypeError(_))
        ));
    }

    #[test]
    fn atom_id_starts_as_identity_permutation() {
        let config = simple_config(10);
        assert_eq!(config.atom_id(), &(0..10).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn elements_match_type_names_invariant() {
        let config = simple_config(10);
        for i in 0..config.n_sites() {
            assert_eq!(config.elements()[i], config.type_name(config.types()[i]));
        }
    }

    #[test]
    fn init_match_lists_is_idempotent() {
        let lattice_map = LatticeMap::new(1, [10, 1, 1], [true, false, false]);
        let mut config = simple_config(10);

        config.init_match_lists(&lattice_map, 2);
        let before: Vec<_> = (0..10)
            .map(|i| config.match_list_at(i).entries().to_vec())
            .collect();

        config.init_match_lists(&lattice_map, 2);
        let after: Vec<_> = (0..10)
            .map(|i| config.match_list_at(i).entries().to_vec())
            .collect();

        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.len(), a.len());
            for (be, ae) in b.iter().zip(a.iter()) {
                assert_eq!(be.index, ae.index);
                assert_eq!(be.match_type, ae.match_type);
            }
        }
    }

    #[test]
    fn reset_slow_flags_spares_fast_elements() {
        let mut config = simple_config(4);
        config.reset_slow_flags(&["A".to_string()]);

        // sites 0, 2 are "A" (fast), sites 1, 3 are "B" (slow)
        assert!(!config.slow_flags()[0]);
        assert!(config.slow_flags()[1]);
        assert!(!config.slow_flags()[2]);
        assert!(config.slow_flags()[3]);
    }

    #[test]
    fn extract_fast_species_voids_sites() {
        let mut config = simple_config(4);
        let (species, indices) = config.extract_fast_species(&["A".to_string()], "*");

        assert_eq!(species, vec!["A".to_string(), "A".to_string()]);
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(config.elements()[0], "*");
        assert_eq!(config.elements()[2], "*");
        // untouched
        assert_eq!(config.elements()[1], "B");
    }

    #[test]
    fn split_round_trips_through_write_back() {
        let lattice_map = LatticeMap::new(1, [4, 4, 1], [true, true, false]);
        let mut config = Configuration::new(
            (0..16)
                .map(|idx| {
                    let (i, j, _, _) = lattice_map.index_to_cell(idx);
                    Coordinate::new(i as f64, j as f64, 0.0)
                })
                .collect(),
            (0..16)
                .map(|i| if i % 2 == 0 { "A".to_string() } else { "B".to_string() })
                .collect(),
            possible_types(),
        )
        .unwrap();

        let mut subs = config.split(&lattice_map, 2, 2, 1).unwrap();
        assert_eq!(subs.len(), 4);

        // flip every local type in the first tile and write it back
        for t in subs[0].types_mut() {
            *t = if *t == 1 { 2 } else { 1 };
        }
        for e in subs[0].elements_mut() {
            *e = if *e == "A" { "B".to_string() } else { "A".to_string() };
        }
        config.update_local_from_sub_config(&subs[0]);

        for &global in subs[0].global_indices() {
            assert_ne!(config.elements()[global], if global % 2 == 0 { "A" } else { "B" });
        }
    }

    #[test]
    fn perform_process_advances_atom_coordinate() {
        // 4x1x1, basis 1, process swaps (A, V) across offset (0,0,... wait 1D uses x) at distance 1
        let lattice_map = LatticeMap::new(1, [4, 1, 1], [true, false, false]);
        let mut config = Configuration::new(
            vec![
                Coordinate::new(0.0, 0.0, 0.0),
                Coordinate::new(1.0, 0.0, 0.0),
                Coordinate::new(2.0, 0.0, 0.0),
                Coordinate::new(3.0, 0.0, 0.0),
            ],
            vec!["A".to_string(), "*".to_string(), "*".to_string(), "*".to_string()],
            possible_types(),
        )
        .unwrap();
        config.init_match_lists(&lattice_map, 1);

        let process = crate::process::test_support::hop_process(config.possible_types(), vec![0]);

        config.perform_process(&process, 0);

        assert_eq!(config.elements()[0], "*");
        assert_eq!(config.elements()[1], "A");
        assert_eq!(config.atom_id_coordinates()[0], Coordinate::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn perform_process_advances_atom_coordinate_unwrapped_across_periodic_boundary() {
        // same 4x1x1 periodic chain, but the hop starts at the last site: the destination wraps
        // back to site 0, yet the tracked atom coordinate keeps accumulating past the boundary.
        let lattice_map = LatticeMap::new(1, [4, 1, 1], [true, false, false]);
        let mut config = Configuration::new(
            vec![
                Coordinate::new(0.0, 0.0, 0.0),
                Coordinate::new(1.0, 0.0, 0.0),
                Coordinate::new(2.0, 0.0, 0.0),
                Coordinate::new(3.0, 0.0, 0.0),
            ],
            vec!["*".to_string(), "*".to_string(), "*".to_string(), "A".to_string()],
            possible_types(),
        )
        .unwrap();
        config.init_match_lists(&lattice_map, 1);

        let process = crate::process::test_support::hop_process(config.possible_types(), vec![0]);
        let moved_atom = config.atom_id()[3];

        config.perform_process(&process, 3);

        assert_eq!(config.elements()[3], "*");
        assert_eq!(config.elements()[0], "A");
        // unwrapped: 3.0 + 1.0 = 4.0, not wrapped back to 0.0.
        assert_eq!(config.atom_id_coordinates()[moved_atom], Coordinate::new(4.0, 0.0, 0.0));
    }

    /// A 3x3x3 two-basis lattice with "A" on every basis-0 (even) site and "B" on every basis-1
    /// (odd) site, and an (A, V) swap process at offset (0,0,1) on basis 0: since the
    /// configuration has no "V" anywhere, the process's listed sites are exactly the even indices
    /// whose upward neighbour is vacant, which is the empty set.
    #[test]
    fn calculate_matching_sites_are_even_indices_with_vacant_upward_neighbour() {
        let mut types = possible_types();
        types.insert("V".to_string(), 3);

        let lattice_map = LatticeMap::new(2, [3, 3, 3], [true, true, true]);
        let basis = [Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(0.5, 0.5, 0.5)];
        let mut coordinates = Vec::with_capacity(54);
        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    for b in basis {
                        coordinates.push(b + Coordinate::new(i as f64, j as f64, k as f64));
                    }
                }
            }
        }
        let elements: Vec<String> = (0..54)
            .map(|idx| if idx % 2 == 0 { "A" } else { "B" }.to_string())
            .collect();

        let mut configuration = Configuration::new(coordinates.clone(), elements, types.clone()).unwrap();
        configuration.init_match_lists(&lattice_map, 1);

        let coords = vec![Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(0.0, 0.0, 1.0)];
        let before = Configuration::new(coords.clone(), vec!["A".to_string(), "V".to_string()], types.clone()).unwrap();
        let after = Configuration::new(coords, vec!["V".to_string(), "A".to_string()], types).unwrap();
        let process = crate::process::Process::new(
            0,
            before,
            after,
            1.0,
            vec![0],
            vec![(0, Coordinate::new(0.0, 0.0, 1.0))],
            None,
        )
        .unwrap();

        let mut sitesmap = crate::sites_map::SitesMap::new(vec![0; 54]);
        sitesmap.init_match_lists(&lattice_map, &coordinates, 1);
        let mut interactions = crate::interactions::Interactions::new(vec![process]);
        let all_indices: Vec<usize> = (0..54).collect();
        crate::matcher::calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &all_indices,
            None,
        );

        assert!(interactions.processes()[0].sites().is_empty());
    }
}
