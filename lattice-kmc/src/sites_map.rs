//! [`SitesMap`]: an immutable per-site topology annotation, with its own cached neighbourhood
//! match lists — parallels [`Configuration`](crate::configuration::Configuration)'s caching, but
//! the underlying per-site classes never change after construction.

use super::lattice_map::LatticeMap;
use super::match_list::{MatchList, SiteMatchListEntry};

/// Fixed per-site topology classes (e.g. terrace/step/kink), plus the cached neighbourhood
/// match list each site needs to test a process's optional `site_pattern` constraint.
pub struct SitesMap {
    site_types: Vec<u32>,
    match_lists: Vec<MatchList<SiteMatchListEntry>>,
}

impl SitesMap {
    /// Constructs a sites map from its per-site topology classes.
    #[must_use]
    pub fn new(site_types: Vec<u32>) -> Self {
        let n = site_types.len();
        Self {
            site_types,
            match_lists: vec![MatchList::empty(); n],
        }
    }

    /// Number of lattice sites.
    #[must_use]
    pub fn n_sites(&self) -> usize {
        self.site_types.len()
    }

    /// Per-site topology class.
    #[must_use]
    pub fn site_types(&self) -> &[u32] {
        &self.site_types
    }

    /// Builds and caches the per-site neighbourhood match list for every site, covering `range`
    /// shells. Coordinates come from `lattice_map`'s own geometry via
    /// [`LatticeMap::neighbour_indices`]; this map has no notion of per-site coordinates of its
    /// own, so callers pass the same lattice-site coordinates used to build the paired
    /// [`Configuration`](crate::configuration::Configuration).
    pub fn init_match_lists(&mut self, lattice_map: &LatticeMap, coordinates: &[super::coordinate::Coordinate], range: usize) {
        for i in 0..self.n_sites() {
            let indices = lattice_map.neighbour_indices(i, range);
            self.match_lists[i] = self.match_list(i, &indices, coordinates, lattice_map);
        }
    }

    /// Constructs a (sorted) site match list over `indices`, with coordinates translated to be
    /// relative to `origin` and periodically wrapped per active axis.
    #[must_use]
    pub fn match_list(
        &self,
        origin: usize,
        indices: &[usize],
        coordinates: &[super::coordinate::Coordinate],
        lattice_map: &LatticeMap,
    ) -> MatchList<SiteMatchListEntry> {
        let origin_coord = coordinates[origin];

        let entries: Vec<SiteMatchListEntry> = indices
            .iter()
            .map(|&index| {
                let relative = lattice_map.wrap(coordinates[index] - origin_coord);
                SiteMatchListEntry::new(self.site_types[index], relative.norm(), relative, index)
            })
            .collect();

        MatchList::new(entries)
    }

    /// The cached match list for site `i`.
    #[must_use]
    pub fn match_list_at(&self, i: usize) -> &MatchList<SiteMatchListEntry> {
        &self.match_lists[i]
    }
}
