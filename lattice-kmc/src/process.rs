//! [`Process`]: a transition rule — a sorted local pattern, the post-state, a rate, and the
//! bookkeeping needed to apply it and pick among its currently-matching sites.

use super::configuration::Configuration;
use super::coordinate::Coordinate;
use super::error::{Error, Result};
use super::match_list::{MatchList, ProcessMatchListEntry, WILDCARD};
use super::random::RandomStream;

/// How a process's rate is determined.
#[derive(Clone, Debug)]
enum RateModel {
    /// A single rate constant shared by every listed site; `total_rate = rate * sites.len()`.
    Constant(f64),
    /// A per-site rate with a running cumulative table, rebuilt whenever a site is added,
    /// removed, or re-rated. `base_rate` is the nominal rate constant handed to the external
    /// rate callback alongside each request; it does not itself contribute to `total_rate`.
    Custom {
        base_rate: f64,
        site_rates: Vec<f64>,
        incremental_rate_table: Vec<f64>,
    },
}

/// A transition rule: a sorted local pattern (`before`), the post-state (`after`), a rate, the
/// basis sites it may apply at, the atom-id move graph, and its fast/redistribution/custom-rate
/// flags.
#[derive(Clone, Debug)]
pub struct Process {
    process_number: usize,
    match_list: MatchList<ProcessMatchListEntry>,
    id_moves: Vec<(usize, usize)>,
    basis_sites: Vec<usize>,
    range: usize,
    cutoff: f64,
    sites: Vec<usize>,
    fast: bool,
    redistribution: bool,
    redist_species: Option<String>,
    site_pattern: Option<MatchList<ProcessMatchListEntry>>,
    rate_model: RateModel,
}

impl Process {
    /// Builds a process from paired `before`/`after` local-pattern configurations (which must
    /// share the same coordinates), a rate constant, the basis sites it may fire at, the
    /// `(pre-sort entry index, displacement)` pairs describing which entries move, and an
    /// optional per-entry site-topology constraint (in the same pre-sort order as `before`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinateMismatch`] if `before` and `after` have different coordinates.
    pub fn new(
        process_number: usize,
        before: Configuration,
        after: Configuration,
        rate: f64,
        basis_sites: Vec<usize>,
        moves: Vec<(usize, Coordinate)>,
        site_types: Option<Vec<u32>>,
    ) -> Result<Self> {
        Self::with_rate_model(
            process_number,
            before,
            after,
            basis_sites,
            moves,
            site_types,
            RateModel::Constant(rate),
        )
    }

    /// Like [`Self::new`], but parameterized over the rate model so [`custom_rate_process`] can
    /// share this constructor's validation and pattern-building logic.
    fn with_rate_model(
        process_number: usize,
        before: Configuration,
        after: Configuration,
        basis_sites: Vec<usize>,
        moves: Vec<(usize, Coordinate)>,
        site_types: Option<Vec<u32>>,
        rate_model: RateModel,
    ) -> Result<Self> {
        if before.coordinates().len() != after.coordinates().len() {
            return Err(Error::CoordinateMismatch(0));
        }
        for (i, (b, a)) in before.coordinates().iter().zip(after.coordinates()).enumerate() {
            if b != a {
                return Err(Error::CoordinateMismatch(i));
            }
        }

        let n = before.coordinates().len();
        let mut pre_sort: Vec<ProcessMatchListEntry> = (0..n)
            .map(|i| {
                let coordinate = before.coordinates()[i];
                let match_type = before.types()[i];
                let after_type = after.types()[i];
                let update_type = if after_type != match_type { after_type } else { WILDCARD };
                ProcessMatchListEntry::new(match_type, coordinate.norm(), coordinate, update_type)
            })
            .collect();

        for &(entry_index, displacement) in &moves {
            let cell_offset = (
                displacement.x.round() as i32,
                displacement.y.round() as i32,
                displacement.z.round() as i32,
                0,
            );
            pre_sort[entry_index] = pre_sort[entry_index].with_move(displacement, cell_offset);
        }

        // remember each pre-sort entry's destination *coordinate* so we can resolve id_moves
        // against post-sort indices below.
        let destinations: Vec<Option<Coordinate>> = pre_sort
            .iter()
            .map(|e| e.move_coordinate.map(|mv| e.coordinate + mv))
            .collect();
        let pre_sort_coordinates: Vec<Coordinate> = pre_sort.iter().map(|e| e.coordinate).collect();

        let match_list = MatchList::new(pre_sort.clone());

        // map: pre-sort index -> post-sort index, by coordinate identity (both are the same
        // multiset of points, just reordered).
        let mut used = vec![false; match_list.len()];
        let pre_to_post: Vec<usize> = pre_sort_coordinates
            .iter()
            .map(|coord| {
                let post = match_list
                    .entries()
                    .iter()
                    .enumerate()
                    .find(|(i, e)| !used[*i] && e.coordinate.approx_eq(coord))
                    .map_or(0, |(i, _)| i);
                used[post] = true;
                post
            })
            .collect();

        let mut id_moves = Vec::new();
        for (pre_idx, destination) in destinations.into_iter().enumerate() {
            let Some(destination) = destination else {
                continue;
            };
            let post_from = pre_to_post[pre_idx];
            let post_to = match_list
                .entries()
                .iter()
                .position(|e| e.coordinate.approx_eq(&destination))
                .unwrap_or(post_from);
            id_moves.push((post_from, post_to));
        }

        let range = match_list
            .entries()
            .iter()
            .flat_map(|e| [e.coordinate.x, e.coordinate.y, e.coordinate.z])
            .fold(0.0_f64, |acc, c| acc.max(c.abs()))
            .floor() as usize
            + 1;
        let cutoff = match_list.entries().iter().map(|e| e.distance).fold(0.0_f64, f64::max);

        let site_pattern = site_types.map(|types| {
            let entries = types
                .into_iter()
                .enumerate()
                .map(|(i, t)| {
                    let coordinate = before.coordinates()[i];
                    ProcessMatchListEntry::new(t, coordinate.norm(), coordinate, WILDCARD)
                })
                .collect();
            MatchList::new(entries)
        });

        Ok(Self {
            process_number,
            match_list,
            id_moves,
            basis_sites,
            range,
            cutoff,
            sites: Vec::new(),
            fast: false,
            redistribution: false,
            redist_species: None,
            site_pattern,
            rate_model,
        })
    }

    /// Marks this process as fast (eligible to mark species as fast during classification,
    /// §4.4), or slow (default).
    #[must_use]
    pub const fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    /// Marks this process as a redistribution process, which places `redist_species` and is
    /// never selected by the main step loop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingRedistSpecies`] if `redist_species` is empty.
    pub fn with_redistribution(mut self, redist_species: String) -> Result<Self> {
        if redist_species.is_empty() {
            return Err(Error::MissingRedistSpecies(self.process_number));
        }
        self.redistribution = true;
        self.redist_species = Some(redist_species);
        Ok(self)
    }

    /// The process's ordinal, as supplied at construction.
    #[must_use]
    pub const fn process_number(&self) -> usize {
        self.process_number
    }

    /// Accessor for the sorted local pattern.
    #[must_use]
    pub const fn match_list(&self) -> &MatchList<ProcessMatchListEntry> {
        &self.match_list
    }

    /// Mutable accessor, used by implicit-wildcard expansion (§4.5).
    pub(crate) fn match_list_mut(&mut self) -> &mut MatchList<ProcessMatchListEntry> {
        &mut self.match_list
    }

    /// Accessor for the atom-id move graph: `(from_entry_idx, to_entry_idx)` pairs into
    /// [`Self::match_list`].
    #[must_use]
    pub fn id_moves(&self) -> &[(usize, usize)] {
        &self.id_moves
    }

    /// Overwrites the move graph, rewriting indices after implicit-wildcard insertion (§4.5,
    /// §9: keep the insertion-time map as a side vector, apply in a second pass).
    pub(crate) fn set_id_moves(&mut self, id_moves: Vec<(usize, usize)>) {
        self.id_moves = id_moves;
    }

    /// The basis sites this process may apply at.
    #[must_use]
    pub fn basis_sites(&self) -> &[usize] {
        &self.basis_sites
    }

    /// Maximum absolute per-axis cell offset this process's match list reaches; determines the
    /// rematching halo after `perform_process`.
    #[must_use]
    pub const fn range(&self) -> usize {
        self.range
    }

    /// Maximum radial distance of any entry in this process's match list; bounds the geometry
    /// passed to custom-rate callbacks.
    #[must_use]
    pub const fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// `true` iff this process participates in fast-species classification.
    #[must_use]
    pub const fn is_fast(&self) -> bool {
        self.fast
    }

    /// `true` iff this process is a redistribution process.
    #[must_use]
    pub const fn is_redistribution(&self) -> bool {
        self.redistribution
    }

    /// The species this redistribution process places, if any.
    #[must_use]
    pub fn redist_species(&self) -> Option<&str> {
        self.redist_species.as_deref()
    }

    /// `true` iff this process is additionally constrained by site type.
    #[must_use]
    pub const fn has_site_types(&self) -> bool {
        self.site_pattern.is_some()
    }

    /// The site-topology pattern this process is constrained by, if any.
    #[must_use]
    pub const fn site_pattern(&self) -> Option<&MatchList<ProcessMatchListEntry>> {
        self.site_pattern.as_ref()
    }

    /// `true` iff this process carries per-site rates rather than one constant.
    #[must_use]
    pub const fn has_custom_rate(&self) -> bool {
        matches!(self.rate_model, RateModel::Custom { .. })
    }

    /// The rate constant handed to the external rate callback: the constant rate itself for a
    /// constant-rate process, or the declared nominal `base_rate` for a custom-rate one.
    #[must_use]
    pub const fn base_rate(&self) -> f64 {
        match &self.rate_model {
            RateModel::Constant(rate) => *rate,
            RateModel::Custom { base_rate, .. } => *base_rate,
        }
    }

    /// The currently-matching sites.
    #[must_use]
    pub fn sites(&self) -> &[usize] {
        &self.sites
    }

    /// `true` iff `i` is currently a matching site.
    #[must_use]
    pub fn is_listed(&self, i: usize) -> bool {
        self.sites.contains(&i)
    }

    /// Appends `i` to the matching sites. `rate` is used only when this process has a custom
    /// rate model.
    pub fn add_site(&mut self, i: usize, rate: f64) {
        self.sites.push(i);
        if let RateModel::Custom {
            site_rates,
            incremental_rate_table,
            ..
        } = &mut self.rate_model
        {
            site_rates.push(rate);
            Self::rebuild_table(site_rates, incremental_rate_table);
        }
    }

    /// Removes `i` from the matching sites via O(1) swap-with-last.
    pub fn remove_site(&mut self, i: usize) {
        let Some(pos) = self.sites.iter().position(|&s| s == i) else {
            return;
        };
        self.sites.swap_remove(pos);
        if let RateModel::Custom {
            site_rates,
            incremental_rate_table,
            ..
        } = &mut self.rate_model
        {
            site_rates.swap_remove(pos);
            Self::rebuild_table(site_rates, incremental_rate_table);
        }
    }

    /// Updates the per-site rate of an already-listed site `i`. A no-op for constant-rate
    /// processes.
    pub fn set_site_rate(&mut self, i: usize, rate: f64) {
        let Some(pos) = self.sites.iter().position(|&s| s == i) else {
            return;
        };
        if let RateModel::Custom {
            site_rates,
            incremental_rate_table,
            ..
        } = &mut self.rate_model
        {
            site_rates[pos] = rate;
            Self::rebuild_table(site_rates, incremental_rate_table);
        }
    }

    fn rebuild_table(site_rates: &[f64], incremental_rate_table: &mut Vec<f64>) {
        incremental_rate_table.clear();
        incremental_rate_table.extend(site_rates.iter().scan(0.0, |acc, &r| {
            *acc += r;
            Some(*acc)
        }));
    }

    /// This process's total rate: `rate * sites.len()` for a constant rate, or the last
    /// cumulative table entry for a custom rate.
    #[must_use]
    pub fn total_rate(&self) -> f64 {
        match &self.rate_model {
            RateModel::Constant(rate) => rate * self.sites.len() as f64,
            RateModel::Custom {
                incremental_rate_table,
                ..
            } => incremental_rate_table.last().copied().unwrap_or(0.0),
        }
    }

    /// Picks a site, weighted by per-site rate for custom-rate processes and uniformly
    /// otherwise.
    ///
    /// # Panics
    ///
    /// Panics if no sites are currently listed.
    pub fn pick_site(&self, rng: &mut RandomStream) -> usize {
        assert!(!self.sites.is_empty(), "pick_site called with no listed sites");

        match &self.rate_model {
            RateModel::Constant(_) => self.sites[rng.below(self.sites.len())],
            RateModel::Custom {
                incremental_rate_table,
                ..
            } => {
                let u = rng.uniform() * self.total_rate();
                let pos = incremental_rate_table.partition_point(|&cumulative| cumulative < u);
                self.sites[pos.min(self.sites.len() - 1)]
            }
        }
    }
}

/// Constructs a [`Process`] whose sites carry independent, per-site rates rather than one
/// shared constant.
#[must_use]
pub fn custom_rate_process(
    process_number: usize,
    before: Configuration,
    after: Configuration,
    base_rate: f64,
    basis_sites: Vec<usize>,
    moves: Vec<(usize, Coordinate)>,
    site_types: Option<Vec<u32>>,
) -> Result<Process> {
    Process::with_rate_model(
        process_number,
        before,
        after,
        basis_sites,
        moves,
        site_types,
        RateModel::Custom {
            base_rate,
            site_rates: Vec::new(),
            incremental_rate_table: Vec::new(),
        },
    )
}

/// Tiny process/configuration builders shared by this module's tests and by other modules'
/// tests that need a minimal, concrete process without re-deriving one from scratch.
#[cfg(test)]
pub mod test_support {
    use super::{Configuration, Coordinate, Process};
    use rustc_hash::FxHashMap;

    /// A 2-point hop pattern: `"A"` at the origin moves to a neighbouring `"*"` site one unit
    /// away along `x`, leaving a vacancy behind.
    #[must_use]
    pub fn hop_process(possible_types: &FxHashMap<String, u32>, basis_sites: Vec<usize>) -> Process {
        let coords = vec![Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(1.0, 0.0, 0.0)];
        let before =
            Configuration::new(coords.clone(), vec!["A".to_string(), "*".to_string()], possible_types.clone())
                .unwrap();
        let after =
            Configuration::new(coords.clone(), vec!["*".to_string(), "A".to_string()], possible_types.clone())
                .unwrap();

        Process::new(
            0,
            before,
            after,
            1.0,
            basis_sites,
            vec![(0, Coordinate::new(1.0, 0.0, 0.0))],
            None,
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    fn possible_types() -> FxHashMap<String, u32> {
        let mut map = FxHashMap::default();
        map.insert("*".to_string(), 0);
        map.insert("A".to_string(), 1);
        map.insert("B".to_string(), 2);
        map
    }

    #[test]
    fn rejects_coordinate_mismatch() {
        let before = Configuration::new(
            vec![Coordinate::new(0.0, 0.0, 0.0)],
            vec!["A".to_string()],
            possible_types(),
        )
        .unwrap();
        let after = Configuration::new(
            vec![Coordinate::new(1.0, 0.0, 0.0)],
            vec!["B".to_string()],
            possible_types(),
        )
        .unwrap();

        assert!(matches!(
            Process::new(0, before, after, 1.0, vec![0], vec![], None),
            Err(Error::CoordinateMismatch(0))
        ));
    }

    #[test]
    fn hop_process_has_one_id_move() {
        let process = test_support::hop_process(&possible_types(), vec![0]);
        assert_eq!(process.id_moves().len(), 1);
        assert_eq!(process.range(), 2);
    }

    #[test]
    fn site_bookkeeping_round_trips() {
        let mut process = test_support::hop_process(&possible_types(), vec![0]);
        process.add_site(3, 1.0);
        process.add_site(7, 1.0);
        assert!(process.is_listed(3));
        assert_eq!(process.total_rate(), 2.0);

        process.remove_site(3);
        assert!(!process.is_listed(3));
        assert!(process.is_listed(7));
        assert_eq!(process.total_rate(), 1.0);
    }

    #[test]
    fn custom_rate_process_total_rate_sums_site_rates() {
        let mut process = custom_rate_process(
            0,
            Configuration::new(vec![Coordinate::zero()], vec!["A".to_string()], possible_types()).unwrap(),
            Configuration::new(vec![Coordinate::zero()], vec!["B".to_string()], possible_types()).unwrap(),
            1.0,
            vec![0],
            vec![],
            None,
        )
        .unwrap();

        process.add_site(1, 10.0);
        process.add_site(2, 20.0);
        process.add_site(3, 70.0);

        assert_eq!(process.total_rate(), 100.0);
    }

    #[test]
    fn missing_redist_species_is_rejected() {
        let process = test_support::hop_process(&possible_types(), vec![0]);
        assert!(matches!(
            process.with_redistribution(String::new()),
            Err(Error::MissingRedistSpecies(_))
        ));
    }
}
