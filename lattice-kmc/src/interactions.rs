//! [`Interactions`]: the owning collection of processes — slow/fast/redistribution partitions,
//! the cumulative probability table, and implicit-wildcard expansion.

use super::configuration::Configuration;
use super::lattice_map::LatticeMap;
use super::match_list::{entry_cmp, MatchList, ProcessMatchListEntry};
use super::process::Process;
use super::random::RandomStream;
use itertools::{EitherOrBoth, Itertools};

/// Owns every [`Process`] and the stable-index pointer-views into it (§9: index handles, not
/// raw pointers, so the partitions survive the owning vector reallocating).
pub struct Interactions {
    processes: Vec<Process>,
    fast: Vec<usize>,
    slow: Vec<usize>,
    redistribution: Vec<usize>,
    probability_table: Vec<(f64, usize)>,
    picked_index: Option<usize>,
}

impl Interactions {
    /// Partitions `processes` into fast/slow/redistribution pointer-views (redistribution takes
    /// priority over fast) and sizes the probability table to the slow partition.
    #[must_use]
    pub fn new(processes: Vec<Process>) -> Self {
        let mut fast = Vec::new();
        let mut slow = Vec::new();
        let mut redistribution = Vec::new();

        for (i, process) in processes.iter().enumerate() {
            if process.is_redistribution() {
                redistribution.push(i);
            } else if process.is_fast() {
                fast.push(i);
            } else {
                slow.push(i);
            }
        }

        let probability_table = Vec::with_capacity(slow.len());
        Self {
            processes,
            fast,
            slow,
            redistribution,
            probability_table,
            picked_index: None,
        }
    }

    /// Every owned process, in construction order.
    #[must_use]
    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    /// Mutable access to every owned process; used by the matcher to update per-process site
    /// lists.
    pub fn processes_mut(&mut self) -> &mut [Process] {
        &mut self.processes
    }

    /// Stable indices of the fast processes.
    #[must_use]
    pub fn fast_indices(&self) -> &[usize] {
        &self.fast
    }

    /// Stable indices of the slow processes (the ones selected by [`Self::pick_process_index`]).
    #[must_use]
    pub fn slow_indices(&self) -> &[usize] {
        &self.slow
    }

    /// Stable indices of the redistribution processes.
    #[must_use]
    pub fn redistribution_indices(&self) -> &[usize] {
        &self.redistribution
    }

    /// Maximum process range, at least 1 (a zero-range halo would never rematch anything).
    #[must_use]
    pub fn max_range(&self) -> usize {
        self.processes.iter().map(Process::range).max().unwrap_or(1).max(1)
    }

    /// Implicit-wildcard expansion (§4.5): for every process with exactly one basis site,
    /// widens its match list to cover every point the configuration's central-cell neighbourhood
    /// sees, inserting wildcard entries where the process itself declares nothing. Processes
    /// with more than one basis site are left as constructed.
    pub fn update_process_match_lists(&mut self, configuration: &Configuration, lattice_map: &LatticeMap) {
        let repetitions = lattice_map.repetitions();
        let central_cell = (repetitions[0] / 2, repetitions[1] / 2, repetitions[2] / 2);

        for process in &mut self.processes {
            let [basis] = process.basis_sites() else {
                continue;
            };
            let central_indices = lattice_map.indices_from_cell(central_cell.0, central_cell.1, central_cell.2);
            let origin = central_indices[*basis];
            let full_neighbourhood = configuration.match_list_at(origin);
            expand_with_wildcards(process, full_neighbourhood);
        }
    }

    /// Rebuilds the cumulative probability table over the slow partition: `(running total rate,
    /// n_sites)` pairs, one per slow process in partition order.
    pub fn update_probability_table(&mut self) {
        self.probability_table.clear();
        let mut cumulative = 0.0;
        for &i in &self.slow {
            cumulative += self.processes[i].total_rate();
            self.probability_table.push((cumulative, self.processes[i].sites().len()));
        }
    }

    /// Recomputes nothing by itself: every process's site list is already kept live by the
    /// matcher's `add_site`/`remove_site` calls. Exists so the orchestrator's construction and
    /// step sequence can name this step explicitly, matching the source's call order.
    pub const fn update_process_available_sites(&self) {}

    /// Total rate across the slow partition: the last prefix value, or `0.0` if there are no
    /// slow processes.
    #[must_use]
    pub fn total_rate(&self) -> f64 {
        self.probability_table.last().map_or(0.0, |&(cumulative, _)| cumulative)
    }

    /// Draws `U ~ Uniform[0, total_rate())` and returns the slow-partition index of the first
    /// process whose cumulative rate is at least `U` and which has at least one listed site
    /// (zero-site entries are treated as having infinite cumulative rate and are skipped).
    ///
    /// Returns `None` if the total rate is zero. The chosen index is cached and retrievable via
    /// [`Self::picked_index`].
    pub fn pick_process_index(&mut self, rng: &mut RandomStream) -> Option<usize> {
        let total = self.total_rate();
        if total <= 0.0 {
            self.picked_index = None;
            return None;
        }

        let u = rng.uniform() * total;
        let mut idx = self.probability_table.partition_point(|&(cumulative, _)| cumulative < u);
        while idx < self.probability_table.len() && self.probability_table[idx].1 == 0 {
            idx += 1;
        }
        let idx = idx.min(self.probability_table.len() - 1);

        self.picked_index = Some(idx);
        Some(idx)
    }

    /// The slow-partition index chosen by the most recent [`Self::pick_process_index`] call.
    #[must_use]
    pub const fn picked_index(&self) -> Option<usize> {
        self.picked_index
    }

    /// The process chosen by the most recent [`Self::pick_process_index`] call.
    #[must_use]
    pub fn picked_process(&self) -> Option<&Process> {
        self.picked_index.map(|idx| &self.processes[self.slow[idx]])
    }

    /// Sum of listed sites across every owned process.
    #[must_use]
    pub fn total_available_sites(&self) -> usize {
        self.processes.iter().map(|p| p.sites().len()).sum()
    }

    /// Listed-site count for each owned process, in construction order.
    #[must_use]
    pub fn process_available_sites(&self) -> Vec<usize> {
        self.processes.iter().map(|p| p.sites().len()).collect()
    }

    /// Flat list of species names placed by the redistribution processes.
    #[must_use]
    pub fn redist_species(&self) -> Vec<String> {
        self.redistribution
            .iter()
            .filter_map(|&i| self.processes[i].redist_species())
            .map(str::to_string)
            .collect()
    }
}

/// Merge-walks `process`'s match list against `full_neighbourhood` (both sorted per
/// `entry_cmp`), inserting a wildcard entry wherever the neighbourhood has a point the process
/// does not cover, then rewrites `process`'s `id_moves` through the insertion-time old→new index
/// map (§9: apply the map in a second pass, don't interleave with insertion).
fn expand_with_wildcards(process: &mut Process, full_neighbourhood: &MatchList<super::match_list::ConfigMatchListEntry>) {
    let old_entries: Vec<ProcessMatchListEntry> = process.match_list().entries().to_vec();
    let mut new_entries = Vec::with_capacity(full_neighbourhood.len().max(old_entries.len()));
    let mut old_to_new = vec![0usize; old_entries.len()];
    let mut oi = 0;

    for step in itertools::merge_join_by(&old_entries, full_neighbourhood.entries(), |old, neighbour| {
        entry_cmp(*old, *neighbour)
    }) {
        match step {
            EitherOrBoth::Both(old, _) | EitherOrBoth::Left(old) => {
                old_to_new[oi] = new_entries.len();
                new_entries.push(*old);
                oi += 1;
            }
            EitherOrBoth::Right(neighbour) => {
                new_entries.push(ProcessMatchListEntry::wildcard(neighbour.distance, neighbour.coordinate));
            }
        }
    }

    *process.match_list_mut() = MatchList::new(new_entries);

    let new_id_moves: Vec<(usize, usize)> = process
        .id_moves()
        .iter()
        .map(|&(from, to)| (old_to_new[from], old_to_new[to]))
        .collect();
    process.set_id_moves(new_id_moves);
}
