//! [`LatticeModel`]: composes [`Configuration`], [`SitesMap`], [`Interactions`] and a shared
//! [`RandomStream`] into the full event-driven step loop (§4.7).

use super::configuration::Configuration;
use super::distributor::{self, AcceptancePolicy, ConstrainedRandomDistributor};
use super::error::Result;
use super::interactions::Interactions;
use super::lattice_map::LatticeMap;
use super::matcher::{calculate_matching, classify_configuration};
use super::random::RandomStream;
use super::rate::RateCallback;
use super::simulation_timer::SimulationTimer;
use super::sites_map::SitesMap;

/// The full simulation state: configuration, topology, processes, clock and pseudo-random
/// stream, all advanced together by [`Self::single_step`].
pub struct LatticeModel {
    configuration: Configuration,
    sitesmap: SitesMap,
    interactions: Interactions,
    lattice_map: LatticeMap,
    timer: SimulationTimer,
    rng: RandomStream,
}

impl LatticeModel {
    /// Assembles a model and runs its one-time construction sequence (§4.7):
    /// `configuration`/`sitesmap` cache their neighbourhoods out to `interactions.max_range()`,
    /// `interactions` expands its processes' implicit wildcards, every site is matched once, and
    /// the probability table is built.
    pub fn new(
        mut configuration: Configuration,
        mut sitesmap: SitesMap,
        mut interactions: Interactions,
        lattice_map: LatticeMap,
        rng: RandomStream,
        rate_callback: Option<&mut dyn RateCallback>,
    ) -> Self {
        let max_range = interactions.max_range();
        configuration.init_match_lists(&lattice_map, max_range);
        sitesmap.init_match_lists(&lattice_map, configuration.coordinates(), max_range);
        interactions.update_process_match_lists(&configuration, &lattice_map);

        let all_indices: Vec<usize> = (0..configuration.n_sites()).collect();
        calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &all_indices,
            rate_callback,
        );
        interactions.update_probability_table();
        interactions.update_process_available_sites();

        Self {
            configuration,
            sitesmap,
            interactions,
            lattice_map,
            timer: SimulationTimer::new(),
            rng,
        }
    }

    /// The current lattice state.
    #[must_use]
    pub const fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// The owned processes and their selection bookkeeping.
    #[must_use]
    pub const fn interactions(&self) -> &Interactions {
        &self.interactions
    }

    /// Current simulated time.
    #[must_use]
    pub const fn simulation_time(&self) -> f64 {
        self.timer.simulation_time()
    }

    /// The elapsed time drawn by the most recent [`Self::single_step`] call.
    #[must_use]
    pub const fn delta_time(&self) -> f64 {
        self.timer.delta_time()
    }

    /// Current total rate across the slow-process partition.
    #[must_use]
    pub fn total_rate(&self) -> f64 {
        self.interactions.total_rate()
    }

    /// Picks a process, picks a site within it, applies it, propagates time, and rematches the
    /// affected neighbourhood out to `interactions.max_range()` shells.
    ///
    /// Returns the site the applied process fired at, or `None` if the total rate is zero (a
    /// legal no-op step per §7; callers should not normally call this when the total rate is
    /// zero, since no time would meaningfully elapse).
    pub fn single_step(&mut self, rate_callback: Option<&mut dyn RateCallback>) -> Option<usize> {
        let total_rate = self.interactions.total_rate();
        if total_rate <= 0.0 {
            return None;
        }

        let process_idx = self.interactions.pick_process_index(&mut self.rng)?;
        let process = self.interactions.processes()[self.interactions.slow_indices()[process_idx]].clone();
        let site = process.pick_site(&mut self.rng);

        self.configuration.perform_process(&process, site);
        self.timer.propagate(total_rate, &mut self.rng);

        let (affected_indices, _, _, n_moved) = self.configuration.last_move();
        let touched = affected_indices[..n_moved].to_vec();
        let rematch_indices = self.lattice_map.superset_neighbour_indices(&touched, self.interactions.max_range());

        calculate_matching(
            &mut self.interactions,
            &mut self.configuration,
            &self.sitesmap,
            &self.lattice_map,
            &rematch_indices,
            rate_callback,
        );
        self.interactions.update_probability_table();
        self.interactions.update_process_available_sites();

        Some(site)
    }

    /// Classifies fast species (via [`classify_configuration`]), runs `distributor` over the
    /// configuration, and rematches the affected neighbourhoods.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidSplit`](crate::error::Error::InvalidSplit) from the
    /// distributor's underlying [`Configuration::split`] call.
    pub fn redistribute<P: AcceptancePolicy>(
        &mut self,
        distributor: &mut ConstrainedRandomDistributor<P>,
        fast_elements: &[String],
        forced_slow_indices: &[usize],
        x: usize,
        y: usize,
        z: usize,
    ) -> Result<Vec<usize>> {
        let all_indices: Vec<usize> = (0..self.configuration.n_sites()).collect();
        classify_configuration(
            &self.interactions,
            &mut self.configuration,
            &self.sitesmap,
            &self.lattice_map,
            &all_indices,
            fast_elements,
            forced_slow_indices,
        );

        let affected = distributor.redistribute(&mut self.configuration, &self.lattice_map, x, y, z, &mut self.rng)?;
        self.rematch_and_recount(&affected);

        Ok(affected)
    }

    /// Like [`Self::redistribute`], but places extracted fast species at sites chosen by
    /// [`distributor::scatter_species`] so placement respects reaction topology instead of
    /// landing anywhere in a sub-lattice tile.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::RedistributionStuck`](crate::error::Error::RedistributionStuck) if
    /// some extracted species cannot be placed within `max_attempts` tries.
    pub fn process_redistribute(
        &mut self,
        replace_species: &str,
        fast_elements: &[String],
        forced_slow_indices: &[usize],
        max_attempts: usize,
    ) -> Result<Vec<usize>> {
        let all_indices: Vec<usize> = (0..self.configuration.n_sites()).collect();
        classify_configuration(
            &self.interactions,
            &mut self.configuration,
            &self.sitesmap,
            &self.lattice_map,
            &all_indices,
            fast_elements,
            forced_slow_indices,
        );

        let affected = distributor::process_redistribute(
            &mut self.configuration,
            &mut self.interactions,
            &self.sitesmap,
            &self.lattice_map,
            fast_elements,
            replace_species,
            &mut self.rng,
            max_attempts,
        )?;

        self.interactions.update_probability_table();
        Ok(affected)
    }

    fn rematch_and_recount(&mut self, affected: &[usize]) {
        let rematch_indices = self.lattice_map.superset_neighbour_indices(affected, self.interactions.max_range());
        calculate_matching(
            &mut self.interactions,
            &mut self.configuration,
            &self.sitesmap,
            &self.lattice_map,
            &rematch_indices,
            None,
        );
        self.interactions.update_probability_table();
    }
}
