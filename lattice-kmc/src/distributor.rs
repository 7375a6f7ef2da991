//! The Distributor: plain random reshuffling of fast species, process-aware scatter placement,
//! and sub-lattice-constrained redistribution with optional Metropolis acceptance.

use super::configuration::{Configuration, SubConfiguration};
use super::error::{Error, Result};
use super::interactions::Interactions;
use super::lattice_map::LatticeMap;
use super::matcher::calculate_matching;
use super::random::RandomStream;
use super::sites_map::SitesMap;

/// Identifies every site currently flagged fast (`!slow_flags[i]`), gathers their `(type,
/// atom_id, element)` triples, draws a random permutation of those slots, and writes the
/// permuted values back via [`Configuration`]'s mutation façade.
///
/// Returns the global indices that were shuffled (possibly empty, if fewer than two sites are
/// fast).
pub fn redistribute(configuration: &mut Configuration, rng: &mut RandomStream) -> Vec<usize> {
    let fast_indices: Vec<usize> = (0..configuration.n_sites())
        .filter(|&i| !configuration.slow_flags()[i])
        .collect();
    if fast_indices.len() < 2 {
        return fast_indices;
    }

    let types: Vec<u32> = fast_indices.iter().map(|&i| configuration.types()[i]).collect();
    let atom_ids: Vec<usize> = fast_indices.iter().map(|&i| configuration.atom_id()[i]).collect();
    let elements: Vec<String> = fast_indices.iter().map(|&i| configuration.elements()[i].clone()).collect();

    let mut permutation: Vec<usize> = (0..fast_indices.len()).collect();
    rng.shuffle(&mut permutation);

    let updates: Vec<(usize, u32, usize, String)> = fast_indices
        .iter()
        .zip(&permutation)
        .map(|(&site, &slot)| (site, types[slot], atom_ids[slot], elements[slot].clone()))
        .collect();
    configuration.bulk_overwrite(&updates);

    fast_indices
}

/// Extracts the species currently occupying `fast_elements`-matching sites (temporarily voiding
/// them with `replace_species`), rematches the affected neighbourhood, then places each
/// extracted species at a site chosen by [`scatter_species`], rematching after each placement.
///
/// Returns the sorted, deduplicated list of every global index touched.
///
/// # Errors
///
/// Propagates [`Error::RedistributionStuck`] from [`scatter_species`] if some extracted species
/// cannot be placed within `max_attempts` tries.
pub fn process_redistribute(
    configuration: &mut Configuration,
    interactions: &mut Interactions,
    sitesmap: &SitesMap,
    lattice_map: &LatticeMap,
    fast_elements: &[String],
    replace_species: &str,
    rng: &mut RandomStream,
    max_attempts: usize,
) -> Result<Vec<usize>> {
    let (species_list, origin_indices) = configuration.extract_fast_species(fast_elements, replace_species);
    if species_list.is_empty() {
        return Ok(Vec::new());
    }

    let max_range = interactions.max_range();
    let neighbourhood = lattice_map.superset_neighbour_indices(&origin_indices, max_range);
    calculate_matching(interactions, configuration, sitesmap, lattice_map, &neighbourhood, None);

    let mut affected = origin_indices;
    for species in species_list {
        let site = scatter_species(&species, configuration, interactions, rng, max_attempts)?;
        affected.push(site);

        let local_neighbourhood = lattice_map.neighbour_indices(site, max_range);
        calculate_matching(interactions, configuration, sitesmap, lattice_map, &local_neighbourhood, None);
    }

    affected.sort_unstable();
    affected.dedup();
    Ok(affected)
}

/// Tries shuffled candidate sites (bounded to `max_attempts`) against shuffled candidate
/// redistribution processes until one whose `redist_species` equals `species` is found listed at
/// that site; applies the process there and returns the site.
///
/// Order of both the candidate sites and the candidate processes is independently shuffled, per
/// the source's `scatterSpecies` routine.
///
/// # Errors
///
/// Returns [`Error::RedistributionStuck`] if no accepting site is found within `max_attempts`.
pub fn scatter_species(
    species: &str,
    configuration: &mut Configuration,
    interactions: &Interactions,
    rng: &mut RandomStream,
    max_attempts: usize,
) -> Result<usize> {
    let mut candidate_sites: Vec<usize> = (0..configuration.n_sites()).collect();
    rng.shuffle(&mut candidate_sites);
    candidate_sites.truncate(max_attempts.min(candidate_sites.len()));

    let mut candidate_processes = interactions.redistribution_indices().to_vec();
    rng.shuffle(&mut candidate_processes);

    for &site in &candidate_sites {
        for &p in &candidate_processes {
            let process = &interactions.processes()[p];
            if process.redist_species() == Some(species) && process.is_listed(site) {
                configuration.perform_process(process, site);
                return Ok(site);
            }
        }
    }

    Err(Error::RedistributionStuck {
        species: species.to_string(),
        attempts: candidate_sites.len(),
    })
}

/// Computes a local energy and decides whether a proposed reshuffle should be accepted, so the
/// core itself does not bind a particular chemistry (§9).
pub trait AcceptancePolicy {
    /// Local energy of the elements present at a fixed local-neighbourhood pattern, in whatever
    /// units this policy's [`Self::accept`] expects.
    fn energy(&mut self, elements: &[String]) -> f64;

    /// `true` iff a proposed move from energy `before` to `after` should be accepted.
    fn accept(&mut self, before: f64, after: f64, rng: &mut RandomStream) -> bool;
}

/// A concrete [`AcceptancePolicy`] with the source's original hard-coded pairwise coefficients:
/// an O-C neighbour contributes `o_c_coefficient`, a C-C neighbour contributes `c_c_coefficient`,
/// and acceptance above `ΔE = 0` follows `exp(-ΔE / (k_B · temperature))`.
#[derive(Clone, Copy, Debug)]
pub struct PairwiseAcceptancePolicy {
    /// Energy contribution of an O-C neighbour pair.
    pub o_c_coefficient: f64,
    /// Energy contribution of a C-C neighbour pair.
    pub c_c_coefficient: f64,
    /// Temperature, in kelvin, used by the Metropolis test.
    pub temperature: f64,
}

impl Default for PairwiseAcceptancePolicy {
    fn default() -> Self {
        Self {
            o_c_coefficient: 0.18,
            c_c_coefficient: 0.08,
            temperature: 500.0,
        }
    }
}

/// Boltzmann constant in eV/K.
const BOLTZMANN_EV_PER_KELVIN: f64 = 8.617_333_262e-5;

impl AcceptancePolicy for PairwiseAcceptancePolicy {
    fn energy(&mut self, elements: &[String]) -> f64 {
        let mut total = 0.0;
        for i in 0..elements.len() {
            for j in (i + 1)..elements.len() {
                total += match (elements[i].as_str(), elements[j].as_str()) {
                    ("O", "C") | ("C", "O") => self.o_c_coefficient,
                    ("C", "C") => self.c_c_coefficient,
                    _ => 0.0,
                };
            }
        }
        total
    }

    fn accept(&mut self, before: f64, after: f64, rng: &mut RandomStream) -> bool {
        let delta = after - before;
        if delta <= 0.0 {
            return true;
        }
        let probability = (-delta / (BOLTZMANN_EV_PER_KELVIN * self.temperature)).exp();
        rng.uniform() < probability
    }
}

/// Splits a configuration into sub-lattice tiles and redistributes each independently, optionally
/// gated by an [`AcceptancePolicy`] (the "extends Random" distributor of §4.6).
pub struct ConstrainedRandomDistributor<P> {
    policy: Option<P>,
    env_local_indices: Vec<usize>,
}

impl<P: AcceptancePolicy> ConstrainedRandomDistributor<P> {
    /// Constructs a distributor. `env_local_indices` names the local (tile-relative) indices
    /// whose elements feed `policy.energy()`; ignored when `policy` is `None`.
    #[must_use]
    pub const fn new(policy: Option<P>, env_local_indices: Vec<usize>) -> Self {
        Self { policy, env_local_indices }
    }

    /// Splits `configuration` into `x * y * z` tiles, reshuffles every tile's local sites
    /// independently, and writes each accepted tile back via
    /// [`Configuration::update_local_from_sub_config`].
    ///
    /// With no policy, every reshuffle is accepted. With a policy, a snapshot of each tile is
    /// kept and the reshuffle is reverted (contributing nothing to the returned indices) when
    /// `policy.accept` rejects it — a legal empty result per §7.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::InvalidSplit`] from [`Configuration::split`].
    pub fn redistribute(
        &mut self,
        configuration: &mut Configuration,
        lattice_map: &LatticeMap,
        x: usize,
        y: usize,
        z: usize,
        rng: &mut RandomStream,
    ) -> Result<Vec<usize>> {
        let subs = configuration.split(lattice_map, x, y, z)?;
        let mut affected = Vec::new();

        for mut sub in subs {
            let n_local = sub.types().len();
            if n_local < 2 {
                continue;
            }

            let snapshot = sub.clone();
            let mut permutation: Vec<usize> = (0..n_local).collect();
            rng.shuffle(&mut permutation);
            apply_permutation(&mut sub, &permutation);

            let env_local_indices = &self.env_local_indices;
            let accepted = self.policy.as_mut().map_or(true, |policy| {
                let before = policy.energy(&local_pattern_elements(&snapshot, env_local_indices));
                let after = policy.energy(&local_pattern_elements(&sub, env_local_indices));
                policy.accept(before, after, rng)
            });

            if accepted {
                configuration.update_local_from_sub_config(&sub);
                affected.extend_from_slice(sub.global_indices());
            }
        }

        affected.sort_unstable();
        affected.dedup();
        Ok(affected)
    }
}

fn apply_permutation(sub: &mut SubConfiguration, permutation: &[usize]) {
    let types: Vec<u32> = permutation.iter().map(|&slot| sub.types()[slot]).collect();
    let atom_ids: Vec<usize> = permutation.iter().map(|&slot| sub.atom_ids()[slot]).collect();
    let elements: Vec<String> = permutation.iter().map(|&slot| sub.elements()[slot].clone()).collect();

    sub.types_mut().copy_from_slice(&types);
    sub.atom_ids_mut().copy_from_slice(&atom_ids);
    sub.elements_mut().clone_from_slice(&elements);
}

fn local_pattern_elements(sub: &SubConfiguration, env_local_indices: &[usize]) -> Vec<String> {
    env_local_indices.iter().filter_map(|&i| sub.elements().get(i).cloned()).collect()
}
