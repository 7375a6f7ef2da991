//! The Matcher: stateless routines that keep each [`Process`]'s listed sites in sync with the
//! current [`Configuration`], and the fast/slow species classification pass.
//!
//! Every function here takes its dependencies explicitly (§4.4); nothing is cached on the
//! matcher itself.

use super::configuration::Configuration;
use super::interactions::Interactions;
use super::lattice_map::LatticeMap;
use super::match_list::{merge_same_point, whatever_match, WILDCARD};
use super::process::Process;
use super::rate::{RateCallback, RateRequest};
use super::sites_map::SitesMap;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

/// One classified outcome from [`calculate_matching`]'s partition step.
enum Task {
    Remove(usize, usize),
    Update(usize, usize),
    Add(usize, usize),
    Discard,
}

/// Produces candidate `(site_index, process_index)` pairs: `process_index` indexes into
/// `processes`, restricted to the positions listed in `process_indices`.
///
/// A pair survives two filters, in order: the site's basis position must be one of the
/// process's `basis_sites`, and — if the process declares site types — the process's
/// `site_pattern` must [`whatever_match`] the sitesmap's cached neighbourhood at that site. Every
/// site visited by a surviving candidate has its configuration match list lazily refreshed via
/// [`Configuration::update_match_list`], exactly once.
#[must_use]
pub fn index_process_to_match(
    processes: &[Process],
    process_indices: &[usize],
    configuration: &mut Configuration,
    sitesmap: &SitesMap,
    lattice_map: &LatticeMap,
    indices: &[usize],
) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let mut refreshed: FxHashSet<usize> = FxHashSet::default();

    for &site in indices {
        let (_, _, _, basis) = lattice_map.index_to_cell(site);

        for &p in process_indices {
            let process = &processes[p];
            if !process.basis_sites().contains(&basis) {
                continue;
            }
            if let Some(site_pattern) = process.site_pattern() {
                if !whatever_match(site_pattern, sitesmap.match_list_at(site)) {
                    continue;
                }
            }

            if refreshed.insert(site) {
                configuration.update_match_list(site);
            }
            pairs.push((site, p));
        }
    }

    pairs
}

/// The central refresh routine (§4.4): re-derives every process's listed sites over `indices`.
///
/// Builds candidate pairs over every owned process, partitions each into REMOVE/UPDATE/ADD/
/// discard by combining the process's current "is listed" flag with a fresh [`whatever_match`]
/// test, then applies REMOVE, then UPDATE (as remove-then-add), then ADD, in that order — this
/// keeps at most one presence flag per (site, process) live at any point during the pass.
///
/// `rate_callback` is consulted only for processes with a custom rate model; pass `None` when no
/// process in `interactions` uses one.
pub fn calculate_matching(
    interactions: &mut Interactions,
    configuration: &mut Configuration,
    sitesmap: &SitesMap,
    lattice_map: &LatticeMap,
    indices: &[usize],
    mut rate_callback: Option<&mut dyn RateCallback>,
) {
    let all_process_indices: Vec<usize> = (0..interactions.processes().len()).collect();
    let pairs = index_process_to_match(
        interactions.processes(),
        &all_process_indices,
        configuration,
        sitesmap,
        lattice_map,
        indices,
    );

    // §5's match-task partitioning seam: classifying a pair only reads `interactions` and
    // `configuration`, so this can run across a worker pool; `par_iter().map().collect()` keeps
    // the result ordered by pair index rather than by worker completion order.
    let tasks: Vec<Task> = pairs
        .par_iter()
        .map(|&(site, p)| {
            let process = &interactions.processes()[p];
            let was_in = process.is_listed(site);
            let now_match = whatever_match(process.match_list(), configuration.match_list_at(site));

            match (was_in, now_match) {
                (true, false) => Task::Remove(site, p),
                (true, true) => Task::Update(site, p),
                (false, true) => Task::Add(site, p),
                (false, false) => Task::Discard,
            }
        })
        .collect();

    let mut removes = Vec::new();
    let mut updates = Vec::new();
    let mut adds = Vec::new();

    for task in tasks {
        match task {
            Task::Remove(site, p) => removes.push((site, p)),
            Task::Update(site, p) => updates.push((site, p)),
            Task::Add(site, p) => adds.push((site, p)),
            Task::Discard => {}
        }
    }

    for (site, p) in removes {
        interactions.processes_mut()[p].remove_site(site);
    }

    for (site, p) in updates {
        let rate = compute_rate(&interactions.processes()[p], site, configuration, &mut rate_callback);
        let process = &mut interactions.processes_mut()[p];
        process.remove_site(site);
        process.add_site(site, rate);
    }

    for (site, p) in adds {
        let rate = compute_rate(&interactions.processes()[p], site, configuration, &mut rate_callback);
        interactions.processes_mut()[p].add_site(site, rate);
    }
}

fn compute_rate(
    process: &Process,
    site: usize,
    configuration: &Configuration,
    rate_callback: &mut Option<&mut dyn RateCallback>,
) -> f64 {
    if !process.has_custom_rate() {
        return 0.0;
    }
    rate_callback
        .as_mut()
        .map_or(0.0, |cb| update_single_rate(site, process, configuration, &mut **cb))
}

/// Marks a species as fast iff, at some site it currently occupies, it sits at a mutating
/// position (`match_type != update_type`) in a FAST process's local pattern that is genuinely
/// listed there.
///
/// Resets every `slow_flags` entry via [`Configuration::reset_slow_flags`], walks only the
/// fast-process candidate pairs over `indices`, then forces `slow_flags[j] = true` for every `j`
/// in `forced_slow_indices`.
pub fn classify_configuration(
    interactions: &Interactions,
    configuration: &mut Configuration,
    sitesmap: &SitesMap,
    lattice_map: &LatticeMap,
    indices: &[usize],
    fast_elements: &[String],
    forced_slow_indices: &[usize],
) {
    configuration.reset_slow_flags(fast_elements);

    let pairs = index_process_to_match(
        interactions.processes(),
        interactions.fast_indices(),
        configuration,
        sitesmap,
        lattice_map,
        indices,
    );

    for (site, p) in pairs {
        let process = &interactions.processes()[p];
        if !process.is_listed(site) {
            continue;
        }

        let config_list = configuration.match_list_at(site).clone();
        for (p_idx, o_idx) in merge_same_point(process.match_list(), &config_list) {
            let process_entry = process.match_list().entries()[p_idx];
            if process_entry.match_type != process_entry.update_type {
                let config_index = config_list.entries()[o_idx].index;
                configuration.update_slow_flag(config_index, false);
            }
        }
    }

    for &j in forced_slow_indices {
        configuration.update_slow_flag(j, true);
    }
}

/// Gathers `process`'s sub-match-list within its cutoff at `site`, builds the `types_before`/
/// `types_after` vectors and the flat geometry, and invokes `rate_callback` for the resulting
/// rate.
#[must_use]
pub fn update_single_rate(
    site: usize,
    process: &Process,
    configuration: &Configuration,
    rate_callback: &mut dyn RateCallback,
) -> f64 {
    let config_list = configuration.match_list_at(site);
    let cutoff = process.cutoff();

    let mut geometry = Vec::new();
    let mut types_before = Vec::new();
    let mut types_after = Vec::new();

    for (p_idx, o_idx) in merge_same_point(process.match_list(), config_list) {
        let config_entry = config_list.entries()[o_idx];
        if config_entry.distance > cutoff {
            continue;
        }

        geometry.extend_from_slice(&config_entry.coordinate.to_array());
        types_before.push(config_entry.match_type);

        let process_entry = process.match_list().entries()[p_idx];
        let after = if process_entry.update_type > WILDCARD {
            process_entry.update_type
        } else {
            config_entry.match_type
        };
        types_after.push(after);
    }

    rate_callback.rate(RateRequest {
        geometry: &geometry,
        types_before: &types_before,
        types_after: &types_after,
        base_rate: process.base_rate(),
        process_number: process.process_number(),
        origin: configuration.coordinates()[site],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::Coordinate;
    use crate::process::test_support::hop_process;
    use rustc_hash::FxHashMap;

    fn possible_types() -> FxHashMap<String, u32> {
        let mut map = FxHashMap::default();
        map.insert("*".to_string(), 0);
        map.insert("A".to_string(), 1);
        map.insert("B".to_string(), 2);
        map
    }

    fn line_setup(elements: Vec<&str>) -> (LatticeMap, Configuration, SitesMap) {
        let n = elements.len();
        let lattice_map = LatticeMap::new(1, [n, 1, 1], [true, false, false]);
        let coordinates: Vec<Coordinate> = (0..n).map(|i| Coordinate::new(i as f64, 0.0, 0.0)).collect();
        let mut configuration = Configuration::new(
            coordinates.clone(),
            elements.into_iter().map(str::to_string).collect(),
            possible_types(),
        )
        .unwrap();
        configuration.init_match_lists(&lattice_map, 1);

        let mut sitesmap = SitesMap::new(vec![0; n]);
        sitesmap.init_match_lists(&lattice_map, &coordinates, 1);

        (lattice_map, configuration, sitesmap)
    }

    #[test]
    fn index_process_to_match_filters_by_basis() {
        let (lattice_map, mut configuration, sitesmap) = line_setup(vec!["A", "*", "A", "*"]);
        let process = hop_process(&possible_types(), vec![0]);

        let pairs = index_process_to_match(
            std::slice::from_ref(&process),
            &[0],
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &[0, 1, 2, 3],
        );

        // single-basis lattice: every site is basis 0, so every site is a candidate.
        assert_eq!(pairs.len(), 4);
    }

    #[test]
    fn calculate_matching_adds_and_removes_sites() {
        let (lattice_map, mut configuration, sitesmap) = line_setup(vec!["A", "*", "A", "*"]);
        let process = hop_process(&possible_types(), vec![0]);
        let mut interactions = Interactions::new(vec![process]);

        calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &[0, 1, 2, 3],
            None,
        );
        assert_eq!(interactions.processes()[0].sites(), &[0, 2]);

        // flip site 0 from A to *, so it no longer matches; site 1 stays unrelated.
        configuration.perform_process(&interactions.processes()[0].clone(), 0);
        calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &[0, 1, 2, 3],
            None,
        );
        assert!(!interactions.processes()[0].is_listed(0));
        assert!(interactions.processes()[0].is_listed(2));
    }

    #[test]
    fn classify_configuration_marks_matched_footprint_fast() {
        // only site 0 matches the hop pattern ("A" followed by "*"); sites 2.. are "B" and never
        // appear in any candidate pair at all.
        let (lattice_map, mut configuration, sitesmap) = line_setup(vec!["A", "*", "B", "B", "B", "B"]);
        let fast_process = hop_process(&possible_types(), vec![0]).with_fast(true);
        let mut interactions = Interactions::new(vec![fast_process]);

        calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &(0..6).collect::<Vec<_>>(),
            None,
        );
        assert_eq!(interactions.processes()[0].sites(), &[0]);

        classify_configuration(
            &interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &(0..6).collect::<Vec<_>>(),
            &[],
            &[],
        );

        // both the origin and the destination of the one listed hop become non-slow.
        assert!(!configuration.slow_flags()[0]);
        assert!(!configuration.slow_flags()[1]);
        // sites untouched by any matched fast process stay slow.
        assert!(configuration.slow_flags()[2]);
        assert!(configuration.slow_flags()[5]);
    }

    #[test]
    fn classify_configuration_honours_forced_slow_indices() {
        let (lattice_map, mut configuration, sitesmap) = line_setup(vec!["A", "*", "A", "*"]);
        let fast_process = hop_process(&possible_types(), vec![0]).with_fast(true);
        let mut interactions = Interactions::new(vec![fast_process]);

        calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &[0, 1, 2, 3],
            None,
        );
        classify_configuration(
            &interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &[0, 1, 2, 3],
            &[],
            &[0],
        );

        assert!(configuration.slow_flags()[0]);
    }

    /// A two-basis 3x3x3 lattice (54 sites) with four fast A/V and B/V upward-hop diffusions and
    /// one slow A+B annihilation: only the two sites touched by a listed fast hop (the A at index
    /// 0 and the B at index 1) should come out of classification still marked slow.
    #[test]
    fn classify_configuration_two_basis_lattice() {
        let mut possible_types = possible_types();
        possible_types.insert("V".to_string(), 3);

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

        let mut elements = vec!["V".to_string(); 54];
        elements[0] = "A".to_string();
        elements[1] = "B".to_string();
        elements[2] = "A".to_string();
        elements[3] = "B".to_string();
        elements[18] = "B".to_string();
        elements[36] = "A".to_string();

        let mut configuration = Configuration::new(coordinates.clone(), elements, possible_types.clone()).unwrap();
        configuration.init_match_lists(&lattice_map, 1);

        let mut sitesmap = SitesMap::new(vec![0; 54]);
        sitesmap.init_match_lists(&lattice_map, &coordinates, 1);

        let hop = |elements1: [&str; 2], elements2: [&str; 2], basis_site: usize| {
            let coords = vec![Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(0.0, 0.0, 1.0)];
            let before =
                Configuration::new(coords.clone(), elements1.map(str::to_string).to_vec(), possible_types.clone())
                    .unwrap();
            let after =
                Configuration::new(coords, elements2.map(str::to_string).to_vec(), possible_types.clone()).unwrap();
            Process::new(
                0,
                before,
                after,
                1.0,
                vec![basis_site],
                vec![(0, Coordinate::new(0.0, 0.0, 1.0))],
                None,
            )
            .unwrap()
            .with_fast(true)
        };

        let annihilation = {
            let coords = vec![Coordinate::new(0.0, 0.0, 0.0), Coordinate::new(0.5, 0.5, 0.5)];
            let before =
                Configuration::new(coords.clone(), vec!["A".to_string(), "B".to_string()], possible_types.clone())
                    .unwrap();
            let after =
                Configuration::new(coords, vec!["V".to_string(), "V".to_string()], possible_types.clone()).unwrap();
            Process::new(0, before, after, 1.0, vec![0], vec![], None).unwrap()
        };

        let mut interactions = Interactions::new(vec![
            hop(["A", "V"], ["V", "A"], 0),
            hop(["A", "V"], ["V", "A"], 1),
            hop(["B", "V"], ["V", "B"], 0),
            hop(["B", "V"], ["V", "B"], 1),
            annihilation,
        ]);
        let all_indices: Vec<usize> = (0..54).collect();

        calculate_matching(
            &mut interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &all_indices,
            None,
        );
        classify_configuration(
            &interactions,
            &mut configuration,
            &sitesmap,
            &lattice_map,
            &all_indices,
            &["V".to_string()],
            &[],
        );

        // sites 0 ("A") and 1 ("B") have no "V" one cell up, so no fast hop ever matches there:
        // both stay slow even though they carry the same species the fast processes move.
        assert!(configuration.slow_flags()[0]);
        assert!(configuration.slow_flags()[1]);
        // index 18 ("B" at basis 0) does have a vacancy one cell up and is matched and cleared.
        assert!(!configuration.slow_flags()[18]);
    }
}
