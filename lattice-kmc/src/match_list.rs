//! Match-list entries and the sorted match lists built from them.
//!
//! Three flavors of entry exist — process, configuration and site — sharing a common
//! "geometric point" contract ([`GeometricEntry`]) instead of a common base type; see the design
//! notes for why inheritance was avoided here.

use super::coordinate::{Coordinate, EPSILON};
use float_cmp::approx_eq;
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Match-type value reserved for the wildcard: a process entry with this `match_type` matches
/// any configuration or site entry at the same point.
pub const WILDCARD: u32 = 0;

/// Common contract shared by every match-list entry flavor: a sortable point in the
/// neighbourhood of some origin site, tagged with a type.
pub trait GeometricEntry {
    /// Distance to the neighbourhood origin.
    fn distance(&self) -> f64;

    /// Origin-relative coordinate.
    fn coordinate(&self) -> Coordinate;

    /// Type tag: species for configuration/process entries, topology class for site entries.
    /// `0` is always the wildcard.
    fn match_type(&self) -> u32;
}

/// Entries sort primarily by `distance` (within [`EPSILON`]), and secondarily by the
/// reverse-lexicographic order of `coordinate` (§3): on a distance tie, the farther-in-reverse-
/// lex coordinate comes first.
#[must_use]
pub fn entry_cmp(a: &impl GeometricEntry, b: &impl GeometricEntry) -> Ordering {
    if approx_eq!(f64, a.distance(), b.distance(), epsilon = EPSILON) {
        a.coordinate().cmp(&b.coordinate())
    } else {
        a.distance().partial_cmp(&b.distance()).unwrap_or(Ordering::Equal)
    }
}

/// `true` iff `a` and `b` refer to the same lattice point: their distances agree within
/// [`EPSILON`] and each coordinate component agrees within [`EPSILON`].
#[must_use]
pub fn same_point(a: &impl GeometricEntry, b: &impl GeometricEntry) -> bool {
    approx_eq!(f64, a.distance(), b.distance(), epsilon = EPSILON) && a.coordinate().approx_eq(&b.coordinate())
}

/// `true` iff `left` and `right` are the [`same_point`] AND either `left`'s `match_type` is the
/// [`WILDCARD`] or the two match types are equal.
///
/// This is asymmetric: `left` is conventionally the process-side entry.
#[must_use]
pub fn type_match(left: &impl GeometricEntry, right: &impl GeometricEntry) -> bool {
    same_point(left, right) && (left.match_type() == WILDCARD || left.match_type() == right.match_type())
}

/// An integer cell-offset decomposition `(di, dj, dk, relative_basis)` describing how a
/// moving entry's destination is reached from its source, for use with
/// [`LatticeMap::index_from_move_info`](crate::lattice_map::LatticeMap::index_from_move_info).
pub type CellOffset = (i32, i32, i32, i32);

/// A point in a [`Process`](crate::process::Process)'s local pattern.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ProcessMatchListEntry {
    /// Species this entry must match before the process fires (`0` = wildcard).
    pub match_type: u32,
    /// Distance to the neighbourhood origin.
    pub distance: f64,
    /// Origin-relative coordinate.
    pub coordinate: Coordinate,
    /// Species this entry becomes after the process fires (`0` = no change).
    pub update_type: u32,
    /// The unwrapped displacement to apply to the moved atom's tracked coordinate, if this
    /// entry's occupant physically moves.
    pub move_coordinate: Option<Coordinate>,
    /// `true` iff `move_coordinate` is set. Kept as an explicit flag (rather than relying solely
    /// on the `Option`) to mirror the construction-time bookkeeping the core performs.
    pub has_move_coordinate: bool,
    /// Cell-offset decomposition of the move, if any.
    pub move_cell_offset: Option<CellOffset>,
}

impl ProcessMatchListEntry {
    /// Constructs a new process match-list entry.
    #[must_use]
    pub const fn new(match_type: u32, distance: f64, coordinate: Coordinate, update_type: u32) -> Self {
        Self {
            match_type,
            distance,
            coordinate,
            update_type,
            move_coordinate: None,
            has_move_coordinate: false,
            move_cell_offset: None,
        }
    }

    /// Attaches move information to this entry.
    #[must_use]
    pub const fn with_move(mut self, move_coordinate: Coordinate, cell_offset: CellOffset) -> Self {
        self.move_coordinate = Some(move_coordinate);
        self.has_move_coordinate = true;
        self.move_cell_offset = Some(cell_offset);
        self
    }

    /// A wildcard entry at `coordinate`/`distance`, with no update and no move: inserted during
    /// implicit-wildcard expansion (§4.5).
    #[must_use]
    pub const fn wildcard(distance: f64, coordinate: Coordinate) -> Self {
        Self::new(WILDCARD, distance, coordinate, WILDCARD)
    }
}

impl GeometricEntry for ProcessMatchListEntry {
    fn distance(&self) -> f64 {
        self.distance
    }

    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    fn match_type(&self) -> u32 {
        self.match_type
    }
}

/// A point in a [`Configuration`](crate::configuration::Configuration)'s cached per-site
/// neighbourhood.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct ConfigMatchListEntry {
    /// Current species at this point (`0` = wildcard/vacancy type, by convention of the
    /// possible-types map).
    pub match_type: u32,
    /// Distance to the neighbourhood origin.
    pub distance: f64,
    /// Origin-relative coordinate.
    pub coordinate: Coordinate,
    /// Global lattice site index this entry refers to.
    pub index: usize,
}

impl ConfigMatchListEntry {
    /// Constructs a new configuration match-list entry.
    #[must_use]
    pub const fn new(match_type: u32, distance: f64, coordinate: Coordinate, index: usize) -> Self {
        Self {
            match_type,
            distance,
            coordinate,
            index,
        }
    }
}

impl GeometricEntry for ConfigMatchListEntry {
    fn distance(&self) -> f64 {
        self.distance
    }

    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    fn match_type(&self) -> u32 {
        self.match_type
    }
}

/// A point in a [`SitesMap`](crate::sites_map::SitesMap)'s cached per-site neighbourhood.
///
/// Structurally identical to [`ConfigMatchListEntry`], but `match_type` encodes a site-topology
/// class rather than a species; kept as a distinct type so the two are never confused at a call
/// site.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SiteMatchListEntry {
    /// Site-topology class at this point.
    pub match_type: u32,
    /// Distance to the neighbourhood origin.
    pub distance: f64,
    /// Origin-relative coordinate.
    pub coordinate: Coordinate,
    /// Global lattice site index this entry refers to.
    pub index: usize,
}

impl SiteMatchListEntry {
    /// Constructs a new site match-list entry.
    #[must_use]
    pub const fn new(match_type: u32, distance: f64, coordinate: Coordinate, index: usize) -> Self {
        Self {
            match_type,
            distance,
            coordinate,
            index,
        }
    }
}

impl GeometricEntry for SiteMatchListEntry {
    fn distance(&self) -> f64 {
        self.distance
    }

    fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    fn match_type(&self) -> u32 {
        self.match_type
    }
}

/// A match list: a [`Vec`] of entries kept sorted per [`entry_cmp`] at all times.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct MatchList<E> {
    entries: Vec<E>,
}

impl<E: GeometricEntry> MatchList<E> {
    /// Constructs a match list from unsorted entries, sorting them immediately.
    #[must_use]
    pub fn new(mut entries: Vec<E>) -> Self {
        entries.sort_by(entry_cmp);
        Self { entries }
    }

    /// An empty match list.
    #[must_use]
    pub const fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// The entries, in sorted order.
    #[must_use]
    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    /// Mutable access to the entries. Callers must not reorder them in a way that violates
    /// [`entry_cmp`].
    pub fn entries_mut(&mut self) -> &mut [E] {
        &mut self.entries
    }

    /// Inserts `entry` at the position that keeps the list sorted, returning the index it was
    /// inserted at.
    pub fn insert_sorted(&mut self, entry: E) -> usize {
        let pos = self
            .entries
            .partition_point(|existing| entry_cmp(existing, &entry) == Ordering::Less);
        self.entries.insert(pos, entry);
        pos
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` iff the list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consumes the list, returning the owned entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<E> {
        self.entries
    }
}

/// Merge-walks `process_list` against `other_list` (both sorted per [`entry_cmp`]) and returns
/// `true` iff every process entry finds a [`type_match`] counterpart in `other_list`.
///
/// `other_list` may be a superset of `process_list`'s points (e.g. the full neighbourhood cached
/// on a [`Configuration`](crate::configuration::Configuration)), as is always the case once
/// implicit-wildcard expansion (§4.5) has run; the merge still works for the un-expanded,
/// shorter process lists used by multi-basis processes.
#[must_use]
pub fn whatever_match<P: GeometricEntry, O: GeometricEntry>(
    process_list: &MatchList<P>,
    other_list: &MatchList<O>,
) -> bool {
    itertools::merge_join_by(process_list.entries(), other_list.entries(), |p, o| entry_cmp(*p, *o)).all(|step| {
        match step {
            EitherOrBoth::Both(p, o) => type_match(p, o),
            EitherOrBoth::Left(_) => false,
            EitherOrBoth::Right(_) => true,
        }
    })
}

/// Merge-walks `process_list` against `other_list` (both sorted per [`entry_cmp`]) and returns
/// the `(process_index, other_index)` pairs of entries that refer to the [`same_point`].
///
/// Unlike [`whatever_match`], this does not check [`type_match`] and never fails early: it is
/// used by [`Configuration::perform_process`](crate::configuration::Configuration::perform_process)
/// to align a process's pattern against an already-matched site's cached neighbourhood, after
/// the match itself has already been verified by `whatever_match`.
#[must_use]
pub fn merge_same_point<P: GeometricEntry, O: GeometricEntry>(
    process_list: &MatchList<P>,
    other_list: &MatchList<O>,
) -> Vec<(usize, usize)> {
    itertools::merge_join_by(
        process_list.entries().iter().enumerate(),
        other_list.entries().iter().enumerate(),
        |(_, p), (_, o)| entry_cmp(*p, *o),
    )
    .filter_map(|step| match step {
        EitherOrBoth::Both((pi, _), (oi, _)) => Some((pi, oi)),
        _ => None,
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(match_type: u32, distance: f64, coordinate: Coordinate, index: usize) -> ConfigMatchListEntry {
        ConfigMatchListEntry::new(match_type, distance, coordinate, index)
    }

    #[test]
    fn sorted_by_distance_then_reverse_lex_coordinate() {
        let list = MatchList::new(vec![
            cfg(1, 1.0, Coordinate::new(1.0, 0.0, 0.0), 0),
            cfg(1, 0.0, Coordinate::new(0.0, 0.0, 0.0), 1),
            cfg(1, 1.0, Coordinate::new(0.0, 1.0, 0.0), 2),
        ]);

        assert_eq!(list.entries()[0].index, 1); // distance 0 first
        assert_eq!(list.entries()[1].index, 0); // (1,0,0) sorts before (0,1,0) in reverse lex
        assert_eq!(list.entries()[2].index, 2);
    }

    #[test]
    fn wildcard_matches_anything() {
        let wildcard = ProcessMatchListEntry::wildcard(1.0, Coordinate::new(1.0, 0.0, 0.0));
        let config = cfg(7, 1.0, Coordinate::new(1.0, 0.0, 0.0), 3);

        assert!(type_match(&wildcard, &config));
    }

    #[test]
    fn asymmetric_wildcard_rule() {
        let concrete_process = ProcessMatchListEntry::new(2, 1.0, Coordinate::new(1.0, 0.0, 0.0), 0);
        let wildcard_config = cfg(0, 1.0, Coordinate::new(1.0, 0.0, 0.0), 3);

        // process requires type 2 but configuration side has "wildcard" type 0: no match,
        // because the wildcard rule only applies when it's on the left (process) side.
        assert!(!type_match(&concrete_process, &wildcard_config));
    }

    #[test]
    fn whatever_match_over_superset() {
        let process = MatchList::new(vec![ProcessMatchListEntry::new(
            1,
            1.0,
            Coordinate::new(1.0, 0.0, 0.0),
            0,
        )]);
        let full_neighbourhood = MatchList::new(vec![
            cfg(1, 1.0, Coordinate::new(1.0, 0.0, 0.0), 0),
            cfg(5, 1.0, Coordinate::new(0.0, 1.0, 0.0), 1),
            cfg(9, 0.0, Coordinate::new(0.0, 0.0, 0.0), 2),
        ]);

        assert!(whatever_match(&process, &full_neighbourhood));
    }

    #[test]
    fn whatever_match_fails_on_type_mismatch() {
        let process = MatchList::new(vec![ProcessMatchListEntry::new(
            2,
            1.0,
            Coordinate::new(1.0, 0.0, 0.0),
            0,
        )]);
        let full_neighbourhood = MatchList::new(vec![cfg(1, 1.0, Coordinate::new(1.0, 0.0, 0.0), 0)]);

        assert!(!whatever_match(&process, &full_neighbourhood));
    }

    #[test]
    fn merge_same_point_pairs_coincident_entries() {
        let process = MatchList::new(vec![
            ProcessMatchListEntry::new(1, 1.0, Coordinate::new(1.0, 0.0, 0.0), 0),
            ProcessMatchListEntry::new(9, 0.0, Coordinate::new(0.0, 0.0, 0.0), 0),
        ]);
        let neighbourhood = MatchList::new(vec![
            cfg(1, 1.0, Coordinate::new(1.0, 0.0, 0.0), 7),
            cfg(5, 1.0, Coordinate::new(0.0, 1.0, 0.0), 8),
            cfg(9, 0.0, Coordinate::new(0.0, 0.0, 0.0), 9),
        ]);

        let pairs = merge_same_point(&process, &neighbourhood);
        assert_eq!(pairs.len(), 2);
        for (p, o) in pairs {
            assert!(same_point(&process.entries()[p], &neighbourhood.entries()[o]));
        }
    }

    #[test]
    fn insert_sorted_keeps_order() {
        let mut list = MatchList::new(vec![
            cfg(1, 0.0, Coordinate::new(0.0, 0.0, 0.0), 0),
            cfg(1, 2.0, Coordinate::new(0.0, 0.0, 0.0), 1),
        ]);
        list.insert_sorted(cfg(1, 1.0, Coordinate::new(0.0, 0.0, 0.0), 2));

        let distances: Vec<f64> = list.entries().iter().map(|e| e.distance).collect();
        assert_eq!(distances, vec![0.0, 1.0, 2.0]);
    }
}
