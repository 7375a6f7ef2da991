//! Error taxonomy for the lattice KMC core.

use thiserror::Error;

/// Errors that can be raised by the core. All of them are fatal at the API boundary: nothing
/// is retried internally, and the enclosing call should simply abort.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum Error {
    /// A [`LatticeMap`](crate::lattice_map::LatticeMap) repetition was not divisible by the
    /// requested sub-lattice divisor along some axis.
    #[error("cannot split {repetitions:?} into {divisors:?} equal tiles")]
    InvalidSplit {
        /// The parent lattice's per-axis repetitions.
        repetitions: [usize; 3],
        /// The requested per-axis divisors.
        divisors: [usize; 3],
    },

    /// A `SubLatticeMap` does not share `n_basis` with its parent, or its repetitions do not
    /// divide the parent's.
    #[error("sub-lattice map is incompatible with its parent: {0}")]
    IncompatibleLatticeMaps(String),

    /// A process was flagged as a redistribution process but carries an empty species string.
    #[error("process {0} is flagged as a redistribution process but has no redist_species")]
    MissingRedistSpecies(usize),

    /// The before/after configurations given to a process constructor have different
    /// coordinates.
    #[error("before/after configuration coordinates differ at entry {0}")]
    CoordinateMismatch(usize),

    /// An element name is not present in the possible-types map.
    #[error("element {0:?} is not a known type")]
    ElementTypeError(String),

    /// A process-based redistribution scatter could not find an accepting site or process
    /// within the configured iteration bound.
    #[error("redistribution of species {species:?} did not converge within {attempts} attempts")]
    RedistributionStuck {
        /// The species that could not be placed.
        species: String,
        /// The number of attempts made before giving up.
        attempts: usize,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
