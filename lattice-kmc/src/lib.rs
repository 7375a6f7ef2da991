#![warn(clippy::all, clippy::cargo, clippy::nursery, clippy::pedantic)]
#![warn(missing_docs)]

//! A lattice kinetic Monte Carlo (KMC) core: the event-driven state machine that evolves a
//! configuration of typed particles on a fixed lattice by repeatedly selecting and applying
//! local reaction/diffusion processes according to their statistical rates.
//!
//! This crate is the algorithmic core only. Building configurations and processes, driving the
//! simulation loop, distributing work across processes, and logging trajectories are left to the
//! embedding application; see [`rate`] for the one callback the core requires from it.

pub mod configuration;
pub mod coordinate;
pub mod distributor;
pub mod error;
pub mod interactions;
pub mod lattice_map;
pub mod lattice_model;
pub mod matcher;
pub mod match_list;
pub mod process;
pub mod random;
pub mod rate;
pub mod simulation_timer;
pub mod sites_map;

pub use coordinate::Coordinate;
pub use error::{Error, Result};
pub use lattice_map::LatticeMap;
