#![no_std]
//! Board support for the crank power meter: pin map, peripheral resource
//! groups, and helpers that turn them into configured drivers.

mod board;
mod resources;

// Flatten
pub use board::*;
pub use resources::*;
