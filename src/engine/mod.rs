//! Terminal integration for the convergence engine
//!
//! 1. Diffing - show what a planning pass found
//! 2. Executing - confirm, converge with a progress bar, summarize

pub mod differ;
pub mod executor;

pub use differ::display_diff;
pub use executor::execute;
