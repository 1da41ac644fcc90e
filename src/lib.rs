//! Force-directed layout and analytics for influence networks.
//!
//! A [`controller::Controller`] owns an [`engine::LayoutEngine`], which runs
//! the [`physics`] simulation on a background thread in batches. The
//! [`analytics`] functions work on any graph snapshot independently of it.

pub mod analytics;
pub mod controller;
pub mod engine;
pub mod graph;
pub mod physics;
pub mod placement;
pub mod util;
