//! Cross-module tests
//!
//! - `support`: scripted lanes and an in-memory container writer
//! - `e2e`: resampler exactness and complete sessions
//! - `properties`: proptest checks of interleaving and frame counts

mod e2e;
mod properties;
pub(crate) mod support;
