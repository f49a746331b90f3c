//! HTTP layer: the config-extension endpoint the CI server calls, plus
//! health and metrics.

pub mod gate;
pub mod handler;
pub mod wire;
