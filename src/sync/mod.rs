pub mod engine;
pub mod field_cache;

pub use engine::{EngineOptions, PassReport, ReconciliationEngine};

#[cfg(test)]
mod tests;
