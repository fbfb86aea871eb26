pub mod checker;
pub mod evaluator;
pub mod models;
pub mod store;

pub use checker::{AlertChecker, CycleStats};
pub use evaluator::{evaluate, EvaluatorConfig, TriggerDecision};
pub use models::*;
pub use store::AlertStore;
