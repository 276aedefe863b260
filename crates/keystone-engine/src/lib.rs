//! Keystone engine — propagation, vaccination ranking, policy simulation.
//!
//! Given a contribution matrix (developers → repositories) and a dependency
//! matrix (repositories → repositories), the engine iterates a pluggable
//! aggregation law to a fixed point to estimate cascading impact, ranks
//! repositories by how much protecting them would reduce that impact, and
//! evaluates capacity-injection policies against the same machinery.

pub mod aggregation;
pub mod metrics;
pub mod policy;
pub mod propagation;
pub mod ranker;

pub use aggregation::AggregationLaw;
pub use metrics::Metrics;
pub use policy::{Injection, PolicySimulator, WindowDays};
pub use propagation::{EngineInputs, Mode, PropagationEngine, RunSummary};
pub use ranker::{Perturbation, RankingResult, VaccinationRanker};
