pub mod config;
pub mod domain;
pub mod errors;
pub mod recommendations;

pub use domain::{
    AgentTag, DecisionMemory, GuardVerdict, Message, OrderLine, OrderSnapshot, Role,
};
pub use errors::{ApplicationError, DatasetError, InterfaceError};
pub use recommendations::{
    AffinityRecord, AffinityTable, CategoryFilter, PopularityRow, PopularityTable,
    RecommendationEngine, RecommendationKind, RecommendationPlan,
};
