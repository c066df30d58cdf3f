//! Model routing: complexity tiers, local model inventory and the policy
//! engine that combines them

pub mod complexity;
pub mod engine;
pub mod registry;

pub use complexity::{analyze_complexity, ComplexityAnalysis, ComplexityLevel};
pub use engine::{RouteOptions, RoutingEngine};
pub use registry::{
    select_local_model, FallbackModel, FallbackModelStore, LocalModel, LocalModelRegistry,
    LocalSelection, MemoryModelRegistry, ModelStatus, SelectionSource,
};
