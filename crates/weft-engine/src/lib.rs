pub mod error;
pub mod graph;
pub mod lru;
pub mod model_client;
pub mod nodes;
pub mod orchestrator;
pub mod plan;
pub mod prefix_cache;
pub mod state;
pub mod testing;
pub mod tool_loop;

pub use error::EngineError;
pub use graph::{GraphRunner, OrchestrationGraph, OrchestrationNode};
pub use orchestrator::{default_graph, EngineDeps, Orchestrator, RunOutput};
pub use plan::{PlanProgress, PlanStore};
pub use prefix_cache::{CachedPrefix, PrefixCacheStats, PromptPrefixCache};
pub use state::{CancellationCheck, NodeId, OrchestrationRequest, OrchestrationState, Transition};
pub use tool_loop::{LoopOutcome, ToolLoopConfig, ToolLoopController};
