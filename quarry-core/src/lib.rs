//! # Quarry Core
//!
//! Core library for the Quarry research orchestrator.
//! Provides the bounded plan/search/reflect/synthesize loop controller, its
//! resilience, compaction and citation-verification machinery, the model and
//! search provider seams, research personas, configuration, and the HTTP API.

pub mod agents;
pub mod brain;
pub mod citation;
pub mod compaction;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod schema;
pub mod search;
pub mod server;
pub mod state;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agents::{AgentProfile, AgentStore};
pub use brain::{CompletionRequest, CompletionResponse, LlmProvider, MockLlmProvider, TokenUsage};
pub use citation::{CitationVerifier, ClaimCheck, ClaimVerifier, LlmClaimVerifier, VerifiedAnswer};
pub use compaction::{CompactionPolicy, CompactionTrigger, EvidenceView};
pub use config::{QuarryConfig, ResearchOptions, Tier, TierLimits, load_config};
pub use controller::{ResearchController, RunOutcome};
pub use error::{ConfigError, LlmError, SchemaError, SearchError};
pub use events::{ChannelEventSink, EventSink, NoOpEventSink, ResearchEvent, TracingEventSink};
pub use search::{MockSearchProvider, SearchProvider};
pub use state::{ResearchState, ResearchTrace};
pub use types::{
    Citation, ErrorKind, ErrorRecord, FailureKind, FinalResult, Phase, PhaseOutcome,
    ResearchFailure, SearchHit, Source, SourceId, StopReason,
};
