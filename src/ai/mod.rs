//! AI assistance - backend capability, prompt, response guard, cache and mediator

pub mod cache;
pub mod client;
pub mod guard;
pub mod mediator;
pub mod prompt;
pub mod types;

pub use cache::{AdvisoryCache, CacheKey};
pub use client::{AnthropicBackend, AssistantBackend, AssistantConfig, AssistantPrompt};
pub use guard::{ResponseGuard, CONSULT_PROFESSIONAL, NOT_A_DIAGNOSIS};
pub use mediator::{AdvisorySource, AssistantMediator};
pub use prompt::build_prompt;
pub use types::{AssistantAdvisory, MetricSnapshot, SnapshotReading};
