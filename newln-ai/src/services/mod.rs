//! Generation pipeline services

pub mod chat;
pub mod chunker;
pub mod gemini_client;
pub mod generation_client;
pub mod job_orchestrator;
pub mod mock_backend;
pub mod output_shape;
pub mod progress_broadcaster;
pub mod prompts;

pub use chat::{tutor_reply, ChatTurn, Speaker};
pub use chunker::{chunk_unique, ItemText};
pub use gemini_client::GeminiBackend;
pub use generation_client::{
    GenerationBackend, GenerationClient, GenerationClientConfig, GenerationError,
};
pub use job_orchestrator::{JobOrchestrator, JobOutcome, OrchestratorConfig, SubJobError};
pub use mock_backend::MockBackend;
pub use output_shape::{OutputShape, Shaped};
pub use progress_broadcaster::{ProgressBroadcaster, Subscription};
pub use prompts::{PromptSet, PromptTemplate};
