//! Embedding pre-filter, primary LLM scorer and premium escalator (spec
//! §4.7-§4.9, C7/C8/C9).

pub mod embedding;
pub mod filter;
pub mod llm;
pub mod postprocess;
pub mod score;

pub use embedding::{cosine_similarity, estimate_tokens, truncate_head_tail, DeterministicFakeEmbeddingClient, EmbeddingClient, OpenAiEmbeddingClient};
pub use filter::{filter_jobs, JobForFilter, Layer1Decision};
pub use llm::{ChatCompletionClient, DeterministicFakeChatClient, OpenAiChatClient, RawScoreResponse, RawYearsRequirement};
pub use postprocess::{apply_years_gate, GatedScore};
pub use score::{score_candidate_jobs, PairInput, ScoreOutcome};
