pub mod aggregator;
pub mod config;
pub mod content;
pub mod fetcher;
pub mod generator;
pub mod llm_adapter;
pub mod parser;
pub mod pdf;
pub mod pipeline;
pub mod processing;
pub mod profile;
pub mod sources;
pub mod summarizer;
pub mod traits;
pub mod types;
pub mod utils;
pub mod web;
pub mod workflow;

pub use types::*;
pub use aggregator::{FeedAggregator, FeedFetchReport};
pub use config::Config;
pub use content::{ContentOutcome, ContentParser};
pub use fetcher::Fetcher;
pub use llm_adapter::{LlmAdapter, LlmError, MockLlmAdapter};
pub use parser::FeedParser;
pub use pipeline::{NewsletterPipeline, PipelineStage, RunReport};
pub use processing::{Categorizer, FilterStage, RelevanceScorer};
pub use profile::ProfileStore;
pub use summarizer::Summarizer;
pub use workflow::{Workflow, WorkflowState};
