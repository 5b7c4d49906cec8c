//! Turn recipe web pages and short cooking videos into structured recipes.
//!
//! A URL is classified by platform, its content fetched (page text or a
//! downloaded video), videos are sampled into frames and a transcript, and a
//! generative model normalizes the result into a [`RecipeDraft`]. Jobs run
//! asynchronously behind an [`Orchestrator`] that callers submit to and poll.
//!
//! ```no_run
//! # use recipe_harvest::{Harvester, PollResponse};
//! # use std::time::Duration;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let harvester = Harvester::builder().build()?;
//! let submitted = harvester.submit_url("https://www.youtube.com/shorts/abcDEF_1234").await?;
//! harvester.wait_for(submitted.job_id, Duration::from_secs(300)).await?;
//!
//! if let PollResponse::Success { result } = harvester.poll(&submitted.job_id.to_string()).await? {
//!     println!("{}: {} ingredients", result.title, result.ingredients.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod builder;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod media;
pub mod model;
pub mod pipeline;
pub mod providers;
pub mod retry;
pub mod storage;

pub use builder::{Harvester, HarvesterBuilder, LlmBackend};
pub use classify::classify;
pub use config::HarvestConfig;
pub use error::HarvestError;
pub use jobs::{CancelOutcome, Job, JobId, JobState, Orchestrator, PollResponse, SubmitResponse};
pub use model::{ExtractionRequest, PlatformKind, Quantity, RecipeDraft, Step};
