//! Question planning, content assembly and the end-to-end answer pipeline
//! for SiteQuery.
//!
//! - [`planner`]: maps a question to keywords and required capabilities
//! - [`assembler`]: dedup, ranking, coverage repair, budget and citations
//! - [`synthesis`]: the answer-writing seam
//! - [`pipeline`]: plan → navigate → extract → assemble → synthesize

pub mod assembler;
pub mod pipeline;
pub mod planner;
pub mod synthesis;

pub use assembler::{Assembler, assemble};
pub use pipeline::{
    AnswerEngine, AnswerRequest, AnswerResponse, Diagnostics, ProgressReporter, SilentProgress,
    answer,
};
pub use planner::plan;
pub use synthesis::{AnswerSynthesizer, ExcerptSynthesizer};
