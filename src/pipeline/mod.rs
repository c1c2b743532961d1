//! Request pipeline: session lookup, analyzer fan-out and envelope assembly
//!
//! A request names a session and a list of analyzers. The [`PipelineExecutor`]
//! resolves the session through the cache, runs each analyzer on the blocking
//! pool and hands the outcomes to the [`ResponseAssembler`], which produces a
//! [`PipelineEnvelope`] with results in request order.

mod assembler;
mod envelope;
mod executor;

pub use assembler::ResponseAssembler;
pub use envelope::{AnalyzerResult, AnalyzerStatus, EnvelopeStatus, PipelineEnvelope};
pub use executor::{Cancelled, PipelineExecutor};
