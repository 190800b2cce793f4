//! Domain analysis.
//!
//! Each configured domain expert reads the user's request and answers with a
//! structured [`AnalysisResult`]. Experts are independent of each other and
//! can run concurrently.

mod expert;
pub mod extract;
mod integrate;
mod profiles;
mod types;

pub use expert::DomainExpert;
pub use extract::{apply_fallbacks, extract_sections, ExtractedSections};
pub use integrate::{parse_report, DomainIntegrator, IntegrationReport};
pub use profiles::{builtin_profiles, DomainProfile};
pub use types::{AnalysisRequest, AnalysisResult};

/// Analysis error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("invalid analysis request: {0}")]
    InvalidRequest(String),

    #[error("{domain} analysis failed: {cause}")]
    Failure { domain: String, cause: String },
}
