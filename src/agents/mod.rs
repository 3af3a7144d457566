//! Agent behaviors
//!
//! - `ResearcherAgent` - simulated multi-source research, search and analysis
//! - `LookupSource` - pluggable sources the researcher consults

pub mod researcher;
pub mod sources;

pub use researcher::{research_results_key, research_status_key, ResearcherAgent, RESEARCHER_ROLE};
pub use sources::{
    DataSource, KnowledgeSource, LookupSource, SimulatedLatency, SourceResults, WebSource,
};
