//! View resolution: identities of view nodes, the criteria they carry and the providers that
//! mint them.

pub mod criteria;
pub mod filter;
pub mod identity;
pub mod mirror;
pub mod order;
pub mod rule;

pub use criteria::{is_wildcard, zip_triples, FacetMode, FacetTriple, ViewCriteria, WILDCARD};
pub use filter::Candidate;
pub use identity::{ProviderId, ViewArena, ViewId, ViewRecord};
pub use mirror::{derive_children, MirrorKind, MirrorProvider};
pub use rule::{FacetRule, FacetRuleType};
