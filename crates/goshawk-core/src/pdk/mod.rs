//! Building blocks shared by the agent's probe modules: typed configuration
//! access, the INI-backed configuration store, and the contracts of the
//! external collaborators (file-layer resolution and context enrichment).
//!
//! Every collaborator call is best-effort. A miss degrades the completeness
//! of the emitted event, never its delivery path.

mod config;
mod enrichment;

pub use config::*;
pub use enrichment::*;
