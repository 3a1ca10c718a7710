//! Dynamic analysis support for respec.
//!
//! Static context classification is a heuristic. When a conversion needs to
//! know something only the running program can tell (is `expect` callable
//! here?), it registers a request in an [`AnalysisRegistry`]. The
//! [`instrument`] step wraps every requested node in a probe call, the
//! instrumented project is run once by the caller, and the probe output is
//! loaded into [`RuntimeData`] keyed by [`NodeIdentity`].
//!
//! The two phases only meet through text: instrumented source going out,
//! a JSON payload coming back.

pub mod error;
pub mod helper;
pub mod injector;
pub mod registry;
pub mod runtime_data;

pub use error::{AnalysisError, AnalysisResult};
pub use helper::{write_helper, HELPER_FILE_NAME, OUTPUT_ENV, PROBE_NAME};
pub use injector::{instrument, Instrumented};
pub use registry::{AnalysisRegistry, AnalysisRequest, EvalTarget};
pub use runtime_data::{NodeIdentity, RuntimeData, RuntimeFact};
