//! Collection runner engine: parse Postman-style collection and environment
//! documents, resolve `{{variable}}` templates, execute the request tree in
//! order, run embedded pre-request and test scripts in a sandbox, and report
//! per-request pass/fail plus a run summary.

pub mod domain;
pub mod engine;
pub mod error;
pub mod logging;
pub mod store;

pub use domain::parse::{
    parse_collection, parse_collection_text, parse_environment, parse_environment_text,
};
pub use domain::report::{ExecutionResult, ExecutionSummary, TestResult};
pub use domain::types::{Collection, Environment};
pub use engine::cancel::CancelRegistry;
pub use engine::http::{ReqwestTransport, Transport, WireRequest, WireResponse};
pub use engine::runner::{execute_collection, RunOptions, Runner};
pub use engine::script::{run_script, ScriptOutcome, ScriptPhase, ScriptRequest, ScriptResponse};
pub use store::{BlobStore, SqliteBlobStore};
