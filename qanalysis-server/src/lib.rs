//! # qanalysis-server
//!
//! HTTP front end for [`qanalysis_core`]. Two flat endpoints take a single
//! `ProblemData` record (decode-only service, rates in requests/min):
//!
//! - `POST /solve`: queue performance at the given `RPM`
//! - `POST /target`: largest `RPM` meeting `targetWait` and `targetITL`
//!
//! Two structured endpoints take the full prefill/decode configuration
//! (`POST /analyze`, `POST /size`), and `GET /health` reports liveness.

pub mod error;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use server::{AppState, SharedState, router, run};
pub use types::{AnalysisData, AnalyzeRequest, ProblemData, SizeRequest, SizeResponse};
