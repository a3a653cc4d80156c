//! # qanalysis-core: queueing analysis for batched inference servers
//!
//! Models an inference server as a finite birth-death queue whose service rate
//! depends on how many requests are batched together, and answers two
//! questions:
//!
//! 1. **Analyze**: given an arrival rate, what are throughput, waiting time,
//!    response time, time to first token and inter-token latency?
//! 2. **Size**: given latency and throughput targets, what is the largest
//!    arrival rate that meets all of them?
//!
//! ```no_run
//! use qanalysis_core::{QueueAnalyzer, QueueConfig, RequestSize, TargetPerf};
//!
//! let analyzer = QueueAnalyzer::new(QueueConfig::default(), RequestSize::default())?;
//! let metrics = analyzer.analyze(25.0)?;
//! println!("{}", metrics);
//!
//! let sized = analyzer.size(&TargetPerf { ttft: Some(120.0), itl: Some(14.0), tps: None })?;
//! println!("max rate {:.2} req/s bound by {}", sized.rate, sized.binding);
//! # Ok::<(), qanalysis_core::QueueError>(())
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod model;
pub mod search;
pub mod service;

// Re-exports
pub use analyzer::{
    AnalysisMetrics, QueueAnalyzer, RateRange, SizingResult, TargetMetric, TargetPerf, TargetRate,
};
pub use config::{AppConfig, QueueConfig, ServerConfig, load_config};
pub use error::{Bound, QueueError, Result};
pub use model::{BirthDeathModel, MAX_CAPACITY, QueueStats, ServiceRateProfile};
pub use search::{Indicator, SearchOptions, SearchResult, binary_search, binary_search_with};
pub use service::{
    CompositionPolicy, DecodeParms, PrefillParms, RequestSize, ServiceParms, ServiceRateComposer,
};
