// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod error;
pub mod normalize;
pub mod vectorizer;
pub mod classifier;
pub mod trust;
pub mod decision;
pub mod artifacts;
pub mod engine;
pub mod feedback;
pub mod corpus;
pub mod retrain;
pub mod fetch;
pub mod config;
pub mod metrics;
pub mod api;

/// Shared by both binaries. `RUST_LOG` wins, otherwise `hoax_detector=info,warn`;
/// `LOG_FORMAT=json` switches to JSON lines. Output goes to stderr so the retrain
/// report on stdout stays machine-readable. Shuttle may already have installed a
/// subscriber, hence `try_init`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hoax_detector=info,warn"));
    let json = json_log_format(std::env::var("LOG_FORMAT").ok().as_deref());

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()
    };
}

fn json_log_format(raw: Option<&str>) -> bool {
    raw.is_some_and(|v| v.trim().eq_ignore_ascii_case("json"))
}

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::decision::{Decision, DecisionPolicy, Label};
pub use crate::engine::{Article, ArticleInput, Detection, Detector};
pub use crate::error::{Error, Result};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_switch() {
        assert!(json_log_format(Some("json")));
        assert!(json_log_format(Some(" JSON ")));
        assert!(!json_log_format(Some("compact")));
        assert!(!json_log_format(None));
    }
}
