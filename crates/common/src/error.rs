use thiserror::Error;

/// Boxed fault type produced by duct stage logic.
///
/// Duct implementations are free to fail with any error type; the sink
/// adapter classifies faults crossing the host boundary via
/// [`classify_fault`].
pub type DuctFault = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical ductflow error taxonomy used across crates.
///
/// Classification guidance:
/// - [`DflError::Planning`]: node shape/identity issues discovered before any record moves
/// - [`DflError::State`]: lifecycle misuse (record before open, unbound runtime handle)
/// - [`DflError::InvalidConfig`]: configuration/endpoint/path contract violations
/// - [`DflError::Unsupported`]: valid request for an intentionally unimplemented capability
/// - [`DflError::Io`]: raw filesystem IO failures from std APIs, never re-wrapped
/// - [`DflError::ResourceExhausted`]: memory/resource pressure reported by stage logic, never re-wrapped
/// - [`DflError::Internal`]: unclassified fault crossing the adapter boundary, labeled with the phase it escaped from
#[derive(Debug, Error)]
pub enum DflError {
    /// Invalid or inconsistent configuration state.
    ///
    /// Examples:
    /// - missing required configuration before open
    /// - unparseable typed configuration value
    /// - endpoint directory contract violations
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Planning-invariant violations in the execution-node description.
    ///
    /// Examples:
    /// - sink node with zero or multiple sources
    /// - sink node sourced from something other than a partition boundary
    /// - malformed hexadecimal node id
    #[error("planning error: {0}")]
    Planning(String),

    /// Lifecycle misuse of a per-task component.
    ///
    /// Examples:
    /// - record pushed before the sink was opened
    /// - slice/counter access without a bound runtime handle
    #[error("state error: {0}")]
    State(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Memory or resource exhaustion reported by stage logic.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Valid request for a capability not implemented in the current version.
    ///
    /// Examples:
    /// - trap writers on non-filesystem endpoint kinds
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Unclassified fault wrapped at the host boundary.
    ///
    /// Carries the phase label ("during sink configuration" / "during sink
    /// execution") and the original fault as source.
    #[error("internal error {stage}")]
    Internal {
        /// Phase the fault escaped from.
        stage: String,
        /// Original fault.
        #[source]
        source: DuctFault,
    },
}

/// Standard ductflow result alias.
pub type Result<T> = std::result::Result<T, DflError>;

/// Classify a fault escaping duct logic at the host boundary.
///
/// Domain faults pass through unchanged. Raw IO faults surface as
/// [`DflError::Io`] without a wrapper. Anything else is wrapped as
/// [`DflError::Internal`] labeled with `stage`.
pub fn classify_fault(stage: &str, fault: DuctFault) -> DflError {
    let fault = match fault.downcast::<DflError>() {
        Ok(domain) => return *domain,
        Err(other) => other,
    };
    match fault.downcast::<std::io::Error>() {
        Ok(io) => DflError::Io(*io),
        Err(other) => DflError::Internal {
            stage: stage.to_string(),
            source: other,
        },
    }
}
