//! Per-invocation execution context
//!
//! Carries the dry-run / auto-approve flags and region/profile selection for a
//! single process run. Constructed once from CLI flags (with environment
//! fallback) and passed by reference through every call chain; there is no
//! process-wide singleton.

/// Immutable execution configuration for one invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Log intended mutations without performing them. Always wins over
    /// `auto_approve`.
    pub dry_run: bool,
    /// Skip interactive confirmation for destructive actions.
    pub auto_approve: bool,
    /// AWS region, if explicitly selected.
    pub region: Option<String>,
    /// AWS profile, if explicitly selected.
    pub profile: Option<String>,
}

impl ExecutionContext {
    /// Build a context from CLI flags, falling back to the `DRY_RUN`,
    /// `AUTO_APPROVE`, `AWS_REGION` and `AWS_PROFILE` environment variables
    /// for anything not set explicitly.
    pub fn new(
        dry_run: bool,
        auto_approve: bool,
        region: Option<String>,
        profile: Option<String>,
    ) -> Self {
        Self {
            dry_run: dry_run || env_flag("DRY_RUN"),
            auto_approve: auto_approve || env_flag("AUTO_APPROVE"),
            region: region.or_else(|| std::env::var("AWS_REGION").ok()),
            profile: profile.or_else(|| std::env::var("AWS_PROFILE").ok()),
        }
    }

    /// Build a context purely from environment variables.
    pub fn from_env() -> Self {
        Self::new(false, false, None, None)
    }

    /// Mode-aware prefix for log messages. Dry-run wins over auto-approve.
    pub fn log_prefix(&self) -> &'static str {
        if self.dry_run {
            "[DRY-RUN] "
        } else if self.auto_approve {
            "[AUTO-APPROVE] "
        } else {
            ""
        }
    }
}

/// Read a boolean flag from the environment ("true", case-insensitive).
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
