//! # Lifecycle stages.
//!
//! ```text
//! boot:      PreInit ─► Config ─► PostConfig ─► Bootstrap ─► Ready
//! shutdown:  ShutdownStart ─► ShutdownComplete
//! ```
//!
//! A stage runs at most once per lifecycle; there is no pause/resume.

use std::fmt;

/// One phase of application startup or shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    PreInit,
    Config,
    PostConfig,
    Bootstrap,
    Ready,
    ShutdownStart,
    ShutdownComplete,
}

impl Stage {
    /// Boot stages, in execution order.
    pub const BOOT: [Stage; 5] = [
        Stage::PreInit,
        Stage::Config,
        Stage::PostConfig,
        Stage::Bootstrap,
        Stage::Ready,
    ];

    /// Shutdown stages, in execution order.
    pub const SHUTDOWN: [Stage; 2] = [Stage::ShutdownStart, Stage::ShutdownComplete];

    /// Number of stages; sizes per-stage tables.
    pub(crate) const COUNT: usize = 7;

    /// Dense index into per-stage tables.
    #[inline]
    pub(crate) fn index(self) -> usize {
        self as usize
    }

    /// True for `PreInit..=Ready`.
    #[inline]
    pub fn is_boot(self) -> bool {
        self <= Stage::Ready
    }

    /// True for stages whose callback failures abort the boot sequence.
    #[inline]
    pub fn is_fatal(self) -> bool {
        self < Stage::Ready
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(self) -> &'static str {
        match self {
            Stage::PreInit => "pre_init",
            Stage::Config => "config",
            Stage::PostConfig => "post_config",
            Stage::Bootstrap => "bootstrap",
            Stage::Ready => "ready",
            Stage::ShutdownStart => "shutdown_start",
            Stage::ShutdownComplete => "shutdown_complete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::PreInit => "PreInit",
            Stage::Config => "Config",
            Stage::PostConfig => "PostConfig",
            Stage::Bootstrap => "Bootstrap",
            Stage::Ready => "Ready",
            Stage::ShutdownStart => "ShutdownStart",
            Stage::ShutdownComplete => "ShutdownComplete",
        };
        f.write_str(name)
    }
}
