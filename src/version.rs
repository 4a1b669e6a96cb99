// Package identity baked in at build time; reported by /version and sent as the probe User-Agent.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");

/// `pingboard/<version>`.
pub fn user_agent() -> String {
    format!("{NAME}/{VERSION}")
}
