//! Build version banner

/// Crate version baked in at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// `vulcan-ingress v<version> (<os>_<arch>)`
pub fn long_version() -> String {
    format!(
        "vulcan-ingress v{} ({}_{})",
        VERSION,
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
