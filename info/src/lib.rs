//! Build information, baked in at compile time.

pub const NAME: &str = "bloodbank";

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Set by the release pipeline from the commit being built.
pub const REVISION: Option<&str> = option_env!("BLOODBANK_REVISION");

pub const BUILD_TIMESTAMP: Option<&str> = option_env!("BUILD_TIMESTAMP");

/// A one-line description of this build, e.g. `bloodbank 0.1.0 (abc123)`.
pub fn describe() -> String {
    match REVISION {
        Some(revision) => format!("{} {} ({})", NAME, VERSION, revision),
        None => format!("{} {}", NAME, VERSION),
    }
}
