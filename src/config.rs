//! Configuration for chrispack.
//!
//! Reads configuration from a `.env` file and environment variables.
//! Environment variables take precedence over the `.env` file (loaded in
//! `main` via dotenvy before this runs).

/// Satellite identifier used in product names.
pub const DEFAULT_SAT_ID: &str = "PR1";
/// File class used in product names.
pub const DEFAULT_FILE_CLASS: &str = "OPER";
/// Creator recorded in SIP information files.
pub const DEFAULT_SIP_CREATOR: &str = "ESA";

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Satellite identifier (CHRIS_SAT_ID)
    pub sat_id: String,
    /// File class (CHRIS_FILE_CLASS)
    pub file_class: String,
    /// SIP creator (CHRIS_SIP_CREATOR)
    pub sip_creator: String,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults.
    pub fn load() -> Self {
        let var = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            sat_id: var("CHRIS_SAT_ID", DEFAULT_SAT_ID),
            file_class: var("CHRIS_FILE_CLASS", DEFAULT_FILE_CLASS),
            sip_creator: var("CHRIS_SIP_CREATOR", DEFAULT_SIP_CREATOR),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        println!("  CHRIS_SAT_ID: {}", self.sat_id);
        println!("  CHRIS_FILE_CLASS: {}", self.file_class);
        println!("  CHRIS_SIP_CREATOR: {}", self.sip_creator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_environment() {
        // unrelated env vars don't affect the CHRIS_* namespace in CI
        let config = Config::load();
        assert!(!config.sat_id.is_empty());
        assert!(!config.file_class.is_empty());
        assert!(!config.sip_creator.is_empty());
    }
}
