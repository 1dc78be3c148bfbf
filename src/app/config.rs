//! Application configuration
//!
//! Process-level settings that sit outside a single aggregation run.

/// Application configuration structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppConfig {
    /// Verbosity level for logging
    pub verbose: u8,
}

impl AppConfig {
    pub fn new(verbose: u8) -> Self {
        Self { verbose }
    }

    /// Get the log filter based on verbosity
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }

    /// Show target module for -vv and above
    pub fn show_targets(&self) -> bool {
        self.verbose >= 2
    }

    /// Show thread ids and line numbers for -vvv
    pub fn show_source_details(&self) -> bool {
        self.verbose >= 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_by_verbosity() {
        assert_eq!(AppConfig::new(0).log_level(), "info");
        assert_eq!(AppConfig::new(1).log_level(), "debug");
        assert_eq!(AppConfig::new(2).log_level(), "trace");
        assert_eq!(AppConfig::new(7).log_level(), "trace");
    }

    #[test]
    fn test_detail_flags() {
        assert!(!AppConfig::new(1).show_targets());
        assert!(AppConfig::new(2).show_targets());
        assert!(!AppConfig::new(2).show_source_details());
        assert!(AppConfig::new(3).show_source_details());
    }
}
