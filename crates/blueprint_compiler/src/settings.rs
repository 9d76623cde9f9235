//! Compiler settings.

use serde::{Deserialize, Serialize};

use blueprint_types::CompilerResultsLog;

/// Switches that change how and when assets are compiled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Never regenerate classes while loading
    pub force_disable_compile_on_load: bool,
    /// Compile dirty user-defined structures before every full compile
    pub structure_editing_enabled: bool,
    /// Report load-time warnings and errors at info level
    pub log_info_only_on_load: bool,
    /// Refresh the nodes of assets depending on an interface when it changes
    pub refresh_dependents_on_interface_change: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            force_disable_compile_on_load: false,
            structure_editing_enabled: true,
            log_info_only_on_load: false,
            refresh_dependents_on_interface_change: true,
        }
    }
}

impl CompilerSettings {
    /// Results log for a load-time regeneration
    pub fn load_results_log(&self) -> CompilerResultsLog {
        if self.log_info_only_on_load {
            CompilerResultsLog::info_only()
        } else {
            CompilerResultsLog::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: CompilerSettings = toml::from_str("log_info_only_on_load = true").unwrap();
        assert!(settings.log_info_only_on_load);
        assert!(settings.structure_editing_enabled);
        assert!(settings.load_results_log().log_info_only);
    }
}
