//! Global options

use serde::{Deserialize, Serialize};

/// Process-wide behaviour switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
    /// Rethrow user-code errors nobody suppressed
    pub throw_global_error: bool,

    /// Send `link_failed` notifications to the warning channel
    pub report_link_failed: bool,

    /// Default for nodes created afterwards
    pub destroy_backend_element_on_detach: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            throw_global_error: false,
            report_link_failed: true,
            destroy_backend_element_on_detach: false,
        }
    }
}
