//! Substrate configuration

use crate::codec::DEFAULT_MAX_FRAME_SIZE;
use serde::{Deserialize, Serialize};

/// Settings shared by every skeleton in a process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RmiConfig {
    /// Connections handled concurrently per skeleton; further connections
    /// wait in the listen backlog
    pub max_connections: usize,
    /// Largest request frame a skeleton accepts
    pub max_frame_size: usize,
    /// Host to bind when no address was fixed
    pub bind_host: String,
}

impl Default for RmiConfig {
    fn default() -> Self {
        Self {
            max_connections: 256,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            bind_host: "0.0.0.0".to_string(),
        }
    }
}
