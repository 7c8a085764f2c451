//! Skeleton hooks that report through `tracing`

use rmifs_rmi::{RmiError, SkeletonHooks};
use std::io;
use tracing::{error, info, warn};

/// Logs accept-loop and handler faults of one skeleton
#[derive(Debug, Clone)]
pub struct LogHooks {
    name: &'static str,
}

impl LogHooks {
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

impl SkeletonHooks for LogHooks {
    fn stopped(&self, cause: Option<&io::Error>) {
        match cause {
            Some(e) => error!("{} listener stopped: {}", self.name, e),
            None => info!("{} listener stopped", self.name),
        }
    }

    fn listen_error(&self, error: &io::Error) -> bool {
        // Running out of descriptors or a reset before accept is transient
        let transient = matches!(
            error.kind(),
            io::ErrorKind::ConnectionAborted
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::Interrupted
        ) || error.raw_os_error() == Some(24);
        warn!("{} accept failed: {}{}", self.name, error, if transient { ", retrying" } else { "" });
        transient
    }

    fn service_error(&self, error: &RmiError) {
        warn!("{} request failed: {}", self.name, error);
    }
}
