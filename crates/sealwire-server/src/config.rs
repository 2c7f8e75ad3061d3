//! Command-line and environment configuration.

use std::{net::SocketAddr, time::Duration};

use clap::Parser;
use sealwire_core::DispatcherConfig;
use sealwire_proto::DEFAULT_MAX_FRAME_LEN;

/// sealwire server
#[derive(Debug, Clone, Parser)]
#[command(name = "sealwire-server", version, about)]
pub struct ServerArgs {
    /// Address to listen on
    #[arg(long, env = "SEALWIRE_BIND", default_value = "127.0.0.1:8000")]
    pub bind: SocketAddr,

    /// Seconds allowed for the client hello after connect
    #[arg(long, env = "SEALWIRE_HANDSHAKE_TIMEOUT", default_value_t = 10)]
    pub handshake_timeout_secs: u64,

    /// Seconds allowed for the WebSocket upgrade
    #[arg(long, env = "SEALWIRE_UPGRADE_TIMEOUT", default_value_t = 10)]
    pub upgrade_timeout_secs: u64,

    /// Consecutive undecryptable frames before closing (0 never closes)
    #[arg(long, env = "SEALWIRE_MAX_REJECTED_FRAMES", default_value_t = 16)]
    pub max_rejected_frames: u32,

    /// Pending pushes buffered per session before it is evicted
    #[arg(long, env = "SEALWIRE_MAILBOX_CAPACITY", default_value_t = 256)]
    pub mailbox_capacity: usize,

    /// Largest inbound text frame in bytes
    #[arg(long, env = "SEALWIRE_MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_LEN)]
    pub max_frame_bytes: usize,

    /// Log filter directive; RUST_LOG applies when unset
    #[arg(long, env = "SEALWIRE_LOG")]
    pub log_filter: Option<String>,
}

impl ServerArgs {
    /// Per-connection limits
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            max_consecutive_rejections: (self.max_rejected_frames > 0)
                .then_some(self.max_rejected_frames),
            mailbox_capacity: self.mailbox_capacity,
            max_frame_len: self.max_frame_bytes,
        }
    }

    /// WebSocket upgrade deadline
    pub fn upgrade_timeout(&self) -> Duration {
        Duration::from_secs(self.upgrade_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_dispatcher_defaults() {
        let args = ServerArgs::try_parse_from(["sealwire-server"]).unwrap();
        let config = args.dispatcher_config();
        let defaults = DispatcherConfig::default();

        assert_eq!(config.handshake_timeout, defaults.handshake_timeout);
        assert_eq!(config.max_consecutive_rejections, defaults.max_consecutive_rejections);
        assert_eq!(config.mailbox_capacity, defaults.mailbox_capacity);
        assert_eq!(config.max_frame_len, defaults.max_frame_len);
    }

    #[test]
    fn zero_rejections_disables_limit() {
        let args =
            ServerArgs::try_parse_from(["sealwire-server", "--max-rejected-frames", "0"]).unwrap();
        assert_eq!(args.dispatcher_config().max_consecutive_rejections, None);
    }

    #[test]
    fn bind_address_parses() {
        let args = ServerArgs::try_parse_from(["sealwire-server", "--bind", "0.0.0.0:9000"]).unwrap();
        assert_eq!(args.bind.port(), 9000);
    }
}
