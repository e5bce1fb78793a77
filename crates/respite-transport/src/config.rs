use respite_protocol::MAX_BULK_LEN;

/// Tuning knobs shared by the buffering transports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Initial size of the receive buffer in bytes.
    pub receive_buffer_size: usize,
    /// Largest single frame the receive buffer grows to hold.
    pub max_frame_size: usize,
    /// Disable Nagle's algorithm on socket transports.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            receive_buffer_size: 16 * 1024,
            // Room for the largest bulk payload plus its header and CRLF.
            max_frame_size: MAX_BULK_LEN + 64 * 1024,
            nodelay: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TransportConfig::default();
        assert_eq!(config.receive_buffer_size, 16 * 1024);
        assert!(config.max_frame_size > MAX_BULK_LEN);
        assert!(config.nodelay);
    }
}
