/// The canvas is served on one fixed port.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Frames queued per connection before a slow client starts losing events.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub outbound_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.into(),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
        }
    }
}
