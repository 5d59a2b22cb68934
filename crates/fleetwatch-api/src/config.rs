/// HTTP/WebSocket server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Per-connection outbound message buffer; slow clients that fall this
    /// far behind start losing updates
    pub ws_send_buffer: usize,
}

impl ApiConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ws_send_buffer: 64,
        }
    }
}
