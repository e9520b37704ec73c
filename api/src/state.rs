use valet_mcp_runtime::credentials::SERVER_API_KEY_ENV;

#[derive(Clone, Default)]
pub struct AppState {
    /// Process-wide search credential fallback. Read once at startup; callers
    /// can override it per request through transport headers.
    pub server_api_key: Option<String>,
}

impl AppState {
    pub fn from_env() -> Self {
        Self {
            server_api_key: std::env::var(SERVER_API_KEY_ENV).ok(),
        }
    }
}
