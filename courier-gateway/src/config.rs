//! Gateway configuration.

use std::path::PathBuf;

/// HTTP gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Where uploaded profile pictures are written and served from
    pub assets_dir: PathBuf,
    /// HMAC secret for login tokens
    pub jwt_secret: String,
    /// Login token lifetime
    pub token_ttl_secs: u64,
    /// bcrypt work factor for new passwords
    pub bcrypt_cost: u32,
    /// Largest accepted request body
    pub body_limit_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:6001".to_string(),
            assets_dir: PathBuf::from("public/assets"),
            jwt_secret: "change-me".to_string(),
            token_ttl_secs: 30 * 24 * 60 * 60,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            body_limit_bytes: 30 * 1024 * 1024,
        }
    }
}
