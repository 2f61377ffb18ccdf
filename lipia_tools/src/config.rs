use std::time::Duration;

use log::*;
use storefront_common::Secret;

pub const DEFAULT_LIPIA_BASE_URL: &str = "https://lipia-api.kreativelabske.com/api/v2";
/// STK pushes wait on the shopper's handset, so the gateway can be slow to answer, but never this slow.
pub const DEFAULT_LIPIA_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct LipiaConfig {
    /// Base URL of the gateway API, without a trailing slash
    pub base_url: String,
    pub api_key: Secret<String>,
    /// The public URL the gateway will POST payment results to
    pub callback_url: String,
    /// Upper bound on a single request to the gateway, connection included
    pub timeout: Duration,
}

impl Default for LipiaConfig {
    fn default() -> Self {
        Self {
            base_url: String::default(),
            api_key: Secret::default(),
            callback_url: String::default(),
            timeout: DEFAULT_LIPIA_TIMEOUT,
        }
    }
}

impl LipiaConfig {
    pub fn new(base_url: &str, api_key: &str, callback_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: Secret::new(api_key.to_string()),
            callback_url: callback_url.to_string(),
            timeout: DEFAULT_LIPIA_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn new_from_env_or_default() -> Self {
        let base_url = std::env::var("SPS_LIPIA_BASE_URL").unwrap_or_else(|_| {
            info!("SPS_LIPIA_BASE_URL not set, using {DEFAULT_LIPIA_BASE_URL}");
            DEFAULT_LIPIA_BASE_URL.to_string()
        });
        let api_key = std::env::var("SPS_LIPIA_API_KEY").unwrap_or_else(|_| {
            warn!("SPS_LIPIA_API_KEY not set. STK push requests will be rejected by the gateway");
            String::default()
        });
        let callback_url = std::env::var("SPS_LIPIA_CALLBACK_URL").unwrap_or_else(|_| {
            warn!(
                "SPS_LIPIA_CALLBACK_URL not set. The gateway will not be able to notify this server of payment \
                 results, and customers will have to rely on polling"
            );
            String::default()
        });
        let timeout = parse_timeout(std::env::var("SPS_LIPIA_TIMEOUT_SECS").ok().as_deref());
        Self::new(&base_url, &api_key, &callback_url).with_timeout(timeout)
    }
}

fn parse_timeout(value: Option<&str>) -> Duration {
    match value.map(|v| v.trim().parse::<u64>()) {
        None => DEFAULT_LIPIA_TIMEOUT,
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        Some(_) => {
            warn!("SPS_LIPIA_TIMEOUT_SECS must be a positive number of seconds. Using {DEFAULT_LIPIA_TIMEOUT:?}");
            DEFAULT_LIPIA_TIMEOUT
        },
    }
}
