use std::{env, net::IpAddr, str::FromStr, time::Duration};

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use lipia_tools::LipiaConfig;
use log::*;
use storefront_common::{
    helpers::{parse_boolean_flag, split_list},
    Kes,
    Secret,
};
use storefront_engine::{
    checkout_objects::{
        LoyaltyPolicy,
        DEFAULT_LOYALTY_DISCOUNT,
        DEFAULT_LOYALTY_THRESHOLD,
        DEFAULT_LOYALTY_VALIDITY_WEEKS,
    },
    ReconciliationOptions,
};

const DEFAULT_SPS_HOST: &str = "127.0.0.1";
const DEFAULT_SPS_PORT: u16 = 8360;
const DEFAULT_DATABASE_URL: &str = "sqlite://data/storefront.db";
const DEFAULT_TRUSTED_SMS_SENDER: &str = "MPESA";
const DEFAULT_LOOKUP_ATTEMPTS: u32 = 3;
const DEFAULT_LOOKUP_DELAY_MS: u64 = 2000;
/// East Africa Time
const DEFAULT_STORE_TIMEZONE_OFFSET_HOURS: i32 = 3;
const WEEK_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_RELAY_SIGNATURE_TOLERANCE_SECS: u64 = 300;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// If supplied, requests against `/gateway/callback` are only accepted from these addresses.
    /// To explicitly disable the whitelist, set `SPS_GATEWAY_IP_WHITELIST` to "false", "none", or "0".
    pub gateway_whitelist: Option<Vec<IpAddr>>,
    pub sms_relay: SmsRelayConfig,
    pub loyalty: LoyaltyPolicy,
    pub reconciliation: ReconciliationOptions,
    /// The store's offset from UTC. Pickup dates are judged against the store's local date.
    pub store_utc_offset: FixedOffset,
    pub lipia: LipiaConfig,
}

#[derive(Clone, Debug)]
pub struct SmsRelayConfig {
    pub hmac_secret: Secret<String>,
    pub hmac_checks: bool,
    /// How far a relay signature's timestamp may be from the server clock. Also how long accepted signatures are
    /// remembered for replay detection.
    pub signature_tolerance: Duration,
}

impl Default for SmsRelayConfig {
    fn default() -> Self {
        Self {
            hmac_secret: Secret::default(),
            hmac_checks: false,
            signature_tolerance: Duration::from_secs(DEFAULT_RELAY_SIGNATURE_TOLERANCE_SECS),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPS_HOST.to_string(),
            port: DEFAULT_SPS_PORT,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            gateway_whitelist: None,
            sms_relay: SmsRelayConfig::default(),
            loyalty: LoyaltyPolicy::default(),
            reconciliation: ReconciliationOptions::default(),
            store_utc_offset: default_store_offset(),
            lipia: LipiaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPS_HOST").ok().unwrap_or_else(|| DEFAULT_SPS_HOST.into());
        let port = parse_env("SPS_PORT", DEFAULT_SPS_PORT);
        let database_url = env::var("SPS_DATABASE_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SPS_DATABASE_URL is not set. Using {DEFAULT_DATABASE_URL}.");
            DEFAULT_DATABASE_URL.into()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("SPS_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("SPS_USE_FORWARDED").ok(), false);
        let gateway_whitelist = configure_gateway_whitelist();
        let sms_relay = SmsRelayConfig::from_env_or_defaults();
        let loyalty = configure_loyalty_policy();
        let reconciliation = configure_reconciliation();
        let store_utc_offset = configure_store_offset();
        let lipia = LipiaConfig::new_from_env_or_default();
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            gateway_whitelist,
            sms_relay,
            loyalty,
            reconciliation,
            store_utc_offset,
            lipia,
        }
    }

    pub fn store_calendar(&self) -> StoreCalendar {
        StoreCalendar::new(self.store_utc_offset)
    }
}

/// Knows what day it is at the store. Pickup dates are judged against the store's local date, not the server's.
#[derive(Clone, Copy, Debug)]
pub struct StoreCalendar {
    offset: FixedOffset,
}

impl Default for StoreCalendar {
    fn default() -> Self {
        Self::new(default_store_offset())
    }
}

impl StoreCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}

impl SmsRelayConfig {
    pub fn from_env_or_defaults() -> Self {
        let hmac_secret = env::var("SPS_SMS_HMAC_SECRET").ok().unwrap_or_default();
        let hmac_secret = Secret::new(hmac_secret);
        let hmac_checks = parse_boolean_flag(env::var("SPS_SMS_HMAC_CHECKS").ok(), !hmac_secret.is_empty());
        if hmac_checks && hmac_secret.is_empty() {
            error!(
                "🪛️ SPS_SMS_HMAC_CHECKS is on, but SPS_SMS_HMAC_SECRET is not set. Every SMS relay request will be \
                 refused."
            );
        }
        if !hmac_checks {
            warn!(
                "🪛️ Signature checks on the SMS relay endpoints are disabled. Anyone who can reach the server can \
                 submit payment notifications."
            );
        }
        let signature_tolerance =
            parse_env("SPS_SMS_SIGNATURE_TOLERANCE_SECS", DEFAULT_RELAY_SIGNATURE_TOLERANCE_SECS);
        Self { hmac_secret, hmac_checks, signature_tolerance: Duration::from_secs(signature_tolerance) }
    }
}

fn configure_gateway_whitelist() -> Option<Vec<IpAddr>> {
    let whitelist = env::var("SPS_GATEWAY_IP_WHITELIST").ok().and_then(|s| {
        if ["none", "false", "0"].contains(&s.trim().to_lowercase().as_str()) {
            info!(
                "🪛️ The gateway IP whitelist is disabled. If this is not what you want, set SPS_GATEWAY_IP_WHITELIST \
                 to a comma-separated list of IP addresses to enable it."
            );
            return None;
        }
        let ip_addrs = split_list(&s)
            .into_iter()
            .filter_map(|s| {
                IpAddr::from_str(&s)
                    .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in SPS_GATEWAY_IP_WHITELIST: {e}"))
                    .ok()
            })
            .collect::<Vec<IpAddr>>();
        Some(ip_addrs)
    });
    match &whitelist {
        Some(whitelist) if whitelist.is_empty() => {
            warn!(
                "🚨️ The gateway IP whitelist was configured, but is empty. The server will run, but won't accept any \
                 payment callbacks."
            );
        },
        None => {
            warn!("🪛️ No gateway IP whitelist is set. Payment callbacks are accepted from any address.");
        },
        Some(v) => {
            let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
            info!("🪛️ Gateway IP whitelist: {addrs}");
        },
    }
    whitelist
}

fn configure_loyalty_policy() -> LoyaltyPolicy {
    let threshold = env::var("SPS_LOYALTY_THRESHOLD")
        .ok()
        .and_then(|s| {
            Kes::from_str(&s)
                .map_err(|e| {
                    warn!("🪛️ Invalid SPS_LOYALTY_THRESHOLD ({s}). {e}. Using {DEFAULT_LOYALTY_THRESHOLD} instead.")
                })
                .ok()
        })
        .unwrap_or(DEFAULT_LOYALTY_THRESHOLD);
    let discount_percentage = parse_env("SPS_LOYALTY_DISCOUNT", DEFAULT_LOYALTY_DISCOUNT);
    let discount_percentage = if (1..=100).contains(&discount_percentage) {
        discount_percentage
    } else {
        warn!("🪛️ SPS_LOYALTY_DISCOUNT must be between 1 and 100. Using {DEFAULT_LOYALTY_DISCOUNT} instead.");
        DEFAULT_LOYALTY_DISCOUNT
    };
    let weeks = parse_env("SPS_LOYALTY_VALIDITY_WEEKS", DEFAULT_LOYALTY_VALIDITY_WEEKS);
    LoyaltyPolicy { threshold, discount_percentage, validity: Duration::from_secs(WEEK_SECS * u64::from(weeks)) }
}

fn configure_reconciliation() -> ReconciliationOptions {
    let trusted_sms_sender = env::var("SPS_TRUSTED_SMS_SENDER").ok().unwrap_or_else(|| {
        info!("🪛️ SPS_TRUSTED_SMS_SENDER is not set. Only SMS from {DEFAULT_TRUSTED_SMS_SENDER} will be processed.");
        DEFAULT_TRUSTED_SMS_SENDER.into()
    });
    let lookup_attempts = parse_env("SPS_CALLBACK_LOOKUP_ATTEMPTS", DEFAULT_LOOKUP_ATTEMPTS).max(1);
    let lookup_delay = Duration::from_millis(parse_env("SPS_CALLBACK_LOOKUP_DELAY_MS", DEFAULT_LOOKUP_DELAY_MS));
    ReconciliationOptions { trusted_sms_sender, lookup_attempts, lookup_delay }
}

fn configure_store_offset() -> FixedOffset {
    let hours = parse_env("SPS_STORE_TIMEZONE_OFFSET_HOURS", DEFAULT_STORE_TIMEZONE_OFFSET_HOURS);
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| {
        warn!("🪛️ {hours} is not a valid UTC offset. Using UTC+{DEFAULT_STORE_TIMEZONE_OFFSET_HOURS} instead.");
        default_store_offset()
    })
}

fn default_store_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_STORE_TIMEZONE_OFFSET_HOURS * 3600).unwrap_or_else(|| Utc.fix())
}

/// Reads and parses an environment variable, logging and falling back to `default` when it is missing or invalid.
fn parse_env<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}
