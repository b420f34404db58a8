//! Cache key derivation.
//!
//! A `Descriptor` identifies a logical request (data kind, device serial
//! number, time bucket, parameter fingerprint) before key derivation. Key
//! building is pure: the same descriptor always yields the same key, and
//! parameter fingerprints are order-independent, so requests that differ
//! only in parameter order or sub-bucket timing collapse to one entry.

use chrono::{ DateTime, Utc };
use sha2::{ Digest, Sha256 };

/// Hex characters kept from a SHA-256 parameter digest
const FINGERPRINT_LEN: usize = 32;

// =============================================================================
// DATA KINDS
// =============================================================================

/// Categories of data served by the FoxESS cloud, each with its own
/// default TTL and bucketing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Realtime,
    Historical,
    Diagnosis,
    Forecast,
    DeviceInfo,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Realtime => "realtime",
            DataKind::Historical => "historical",
            DataKind::Diagnosis => "diagnosis",
            DataKind::Forecast => "forecast",
            DataKind::DeviceInfo => "device_info",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// TIME BUCKETS
// =============================================================================

/// Floor a timestamp to the start of its minute, as epoch seconds.
pub fn minute_bucket(now: DateTime<Utc>) -> i64 {
    let ts = now.timestamp();
    ts - ts.rem_euclid(60)
}

/// Floor a timestamp to the start of its hour, as epoch seconds.
pub fn hour_bucket(now: DateTime<Utc>) -> i64 {
    let ts = now.timestamp();
    ts - ts.rem_euclid(3600)
}

/// Floor a timestamp to the start of its UTC day, as epoch seconds.
pub fn day_bucket(now: DateTime<Utc>) -> i64 {
    let ts = now.timestamp();
    ts - ts.rem_euclid(86400)
}

// =============================================================================
// FINGERPRINTS
// =============================================================================

/// Order-independent digest of semantic request parameters.
/// Equal parameter sets in any order produce the same fingerprint.
pub fn params_fingerprint(params: &[(&str, &str)]) -> String {
    let mut pairs: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    pairs.sort();
    short_hash(&pairs.join("|"))
}

/// Canonical form of a variable selection: sorted and comma-joined,
/// "all" when the caller did not restrict the set.
pub fn variables_fingerprint(variables: &[&str]) -> String {
    if variables.is_empty() {
        return "all".to_string();
    }
    let mut vars: Vec<&str> = variables.to_vec();
    vars.sort_unstable();
    vars.join(",")
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..FINGERPRINT_LEN].to_string()
}

// =============================================================================
// DESCRIPTORS
// =============================================================================

/// Logical identifier of a requested value before key derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub kind: DataKind,
    pub device_sn: String,
    pub bucket: String,
    pub fingerprint: String,
}

impl Descriptor {
    pub fn new(
        kind: DataKind,
        device_sn: impl Into<String>,
        bucket: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            device_sn: device_sn.into(),
            bucket: bucket.into(),
            fingerprint: fingerprint.into(),
        }
    }

    /// Realtime queries collapse to one key per device, minute and
    /// variable selection.
    pub fn realtime(device_sn: &str, variables: &[&str], now: DateTime<Utc>) -> Self {
        Self::new(
            DataKind::Realtime,
            device_sn,
            minute_bucket(now).to_string(),
            variables_fingerprint(variables),
        )
    }

    /// Historical ranges are fully identified by their parameters; the
    /// range goes into the fingerprint and the bucket stays fixed.
    pub fn historical(
        device_sn: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        variables: &[&str],
        dimension: &str,
    ) -> Self {
        let start = start.to_rfc3339();
        let end = end.to_rfc3339();
        let vars = variables_fingerprint(variables);
        let fingerprint = params_fingerprint(&[
            ("start", &start),
            ("end", &end),
            ("variables", &vars),
            ("dimension", dimension),
        ]);
        Self::new(DataKind::Historical, device_sn, "range", fingerprint)
    }

    /// Diagnosis results are reusable within the hour they ran.
    pub fn diagnosis(device_sn: &str, check_type: &str, now: DateTime<Utc>) -> Self {
        Self::new(
            DataKind::Diagnosis,
            device_sn,
            hour_bucket(now).to_string(),
            check_type,
        )
    }

    /// Forecasts are stable for a day; weather integration changes the key.
    pub fn forecast(
        device_sn: &str,
        forecast_type: &str,
        with_weather: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let weather = if with_weather { "weather" } else { "no_weather" };
        Self::new(
            DataKind::Forecast,
            device_sn,
            day_bucket(now).to_string(),
            format!("{}:{}", forecast_type, weather),
        )
    }

    /// Device metadata has no time dimension.
    pub fn device_info(device_sn: &str) -> Self {
        Self::new(DataKind::DeviceInfo, device_sn, "static", "info")
    }

    /// Derive the cache key for this descriptor.
    pub fn cache_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.kind.as_str(),
            self.device_sn,
            self.bucket,
            self.fingerprint
        )
    }

    /// Device serial number segment of a derived key, used for
    /// device-scoped invalidation.
    pub fn device_of_key(key: &str) -> Option<&str> {
        key.split(':').nth(1)
    }
}
