//! IP → coarse region
//!
//! - MaxMind GeoLite2 local database
//! - external HTTP API fallback (ip-api.com)

mod external_api;
mod maxmind;
mod provider;

pub use provider::{GeoInfo, GeoIpLookup, GeoIpProvider};
