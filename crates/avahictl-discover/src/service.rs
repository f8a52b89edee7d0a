//! Service record types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Every resolved service the browser currently knows about, keyed by name.
pub type Snapshot = HashMap<String, Service>;

/// A service instance resolved by `avahi-browse`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Instance name, unique within a service type.
    pub name: String,
    /// Host the service runs on (e.g., "beaglebone.local").
    pub hostname: String,
    /// Service type the instance was announced under (e.g., "_http._tcp").
    pub service_type: String,
    /// IPv4 or IPv6 literal.
    pub address: String,
    /// Port number.
    pub port: u16,
    /// TXT payload with list and quote decoration removed.
    pub txt: String,
    /// Individual TXT strings, in announcement order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub txt_records: Vec<String>,
    /// Network interface the record was seen on.
    #[serde(default)]
    pub interface: String,
    /// Address family column ("IPv4" or "IPv6").
    #[serde(default)]
    pub protocol: String,
    /// Browse domain, usually "local".
    #[serde(default)]
    pub domain: String,
}

impl Service {
    /// Look up a `key=value` TXT entry.
    pub fn txt_value(&self, key: &str) -> Option<&str> {
        self.txt_records.iter().find_map(|record| {
            let (k, v) = record.split_once('=')?;
            (k == key).then_some(v)
        })
    }

    /// `address:port`, bracketing IPv6 literals.
    pub fn socket_address(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} {})", self.name, self.hostname, self.socket_address())?;
        if !self.txt.is_empty() {
            write!(f, " [{}]", self.txt)?;
        }
        Ok(())
    }
}
