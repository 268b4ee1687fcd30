pub mod domain {
    use std::fmt;

    use serde::{Deserialize, Deserializer, Serialize};
    use serde_json::Value;

    use crate::error::{MonitorError, Result};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum IpFamily {
        Ipv4,
        Ipv6,
    }

    impl IpFamily {
        pub const ALL: [IpFamily; 2] = [IpFamily::Ipv4, IpFamily::Ipv6];

        /// Argument understood by the stats command.
        pub fn as_arg(self) -> &'static str {
            match self {
                IpFamily::Ipv4 => "ipv4",
                IpFamily::Ipv6 => "ipv6",
            }
        }

        /// Prefix of the element keys rendered for this family.
        pub fn key_prefix(self) -> &'static str {
            match self {
                IpFamily::Ipv4 => "",
                IpFamily::Ipv6 => "ipv6-",
            }
        }
    }

    impl fmt::Display for IpFamily {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_arg())
        }
    }

    /// Counters accept any JSON number; null or non-numeric values read as 0.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct DirectionStats {
        #[serde(default, deserialize_with = "lenient_rate")]
        pub rate: f64,
        #[serde(default, deserialize_with = "lenient_count")]
        pub total_bytes: u64,
        #[serde(default, deserialize_with = "lenient_count")]
        pub total_packets: u64,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HostSpeedRecord {
        pub ip: String,
        #[serde(default, deserialize_with = "lenient_direction")]
        pub incoming: DirectionStats,
        #[serde(default, deserialize_with = "lenient_direction")]
        pub outgoing: DirectionStats,
    }

    fn lenient_rate<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
        Ok(Value::deserialize(d)?
            .as_f64()
            .filter(|f| f.is_finite())
            .unwrap_or(0.0))
    }

    fn lenient_count<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
        let value = Value::deserialize(d)?;
        // float to int casts saturate
        Ok(value
            .as_u64()
            .or_else(|| value.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0))
    }

    fn lenient_direction<'de, D: Deserializer<'de>>(
        d: D,
    ) -> std::result::Result<DirectionStats, D::Error> {
        Ok(Option::<DirectionStats>::deserialize(d)?.unwrap_or_default())
    }

    impl HostSpeedRecord {
        pub fn is_idle(&self) -> bool {
            self.incoming.total_bytes == 0 && self.outgoing.total_bytes == 0
        }
    }

    /// Output of `<stats-cmd> <family> json`.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct PollResponse {
        pub status: String,
        pub data: Vec<HostSpeedRecord>,
    }

    impl PollResponse {
        pub fn empty() -> Self {
            Self {
                status: "success".to_string(),
                data: Vec::new(),
            }
        }

        /// Accepts only `{"status": "success", "data": [...]}`. Records that
        /// cannot be read are logged and left out.
        pub fn from_value(value: &Value) -> Result<Self> {
            let status = value.get("status").and_then(Value::as_str);
            if status != Some("success") {
                return Err(MonitorError::InvalidResponse(format!(
                    "status is {}",
                    status.unwrap_or("missing")
                )));
            }

            let Some(Value::Array(items)) = value.get("data") else {
                return Err(MonitorError::InvalidResponse("data is not a list".to_string()));
            };

            let data = items
                .iter()
                .filter_map(|item| match HostSpeedRecord::deserialize(item) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(error = %e, record = %item, "skipping host record");
                        None
                    }
                })
                .collect();

            Ok(Self {
                status: "success".to_string(),
                data,
            })
        }
    }
}

pub mod dto {
    use serde::{Deserialize, Serialize};

    /// Drill-down request for one host, as sent by a tooltip anchor.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct DetailRequest {
        /// MAC or IP address the anchor points at.
        pub key: String,
        /// Column the detail rows are grouped by.
        pub col: String,
        /// Column header, defaults to `col`.
        #[serde(default)]
        pub label: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct OuiResponse {
        pub mac: String,
        pub vendor: Option<String>,
    }
}
