//! Static provider table.
//!
//! The order of `PROVIDERS` is significant: fan-out results are merged in
//! this order and every provider picker lists them in this order.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Sentinel source id meaning "query every provider".
pub const SOURCE_ALL: &str = "all";

/// Label used when a song or playlist carries no source at all.
pub const UNKNOWN_SOURCE_LABEL: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provider {
    pub id: &'static str,
    pub display_name: &'static str,
}

pub const PROVIDERS: &[Provider] = &[
    Provider { id: "netease", display_name: "NetEase Cloud Music" },
    Provider { id: "qq", display_name: "QQ Music" },
    Provider { id: "kugou", display_name: "Kugou" },
    Provider { id: "kuwo", display_name: "Kuwo" },
    Provider { id: "migu", display_name: "Migu" },
    Provider { id: "qianqian", display_name: "Qianqian" },
    Provider { id: "soda", display_name: "Soda Music" },
    Provider { id: "fivesing", display_name: "5sing" },
    Provider { id: "jamendo", display_name: "Jamendo" },
    Provider { id: "joox", display_name: "JOOX" },
    Provider { id: "bilibili", display_name: "Bilibili" },
];

/// Identifier of a music provider as used in `?source=` query parameters.
#[derive(Eq, PartialEq, Clone, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the `"all"` sentinel, which never names a concrete provider.
    pub fn is_all(&self) -> bool {
        self.0 == SOURCE_ALL
    }
}

impl From<&str> for ProviderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProviderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl Deref for ProviderId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// All provider ids in table order.
pub fn provider_ids() -> Vec<ProviderId> {
    PROVIDERS.iter().map(|p| ProviderId::from(p.id)).collect()
}

pub fn find(id: &str) -> Option<&'static Provider> {
    PROVIDERS.iter().find(|p| p.id == id)
}

/// Human-readable name for a source id.
///
/// Unknown ids are shown verbatim; a missing or empty id gets a placeholder.
pub fn display_name(id: Option<&str>) -> String {
    match id {
        Some(id) if !id.is_empty() => find(id)
            .map(|p| p.display_name.to_string())
            .unwrap_or_else(|| id.to_string()),
        _ => UNKNOWN_SOURCE_LABEL.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_is_stable() {
        let ids: Vec<&str> = PROVIDERS.iter().map(|p| p.id).collect();
        assert_eq!(ids.first(), Some(&"netease"));
        assert_eq!(ids.last(), Some(&"bilibili"));
        assert_eq!(ids.len(), 11);
        assert!(!ids.contains(&SOURCE_ALL));
    }

    #[test]
    fn display_name_falls_back() {
        assert_eq!(display_name(Some("qq")), "QQ Music");
        assert_eq!(display_name(Some("spotify")), "spotify");
        assert_eq!(display_name(Some("")), UNKNOWN_SOURCE_LABEL);
        assert_eq!(display_name(None), UNKNOWN_SOURCE_LABEL);
    }

    #[test]
    fn provider_id_all_sentinel() {
        assert!(ProviderId::from("all").is_all());
        assert!(!ProviderId::from("kuwo").is_all());
    }
}
