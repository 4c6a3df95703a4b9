//! SourceResolver: pick the provider an action applies to.
//!
//! Actions on a song or playlist use the fallback chain
//! `[item.source, current playlist source, selected source]`.

use music_proto::providers::SOURCE_ALL;

/// First candidate that is present, non-empty, and not the `"all"` sentinel.
pub fn resolve<'a>(candidates: &[Option<&'a str>]) -> Option<&'a str> {
    candidates
        .iter()
        .flatten()
        .copied()
        .find(|c| !c.is_empty() && *c != SOURCE_ALL)
}

/// The standard chain for an item shown in the UI.
pub fn resolve_for_item<'a>(
    item_source: Option<&'a str>,
    current_playlist_source: Option<&'a str>,
    selected_source: &'a str,
) -> Option<&'a str> {
    resolve(&[item_source, current_playlist_source, Some(selected_source)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skips_missing_and_all() {
        assert_eq!(resolve(&[None, Some("all"), Some("netease")]), Some("netease"));
        assert_eq!(resolve(&[Some("all"), Some("all")]), None);
        assert_eq!(resolve(&[]), None);
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        assert_eq!(resolve(&[Some(""), Some("kugou")]), Some("kugou"));
    }

    #[test]
    fn test_first_concrete_wins() {
        assert_eq!(resolve(&[Some("qq"), Some("kuwo")]), Some("qq"));
        assert_eq!(resolve_for_item(None, Some("migu"), "all"), Some("migu"));
        assert_eq!(resolve_for_item(Some("joox"), Some("migu"), "qq"), Some("joox"));
        assert_eq!(resolve_for_item(None, None, "all"), None);
    }
}
