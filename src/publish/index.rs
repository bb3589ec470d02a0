//! Index page entries.

use super::template::IndexEntry;

/// Version token of a manifest key: text after the last `-`, minus `.plist`.
///
/// `com.app.foo-2.3.5.plist` → `2.3.5`
pub fn version_token(key: &str) -> &str {
    let stem = key.strip_suffix(".plist").unwrap_or(key);
    stem.rsplit('-').next().unwrap_or(stem)
}

/// One entry per manifest key found in the store, in listing order.
///
/// Titles pair the current display name with each key's version token, so
/// every row of a branch's page carries today's app name.
pub fn entries_for_all_versions<F>(keys: &[String], display_name: &str, url_for: F) -> Vec<IndexEntry>
where
    F: Fn(&str) -> String,
{
    keys.iter()
        .filter(|key| key.ends_with("plist"))
        .map(|key| IndexEntry {
            url: url_for(key),
            title: format!("{}-{}", display_name, version_token(key)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_trailing_version() {
        assert_eq!(version_token("com.app.foo-2.3.5.plist"), "2.3.5");
        assert_eq!(version_token("my-app-id-1.0.0.plist"), "1.0.0");
        assert_eq!(version_token("noversion.plist"), "noversion");
    }

    #[test]
    fn lists_only_manifests_with_titles_from_tokens() {
        let keys = vec![
            "id-1.0.0.ipa".to_string(),
            "id-1.0.0.plist".to_string(),
            "id-1.0.1.ipa".to_string(),
            "id-1.0.1.plist".to_string(),
            "index.html".to_string(),
        ];
        let entries = entries_for_all_versions(&keys, "App", |k| format!("https://b/{}", k));

        assert_eq!(
            entries,
            vec![
                IndexEntry {
                    url: "https://b/id-1.0.0.plist".into(),
                    title: "App-1.0.0".into(),
                },
                IndexEntry {
                    url: "https://b/id-1.0.1.plist".into(),
                    title: "App-1.0.1".into(),
                },
            ]
        );
    }
}
