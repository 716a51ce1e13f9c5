//! Cache key construction.
//!
//! ## Key Format
//!
//! ```text
//! cache:region:{region_len}:{region}:v{version}:{logical_key}
//! cache:region:{region_len}:{region}:version
//! ```
//!
//! The region is length-prefixed so a region name containing `:v` cannot
//! alias another region's keys. The version is all digits and ends at the
//! next `:`, so everything after it belongs to the logical key.

const REGION_PREFIX: &str = "cache:region:";

/// Builds the fully-qualified key for an entry.
///
/// Equal output iff region, version and logical key are all equal.
pub fn build_key(region: &str, version: u64, logical_key: &str) -> String {
    format!(
        "{REGION_PREFIX}{}:{region}:v{version}:{logical_key}",
        region.len()
    )
}

/// Builds the key under which a region's current version is mirrored to
/// the shared tier.
pub fn region_version_key(region: &str) -> String {
    format!("{REGION_PREFIX}{}:{region}:version", region.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_key_is_deterministic() {
        assert_eq!(
            build_key("listings", 1, "bounds:10:20:30:40"),
            build_key("listings", 1, "bounds:10:20:30:40")
        );
        assert_eq!(
            build_key("listings", 7, "page=1"),
            "cache:region:8:listings:v7:page=1"
        );
    }

    #[test]
    fn build_key_distinguishes_each_component() {
        assert_ne!(build_key("a", 1, "x"), build_key("a", 1, "y"));
        assert_ne!(build_key("a", 1, "x"), build_key("a", 2, "x"));
        assert_ne!(build_key("a", 1, "x"), build_key("b", 1, "x"));
    }

    #[test]
    fn separators_inside_components_do_not_collide() {
        // Without the length prefix both of these would read
        // "cache:region:a:v1:v2:x".
        assert_ne!(build_key("a", 1, "v2:x"), build_key("a:v1", 2, "x"));
        assert_ne!(build_key("a:", 1, "x"), build_key("a", 1, ":x"));
        assert_ne!(build_key("", 11, "x"), build_key("", 1, "1:x"));
    }

    #[test]
    fn version_key_never_matches_entry_key() {
        for v in [1, 2, 1_700_000_000_000] {
            assert_ne!(region_version_key("map-search"), build_key("map-search", v, ""));
            assert_ne!(
                region_version_key("map-search"),
                build_key("map-search", v, "version")
            );
        }
    }
}
