/// Collapse runs of whitespace into single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercase, drop punctuation and collapse whitespace.
///
/// Used for comparing human-entered strings such as company names.
/// Example: `"ABC  Design Group, Inc."` → `"abc design group inc"`
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    collapse_whitespace(&cleaned).to_lowercase()
}

// ---------------------------------------------------------------------------
// Jitter based on std, avoids pulling in the `rand` crate.
// Uses a simple xorshift seeded from the current time.
// ---------------------------------------------------------------------------

/// Uniform-ish random value in `[0, max_ms)`.
pub fn rand_jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    // Seed from high-resolution clock, good enough for jitter, not crypto.
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    // xorshift64
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Senior \n\t Architect  "), "Senior Architect");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("ABC  Design Group, Inc."), "abc design group inc");
        assert_eq!(normalize_text("Atlanta, GA"), normalize_text("atlanta GA"));
    }

    #[test]
    fn test_jitter_is_bounded() {
        for _ in 0..100 {
            assert!(rand_jitter_ms(50) < 50);
        }
        assert_eq!(rand_jitter_ms(0), 0);
    }
}
