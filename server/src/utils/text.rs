//! Lexicon string bounds
//!
//! Record string fields are bounded two ways at once: a grapheme-cluster
//! budget (what a person perceives as characters) and a UTF-16 code-unit
//! budget (what the wider network counts). A field passes only if it fits
//! both.

use unicode_segmentation::UnicodeSegmentation;

/// True if `s` exceeds `max_graphemes` extended grapheme clusters.
pub fn exceeds_graphemes(s: &str, max_graphemes: usize) -> bool {
    s.graphemes(true).count() > max_graphemes
}

/// True if `s` exceeds `max_units` UTF-16 code units.
pub fn exceeds_utf16(s: &str, max_units: usize) -> bool {
    s.encode_utf16().count() > max_units
}

/// True if `s` exceeds either budget.
pub fn exceeds_bounds(s: &str, max_graphemes: usize, max_units: usize) -> bool {
    exceeds_graphemes(s, max_graphemes) || exceeds_utf16(s, max_units)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_counts_once_per_byte() {
        let s = "a".repeat(64);
        assert!(!exceeds_bounds(&s, 64, 640));
        let s = "a".repeat(65);
        assert!(exceeds_bounds(&s, 64, 640));
    }

    #[test]
    fn combining_marks_collapse_into_one_grapheme() {
        // e + combining acute: one grapheme, two UTF-16 units.
        let s = "e\u{0301}".repeat(64);
        assert!(!exceeds_graphemes(&s, 64));
        assert!(exceeds_utf16(&s, 64));
        assert!(!exceeds_utf16(&s, 128));
    }

    #[test]
    fn astral_plane_counts_two_utf16_units() {
        // One emoji: one grapheme, two UTF-16 units.
        let s = "🦀".repeat(16);
        assert!(!exceeds_graphemes(&s, 16));
        assert!(exceeds_utf16(&s, 16));
        assert!(!exceeds_utf16(&s, 32));
    }

    #[test]
    fn nick_boundary() {
        assert!(!exceeds_utf16(&"x".repeat(16), 16));
        assert!(exceeds_utf16(&"x".repeat(17), 16));
    }
}
