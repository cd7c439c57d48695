//! Lyric postprocessing: raw model output → performable lines.
//!
//! Generation models pad their output with section headers ("Verse 1:",
//! "Chorus:") and short interjections that sound wrong when spoken straight
//! through. Keep only real lines, in order, capped to one performance.

/// Upper bound on lines per performance.
pub const MAX_LINES: usize = 12;

/// Lines with fewer words than this are interjections, not lyrics.
const MIN_LINE_WORDS: usize = 3;

const SECTION_MARKERS: [&str; 2] = ["Verse", "Chorus"];

/// Filter raw generated text down to a performable script.
///
/// Drops section headers (any line containing "Verse", "Chorus", or a colon)
/// and lines with fewer than three words, preserving input order, and keeps
/// at most [`MAX_LINES`] lines. Empty input yields an empty script.
pub fn clean_lyrics(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !SECTION_MARKERS.iter().any(|marker| line.contains(marker)))
        .filter(|line| !line.contains(':'))
        .filter(|line| line.split_whitespace().count() >= MIN_LINE_WORDS)
        .map(str::to_string)
        .take(MAX_LINES)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_section_headers_and_short_lines() {
        let raw = "Verse 1:\nYou better lose yourself\nChorus:\nSing it\nIn the moment you own it";
        assert_eq!(
            clean_lyrics(raw),
            vec!["You better lose yourself", "In the moment you own it"]
        );
    }

    #[test]
    fn drops_any_line_with_a_colon() {
        let raw = "Hook: here we go now\nThis line stays in the script";
        assert_eq!(clean_lyrics(raw), vec!["This line stays in the script"]);
    }

    #[test]
    fn keeps_at_most_max_lines_in_input_order() {
        let raw: String = (0..20)
            .map(|i| format!("line number {i} keeps going\n"))
            .collect();
        let script = clean_lyrics(&raw);
        assert_eq!(script.len(), MAX_LINES);
        assert_eq!(script[0], "line number 0 keeps going");
        assert_eq!(script[11], "line number 11 keeps going");
    }

    #[test]
    fn empty_input_yields_empty_script() {
        assert!(clean_lyrics("").is_empty());
        assert!(clean_lyrics("\n\n").is_empty());
    }

    #[test]
    fn word_count_boundary_is_three() {
        assert!(clean_lyrics("two words").is_empty());
        assert_eq!(clean_lyrics("exactly three words"), vec!["exactly three words"]);
    }

    #[test]
    fn case_sensitive_markers_only() {
        // Lowercase "verse" is not a section marker.
        assert_eq!(
            clean_lyrics("spitting a verse for the crowd"),
            vec!["spitting a verse for the crowd"]
        );
        assert!(clean_lyrics("Verse two begins right here").is_empty());
    }
}
