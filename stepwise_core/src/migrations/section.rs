use regex::Regex;
use std::sync::OnceLock;

static MARKER_RE: OnceLock<Regex> = OnceLock::new();

fn marker_regex() -> &'static Regex {
    MARKER_RE.get_or_init(|| Regex::new(r"(?im)^--[ \t]*(UP|DOWN)[ \t]*\r?$").expect("valid regex"))
}

/// The two halves of a migration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Applied by `migrate`.
    Up,
    /// Applied by `rollback`.
    Down,
}

impl Section {
    fn matches(&self, marker: &str) -> bool {
        match self {
            Section::Up => marker.eq_ignore_ascii_case("UP"),
            Section::Down => marker.eq_ignore_ascii_case("DOWN"),
        }
    }
}

/// Returns the trimmed body following the first `-- UP` / `-- DOWN` marker
/// line, up to the next marker of either kind or the end of the text.
///
/// Markers are matched case-insensitively and must sit on their own line.
/// Returns `None` when the marker is absent.
///
/// ```
/// use stepwise_core::migrations::{Section, extract_section};
///
/// let sql = "-- UP\nA;\n\n-- DOWN\nB;\n";
/// assert_eq!(extract_section(sql, Section::Up), Some("A;"));
/// assert_eq!(extract_section(sql, Section::Down), Some("B;"));
/// ```
pub fn extract_section(sql: &str, section: Section) -> Option<&str> {
    let mut markers = marker_regex().captures_iter(sql);
    let start = markers.find_map(|captures| {
        let (whole, kind) = (captures.get(0)?, captures.get(1)?);
        section.matches(kind.as_str()).then_some(whole.end())
    })?;
    let end = markers
        .next()
        .and_then(|captures| captures.get(0))
        .map(|marker| marker.start())
        .unwrap_or(sql.len());
    Some(sql[start..end].trim())
}
