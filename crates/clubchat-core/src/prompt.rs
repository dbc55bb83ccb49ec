use crate::model::{Club, Turn};

/// Maximum number of clubs rendered into the grounding block.
pub const CATALOG_EXCERPT_LIMIT: usize = 20;

/// Line emitted in place of the catalog when there are no clubs.
pub const NO_CATALOG_DATA: &str = "No club data available.";

const PREAMBLE: &str = "You are ClubChat, a friendly assistant that helps university students \
discover student clubs and organizations on campus. Answer using the club directory below. \
If the directory does not contain what the student is asking about, say so plainly and \
suggest how they could find out more. Keep answers short and specific.";

const MISSING_FIELD: &str = "N/A";

fn field_or_na<'a>(club: &'a Club, name: &str) -> &'a str {
    match club.field(name) {
        Some(v) if !v.trim().is_empty() => v.trim(),
        _ => MISSING_FIELD,
    }
}

/// Render up to [`CATALOG_EXCERPT_LIMIT`] clubs, one per line.
pub fn format_catalog(catalog: &[Club]) -> String {
    if catalog.is_empty() {
        return NO_CATALOG_DATA.to_string();
    }
    catalog
        .iter()
        .take(CATALOG_EXCERPT_LIMIT)
        .map(|club| {
            format!(
                "{} - {} - Majors: {}",
                field_or_na(club, "name"),
                field_or_na(club, "description"),
                field_or_na(club, "majors"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render turns as `Role: text` lines. Empty when there is no history.
pub fn format_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}", turn.role.title_case(), turn.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Assemble the model input: preamble, catalog, transcript, then the new message.
pub fn compose(catalog: &[Club], turns: &[Turn], message: &str) -> String {
    format!(
        "{PREAMBLE}\n\nClub directory:\n{}\n\nConversation so far:\n{}\n\nUser: {}",
        format_catalog(catalog),
        format_transcript(turns),
        message,
    )
}
