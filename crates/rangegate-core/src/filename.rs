//! Download filenames.

/// Name used when neither contributors nor title survive sanitizing.
const FALLBACK_NAME: &str = "track";

/// Build the `Content-Disposition` filename for a download.
///
/// The stem is `"{contributors joined by ", "} - {title}"`, or whichever part
/// is present, reduced to alphanumerics and ` .,_-`. The extension comes from
/// the MIME subtype: `mpeg` becomes `.mp3`, `wav` and `x-wav` become `.wav`,
/// anything else is used verbatim.
///
/// # Examples
///
/// ```
/// use rangegate_core::filename::download_filename;
///
/// let name = download_filename(Some("Song"), &["A".into(), "B".into()], Some("audio/mpeg"));
/// assert_eq!(name, "A, B - Song.mp3");
/// assert_eq!(download_filename(None, &[], None), "track");
/// ```
#[must_use]
pub fn download_filename(title: Option<&str>, contributors: &[String], mime: Option<&str>) -> String {
    let title = title.unwrap_or_default();
    let people = contributors.join(", ");
    let stem = match (people.is_empty(), title.is_empty()) {
        (false, false) => format!("{people} - {title}"),
        (false, true) => people,
        (true, _) => title.to_owned(),
    };

    let safe: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '.' | ',' | '_' | '-'))
        .collect();
    let safe = safe.trim();
    let safe = if safe.is_empty() { FALLBACK_NAME } else { safe };

    format!("{safe}{}", extension_for(mime))
}

fn extension_for(mime: Option<&str>) -> String {
    let Some((_, subtype)) = mime.and_then(|m| m.split_once('/')) else {
        return String::new();
    };
    let subtype = subtype.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match subtype.as_str() {
        "" => String::new(),
        "mpeg" => ".mp3".to_owned(),
        "wav" | "x-wav" => ".wav".to_owned(),
        other => format!(".{other}"),
    }
}
