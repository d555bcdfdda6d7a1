//! Helpers for turning client-supplied filenames into safe archive names.
//!
//! Upload names are untrusted: browsers may send full paths, Windows
//! separators or `..` segments. Only the final component survives.

const FALLBACK_NAME: &str = "file";

/// Returns only the last path component of a client filename, with control
/// characters removed. Empty or dot-only names become `"file"`.
pub fn client_filename(raw: &str) -> String {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let cleaned: String = last.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Filename without its final extension. A leading dot does not count as an
/// extension separator (`.profile` stays `.profile`).
pub fn basename(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => &name[..dot_pos],
        _ => name,
    }
}

/// Archive entry name for one output of an input file. `page` is set when a
/// single input produced several outputs.
pub fn output_name(input_name: &str, extension: &str, page: Option<usize>) -> String {
    let safe = client_filename(input_name);
    let base = basename(&safe);

    match page {
        Some(page) => format!("{}_page{}.{}", base, page, extension),
        None => format!("{}.{}", base, extension),
    }
}
