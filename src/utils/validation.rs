/// Strips a client supplied file name down to a safe path segment.
///
/// Keeps ASCII letters, digits, underscores, periods and whitespace; everything
/// else is dropped. An input made only of rejected characters yields an empty
/// string, which callers must handle themselves.
pub fn sanitize_filename(raw: &str) -> String {
    raw.chars().filter(|c| is_allowed_char(*c)).collect()
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.' || c.is_ascii_whitespace()
}

/// Extracts the quoted name from a header of the form
/// `attachment; filename="<name>"`.
pub fn parse_disposition_filename(header: &str) -> Option<&str> {
    let rest = header.strip_prefix("attachment; filename=\"")?;
    let end = rest.find('"')?;
    let name = &rest[..end];
    if name.is_empty() { None } else { Some(name) }
}
