use crate::state::ANONYMOUS_IDENTIFIER;

/// Loose shape check: `local@domain.tld`, no whitespace, exactly one `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Throttling key for a form submission: the trimmed e-mail, or
/// [`ANONYMOUS_IDENTIFIER`] when none was given.
pub fn rate_limit_identifier(email: Option<&str>) -> &str {
    match email.map(str::trim) {
        Some(e) if !e.is_empty() => e,
        _ => ANONYMOUS_IDENTIFIER,
    }
}
