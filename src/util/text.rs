use std::borrow::Cow;

/// SEC-001: Removes control characters before sitemap-supplied text reaches the
/// terminal.
///
/// Sitemap contents are attacker-controlled; an embedded `ESC` could recolor or
/// rewrite the operator's terminal. Every Unicode control character is dropped,
/// which neutralizes escape sequences by removing their introducer.
///
/// Returns `Cow::Borrowed` when nothing needs removing.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(char::is_control) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(s.chars().filter(|c| !c.is_control()).collect())
}
