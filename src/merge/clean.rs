//! Cleanup of raw recognizer output.

/// Unknown-token marker emitted by the recognizer.
const UNKNOWN_TOKEN: &str = "<unk>";

/// Prefix of inline entity-boundary markers such as `#nonterm:NAME `.
const ENTITY_MARKER: &str = "#nonterm:";

/// Removes recognizer artifacts from `text`.
///
/// Strips `<unk>` tokens and `#nonterm:...` entity markers (with the space that
/// closes them), glues apostrophes back onto the following word (`l' homme` →
/// `l'homme`), collapses runs of whitespace and trims the result.
pub fn clean_text(text: &str) -> String {
    let text = text.replace(UNKNOWN_TOKEN, "");
    let text = strip_entity_markers(&text);
    let text = text.replace("' ", "'");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Removes every `#nonterm:<non-space>* ` occurrence.
///
/// A marker with no closing space (at the very end of the text) is kept.
fn strip_entity_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(ENTITY_MARKER) {
        let after = &rest[pos + ENTITY_MARKER.len()..];
        match after.find(' ') {
            Some(space) => {
                out.push_str(&rest[..pos]);
                rest = &after[space + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);
    out
}
