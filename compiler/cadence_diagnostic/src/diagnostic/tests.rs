use pretty_assertions::assert_eq;

use super::*;

#[test]
fn builder_collects_parts() {
    let diag = Diagnostic::error(ErrorCode::E1002)
        .with_message("`suspend` inside a closure")
        .with_label(Span::new(4, 9), "suspends here")
        .with_secondary_label(Span::new(0, 20), "closure defined here")
        .with_note("closures are not segmented")
        .with_suggestion("extract the suspending closure into a named procedure");

    assert_eq!(diag.code, ErrorCode::E1002);
    assert!(diag.is_error());
    assert_eq!(diag.labels.len(), 2);
    assert!(diag.labels[0].is_primary);
    assert!(!diag.labels[1].is_primary);
    assert_eq!(diag.primary_span(), Some(Span::new(4, 9)));
    assert_eq!(diag.notes.len(), 1);
    assert_eq!(diag.suggestions.len(), 1);
}

#[test]
fn warning_is_not_error() {
    let diag = Diagnostic::warning(ErrorCode::E3001).with_message("w");
    assert!(!diag.is_error());
    assert_eq!(diag.primary_span(), None);
}

#[test]
fn display_format() {
    let diag = Diagnostic::error(ErrorCode::E2001)
        .with_message("unrecognized suspension operand")
        .with_label(Span::new(0, 5), "primary")
        .with_secondary_label(Span::new(10, 15), "secondary")
        .with_note("a note")
        .with_suggestion("a hint");

    assert_eq!(
        diag.to_string(),
        "error [E2001]: unrecognized suspension operand\n  --> 0..5: primary\n      10..15: secondary\n  = note: a note\n  = help: a hint"
    );
}

#[test]
fn diagnostics_hash_and_compare() {
    use std::collections::HashSet;

    let d1 = Diagnostic::error(ErrorCode::E1001).with_message("x");
    let d2 = Diagnostic::error(ErrorCode::E1001).with_message("x");
    let d3 = Diagnostic::error(ErrorCode::E1003).with_message("y");

    assert_eq!(d1, d2);
    assert_ne!(d1, d3);

    let mut set = HashSet::new();
    set.insert(d1);
    set.insert(d2);
    set.insert(d3);
    assert_eq!(set.len(), 2);
}
