use pretty_assertions::assert_eq;

use super::*;

fn err(code: ErrorCode, start: u32, message: &str) -> Diagnostic {
    Diagnostic::error(code)
        .with_message(message)
        .with_label(Span::new(start, start + 1), "here")
}

#[test]
fn keeps_report_order() {
    let mut queue = DiagnosticQueue::new();
    assert!(queue.report(err(ErrorCode::E1003, 40, "goto")));
    assert!(queue.report(err(ErrorCode::E1002, 10, "closure")));

    let flushed = queue.flush();
    let codes: Vec<_> = flushed.iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::E1003, ErrorCode::E1002]);
    assert_eq!(queue.error_count(), 0);
}

#[test]
fn exact_repeats_are_dropped() {
    let mut queue = DiagnosticQueue::new();
    assert!(queue.report(err(ErrorCode::E1002, 10, "closure")));
    assert!(!queue.report(err(ErrorCode::E1002, 10, "closure")));
    // Same code, different place.
    assert!(queue.report(err(ErrorCode::E1002, 20, "closure")));
    assert_eq!(queue.error_count(), 2);
}

#[test]
fn unlimited_keeps_repeats() {
    let mut queue = DiagnosticQueue::with_config(DiagnosticConfig::unlimited());
    assert!(queue.report(err(ErrorCode::E1002, 10, "closure")));
    assert!(queue.report(err(ErrorCode::E1002, 10, "closure")));
    assert_eq!(queue.flush().len(), 2);
}

#[test]
fn error_limit_appends_summary() {
    let mut queue = DiagnosticQueue::with_config(DiagnosticConfig {
        error_limit: 2,
        deduplicate: true,
    });
    for start in 0..5 {
        queue.report(err(ErrorCode::E1007, start * 10, "nested"));
    }
    assert!(queue.limit_reached());

    let flushed = queue.flush();
    assert_eq!(flushed.len(), 3);
    assert_eq!(flushed[2].code, ErrorCode::E9002);
    assert_eq!(flushed[2].notes, vec!["3 further error(s) were not reported"]);
}

#[test]
fn warnings_do_not_count() {
    let mut queue = DiagnosticQueue::new();
    assert!(queue.report(Diagnostic::warning(ErrorCode::E3001).with_message("w")));
    assert!(queue.has_errors().is_none());
    let _proof = queue.emit_error(err(ErrorCode::E3001, 0, "e"));
    assert!(queue.has_errors().is_some());
    assert_eq!(queue.peek().count(), 2);
}

#[test]
fn vec_sink_keeps_everything() {
    let mut sink: Vec<Diagnostic> = Vec::new();
    sink.report(err(ErrorCode::E2001, 0, "a"));
    sink.report(err(ErrorCode::E2001, 0, "a"));
    assert_eq!(sink.len(), 2);
}
