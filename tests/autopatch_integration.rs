//! Integration tests for the patch pipeline
//!
//! Drives completions through parse, validate, apply and commit against a
//! shared feeder, and checks what subscribers and readers observe.

use lab_cockpit::brain::Brain;
use lab_cockpit::feeder::{Budget, BufferVersion, CodeBuffer, CodeFeeder, LineId, LineSpan};
use lab_cockpit::patch::{Autopatcher, PatchOutcome, PatchRequest, RejectReason, Stage};
use std::sync::Arc;
use std::thread;

fn setup(text: &str) -> (Arc<CodeFeeder>, Autopatcher) {
    let feeder = Arc::new(CodeFeeder::load_buffer(text));
    let patcher = Autopatcher::new(Arc::clone(&feeder));
    (feeder, patcher)
}

fn request(feeder: &CodeFeeder, text: &str) -> PatchRequest {
    PatchRequest::new(Brain::Scriptor, feeder.snapshot_version(), text)
}

fn lines(feeder: &CodeFeeder) -> Vec<String> {
    feeder
        .snapshot()
        .iter()
        .map(|(_, text)| text.to_string())
        .collect()
}

#[test]
fn completion_with_prose_and_several_blocks() {
    let (feeder, patcher) = setup("fn main() {\n    let x = 1;\n    println!(\"{}\", x);\n}\n");
    let completion = r#"Here is the fix:

<<<PATCH
REPLACE "let x = 1;"
    let x = 2;
PATCH>>>

And a trailing comment:

<<<PATCH
INSERT AFTER #4
// done
PATCH>>>
"#;

    let outcome = patcher.apply(&request(&feeder, completion));
    let PatchOutcome::Committed(commit) = outcome else {
        panic!("expected commit, got {outcome:?}");
    };
    assert_eq!(commit.version, BufferVersion(1));
    assert_eq!(commit.operations, 2);
    assert_eq!(
        feeder.serialize(),
        "fn main() {\n    let x = 2;\n    println!(\"{}\", x);\n}\n// done\n"
    );
}

#[test]
fn subscribers_see_one_event_per_commit() {
    let (feeder, patcher) = setup("a\nb\nc\nd\ne");
    let mut events = feeder.subscribe();

    let outcome = patcher.apply(&request(&feeder, "<<<PATCH\nREPLACE \"b\" TO \"c\"\nB\nC\nPATCH>>>"));
    assert!(outcome.is_committed());
    assert_eq!(lines(&feeder), vec!["a", "B", "C", "d", "e"]);

    let event = events.try_recv().unwrap();
    assert_eq!(event.version, BufferVersion(1));
    assert_eq!(event.line_count, 5);
    assert_eq!(event.affected, Some(LineSpan::new(LineId(6), LineId(7))));
    assert_eq!(event.edits.len(), 1);
    assert_eq!(
        event.edits[0].old,
        Some(LineSpan::new(LineId(2), LineId(3)))
    );

    // Rejections publish nothing.
    let rejected = patcher.apply(&request(&feeder, "<<<PATCH\nDELETE #2\nPATCH>>>"));
    assert!(!rejected.is_committed());
    assert!(events.try_recv().is_err());
}

#[test]
fn stale_request_against_moved_lines() {
    let (feeder, patcher) = setup("one\ntwo\nthree");
    let stale = request(&feeder, "<<<PATCH\nREPLACE #2\nTWO\nPATCH>>>");

    // Another writer replaces line #2 first.
    let first = patcher.apply(&request(&feeder, "<<<PATCH\nREPLACE #2\n2\nPATCH>>>"));
    assert!(first.is_committed());

    let outcome = patcher.apply(&stale);
    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.stage, Stage::Validating);
    assert!(rejection.reason.is_stale());
    assert_eq!(feeder.snapshot_version(), BufferVersion(1));
    assert_eq!(lines(&feeder), vec!["one", "2", "three"]);
}

#[test]
fn stale_request_untouched_lines_still_apply() {
    let (feeder, patcher) = setup("one\ntwo\nthree");
    let old = request(&feeder, "<<<PATCH\nDELETE #3\nPATCH>>>");

    assert!(patcher
        .apply(&request(&feeder, "<<<PATCH\nREPLACE #1\nONE\nPATCH>>>"))
        .is_committed());

    let outcome = patcher.apply(&old);
    assert_eq!(outcome.version(), Some(BufferVersion(2)));
    assert_eq!(lines(&feeder), vec!["ONE", "two"]);
}

#[test]
fn user_line_inside_an_old_range_is_not_overwritten() {
    let (feeder, patcher) = setup("a\nb\nc\nd\ne");
    let old = request(&feeder, "<<<PATCH\nREPLACE #2 TO #4\nX\nPATCH>>>");

    assert!(patcher
        .apply(&request(&feeder, "<<<PATCH\nINSERT AFTER #2\nUSER\nPATCH>>>"))
        .is_committed());

    let outcome = patcher.apply(&old);
    let rejection = outcome.rejection().unwrap();
    assert_eq!(rejection.stage, Stage::Validating);
    assert!(rejection.reason.is_stale());
    assert_eq!(feeder.snapshot_version(), BufferVersion(1));
    assert_eq!(lines(&feeder), vec!["a", "b", "USER", "c", "d", "e"]);
}

#[test]
fn ambiguous_text_anchor_is_refused() {
    let (feeder, patcher) = setup("x = 1\ny = 2\nx = 1");
    let outcome = patcher.apply(&request(&feeder, "<<<PATCH\nDELETE \"x = 1\"\nPATCH>>>"));

    let rejection = outcome.rejection().unwrap();
    assert!(matches!(
        &rejection.reason,
        RejectReason::ValidationFailed(detail) if detail.starts_with("ambiguous anchor")
    ));
    assert_eq!(rejection.offending_operation, Some(0));
    assert_eq!(feeder.snapshot_version(), BufferVersion(0));
}

#[test]
fn unbalanced_replacement_is_refused() {
    let feeder = Arc::new(CodeFeeder::new(
        CodeBuffer::load("fn f() {\n    g();\n}\n").with_source("lib.rs"),
    ));
    let patcher = Autopatcher::new(Arc::clone(&feeder));
    let outcome = patcher.apply(&request(&feeder, "<<<PATCH\nREPLACE #2\n    g(;\nPATCH>>>"));

    let rejection = outcome.rejection().unwrap();
    assert!(matches!(rejection.reason, RejectReason::ValidationFailed(_)));
    assert_eq!(feeder.serialize(), "fn f() {\n    g();\n}\n");
}

#[test]
fn overlapping_operations_are_refused() {
    let (feeder, patcher) = setup("a\nb\nc\nd");
    let outcome = patcher.apply(&request(
        &feeder,
        "<<<PATCH\nDELETE #2 TO #3\nPATCH>>>\n<<<PATCH\nINSERT AFTER #3\nx\nPATCH>>>",
    ));
    assert!(matches!(
        outcome.rejection().map(|r| &r.reason),
        Some(RejectReason::OverlappingEdits { .. })
    ));
}

#[test]
fn concurrent_writers_never_interleave() {
    let (feeder, patcher) = setup("a\nb\nc\nd");
    let patcher = Arc::new(patcher);

    let handles: Vec<_> = [
        "<<<PATCH\nREPLACE #1\nA\nPATCH>>>",
        "<<<PATCH\nINSERT AFTER #4\ne\nPATCH>>>",
    ]
    .into_iter()
    .map(|text| {
        let patcher = Arc::clone(&patcher);
        let req = PatchRequest::new(Brain::Master, BufferVersion(0), text);
        thread::spawn(move || patcher.apply(&req))
    })
    .collect();

    for handle in handles {
        assert!(handle.join().unwrap().is_committed());
    }
    assert_eq!(feeder.snapshot_version(), BufferVersion(2));
    assert_eq!(lines(&feeder), vec!["A", "b", "c", "d", "e"]);
}

#[test]
fn readers_keep_their_snapshot_across_commits() {
    let (feeder, patcher) = setup("a\nb\nc");
    let before = feeder.snapshot();
    let window = before.window(None, Budget::Chars(100)).unwrap();

    assert!(patcher
        .apply(&request(&feeder, "<<<PATCH\nDELETE #1 TO #3\nPATCH>>>"))
        .is_committed());

    assert_eq!(before.len(), 3);
    assert_eq!(before.window(None, Budget::Chars(100)).unwrap(), window);
    assert!(feeder.snapshot().is_empty());
}

#[test]
fn reload_replaces_buffer_and_bumps_version() {
    let (feeder, patcher) = setup("a\nb");
    let stale = request(&feeder, "<<<PATCH\nDELETE #1\nPATCH>>>");

    let version = feeder.reload("x\ny\nz").unwrap();
    assert_eq!(version, BufferVersion(1));
    assert_eq!(feeder.snapshot().ids(), &[LineId(3), LineId(4), LineId(5)]);

    assert!(patcher.apply(&stale).rejection().unwrap().reason.is_stale());
}

#[test]
fn source_path_survives_commits() {
    let feeder = Arc::new(CodeFeeder::new(
        CodeBuffer::load("x = 1\n").with_source("calc.py"),
    ));
    let patcher = Autopatcher::new(Arc::clone(&feeder));
    assert!(patcher
        .apply(&request(&feeder, "<<<PATCH\nREPLACE #1\nx = 2\nPATCH>>>"))
        .is_committed());
    assert_eq!(
        feeder.snapshot().source().and_then(|p| p.to_str()),
        Some("calc.py")
    );
}
