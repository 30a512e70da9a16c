use proptest::prelude::*;
use rstest::rstest;
use tandarunner::fragment::MESSAGE_LIST_ID;
use tandarunner::{Continuation, Fragment, FragmentWriter};

// ---------------------------------------------------------------------------
// A turn as the server writes it
// ---------------------------------------------------------------------------

#[rstest]
#[case("data-streaming")]
#[case("data-more")]
fn test_only_the_end_fragment_is_terminal(#[case] marker: &str) {
    let w = FragmentWriter::new(marker);
    let turn = [
        w.user_message("how far is 42k?", true),
        w.assistant_start("m1"),
        w.assistant_token("m1", "42.195 "),
        w.notice("m1", "stopped"),
        w.assistant_end("m1"),
    ];
    let verdicts: Vec<bool> = turn
        .iter()
        .map(|raw| Fragment::parse(raw.as_str(), marker).is_terminal())
        .collect();
    assert_eq!(verdicts, vec![false, false, false, false, true]);
}

#[test]
fn test_marker_from_other_writer_is_not_recognised() {
    let w = FragmentWriter::new("data-more");
    let f = Fragment::parse(w.assistant_token("m1", "x"), "data-streaming");
    assert!(f.is_terminal());
}

#[test]
fn test_user_message_without_more_is_terminal() {
    let w = FragmentWriter::default();
    let f = Fragment::parse(w.user_message("hi", false), w.marker());
    assert_eq!(f.continuation(), Continuation::Terminal);
    assert_eq!(f.attribute("id"), Some(MESSAGE_LIST_ID));
}

#[test]
fn test_markup_in_tokens_is_escaped() {
    let w = FragmentWriter::default();
    let raw = w.assistant_token("m1", "<b>fast</b> & steady");
    assert!(raw.contains("&lt;b&gt;fast&lt;/b&gt; &amp; steady"));
    let f = Fragment::parse(raw, w.marker());
    assert_eq!(f.tag(), Some("span"));
    assert_eq!(f.text(), "<b>fast</b> & steady");
}

#[rstest]
#[case("")]
#[case("plain text")]
#[case("<")]
#[case("<div class=\"open")]
#[case("<!-- never closed")]
#[case("<1div data-streaming>")]
fn test_unreadable_roots_are_unknown(#[case] raw: &str) {
    let f = Fragment::parse(raw, "data-streaming");
    assert_eq!(f.continuation(), Continuation::Unknown);
    assert!(f.is_terminal());
}

#[test]
fn test_typographic_entities_reach_the_terminal_decoded() {
    let f = Fragment::parse("<p>it&#8217;s 5&nbsp;km &#x27;easy&#x27;</p>", "data-streaming");
    assert_eq!(f.text(), "it\u{2019}s 5\u{a0}km 'easy'");
}

#[test]
fn test_quoted_gt_does_not_leak_attribute_text() {
    let f = Fragment::parse(r#"<div title="a > b">x</div>"#, "data-streaming");
    assert_eq!(f.text(), "x");
}

proptest! {
    #[test]
    fn prop_parse_never_panics(raw in ".{0,80}") {
        let f = Fragment::parse(raw, "data-streaming");
        let _ = f.text();
        let _ = f.attribute("id");
    }

    #[test]
    fn prop_token_text_survives(text in "[ -~]{0,40}") {
        let w = FragmentWriter::default();
        let f = Fragment::parse(w.assistant_token("m1", &text), w.marker());
        prop_assert_eq!(f.continuation(), Continuation::More);
        prop_assert_eq!(f.text(), text);
    }
}
