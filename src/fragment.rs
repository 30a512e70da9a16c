//! Pushed HTML fragments: root-element parsing, continuation detection and
//! the server-side fragment builders.
//!
//! Only the root start tag matters for gating. A fragment whose root element
//! carries the marker attribute announces that more fragments follow for the
//! current turn; anything else, including input we cannot parse, is terminal.

use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};

/// Default attribute marking a non-final fragment.
pub const DEFAULT_MARKER: &str = "data-streaming";

/// Id of the append-only message container.
pub const MESSAGE_LIST_ID: &str = "message-list";

/// Whether more fragments follow in the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    More,
    Terminal,
    /// No root element could be read. Handled exactly like `Terminal`.
    Unknown,
}

impl Continuation {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Continuation::More)
    }
}

/// A parsed fragment. Keeps the raw markup for whoever renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    raw: String,
    tag: Option<String>,
    attributes: Vec<(String, Option<String>)>,
    continuation: Continuation,
}

impl Fragment {
    /// Parse `raw`, looking for `marker` on the root element.
    pub fn parse(raw: impl Into<String>, marker: &str) -> Self {
        let raw = raw.into();
        match parse_root(&raw) {
            Some((tag, attributes)) => {
                let more = attributes
                    .iter()
                    .any(|(name, _)| name.eq_ignore_ascii_case(marker));
                Fragment {
                    raw,
                    tag: Some(tag),
                    attributes,
                    continuation: if more {
                        Continuation::More
                    } else {
                        Continuation::Terminal
                    },
                }
            }
            None => Fragment {
                raw,
                tag: None,
                attributes: Vec::new(),
                continuation: Continuation::Unknown,
            },
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lowercased root tag name, if the root parsed.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn continuation(&self) -> Continuation {
        self.continuation
    }

    pub fn is_terminal(&self) -> bool {
        self.continuation.is_terminal()
    }

    /// Value of a root attribute. Valueless attributes yield `Some("")`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    /// Text content with all tags stripped and entities decoded.
    pub fn text(&self) -> String {
        let mut out = String::with_capacity(self.raw.len());
        let mut in_tag = false;
        let mut quote: Option<char> = None;
        for c in self.raw.chars() {
            match (in_tag, quote, c) {
                (true, Some(q), _) if c == q => quote = None,
                (true, Some(_), _) => {}
                (true, None, '"' | '\'') => quote = Some(c),
                (true, None, '>') => in_tag = false,
                (true, None, _) => {}
                (false, _, '<') => in_tag = true,
                (false, _, _) => out.push(c),
            }
        }
        decode_html_entities(&out).into_owned()
    }
}

// ---------------------------------------------------------------------------
// Root start-tag parser
// ---------------------------------------------------------------------------

type Attributes = Vec<(String, Option<String>)>;

fn parse_root(raw: &str) -> Option<(String, Attributes)> {
    let mut rest = raw.trim_start();
    // Leading comments are allowed before the root element.
    while let Some(after) = rest.strip_prefix("<!--") {
        let end = after.find("-->")?;
        rest = after[end + 3..].trim_start();
    }

    let rest = rest.strip_prefix('<')?;
    let name_len = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(rest.len());
    if name_len == 0 || !rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let tag = rest[..name_len].to_ascii_lowercase();
    let mut rest = &rest[name_len..];
    let mut attributes = Vec::new();

    loop {
        rest = rest.trim_start();
        if rest.starts_with('>') || rest.starts_with("/>") {
            return Some((tag, attributes));
        }
        if rest.is_empty() {
            // Start tag never closed.
            return None;
        }

        let name_len = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            // Stray '/' or '=' inside the tag.
            rest = &rest[1..];
            continue;
        }
        let name = rest[..name_len].to_ascii_lowercase();
        rest = rest[name_len..].trim_start();

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remaining) = read_attr_value(after_eq)?;
            rest = remaining;
            Some(decode_html_entities(value).into_owned())
        } else {
            None
        };
        attributes.push((name, value));
    }
}

fn read_attr_value(s: &str) -> Option<(&str, &str)> {
    match s.chars().next()? {
        quote @ ('"' | '\'') => {
            let body = &s[1..];
            let end = body.find(quote)?;
            Some((&body[..end], &body[end + 1..]))
        }
        _ => {
            let end = s
                .find(|c: char| c.is_whitespace() || c == '>')
                .unwrap_or(s.len());
            Some((&s[..end], &s[end..]))
        }
    }
}

// ---------------------------------------------------------------------------
// Server-side builders
// ---------------------------------------------------------------------------

/// Builds the out-of-band fragments the server pushes for one turn.
#[derive(Debug, Clone)]
pub struct FragmentWriter {
    marker: String,
}

impl Default for FragmentWriter {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl FragmentWriter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn marker_attr(&self, more: bool) -> String {
        if more {
            format!(" {}", self.marker)
        } else {
            String::new()
        }
    }

    /// Echo of the user's message, appended to the message list.
    pub fn user_message(&self, text: &str, more: bool) -> String {
        format!(
            r#"<div id="{list}" hx-swap-oob="beforeend" data-role="user"{m}><div class="message user"><p>{text}</p></div></div>"#,
            list = MESSAGE_LIST_ID,
            m = self.marker_attr(more),
            text = encode_text(text),
        )
    }

    /// Empty assistant bubble that subsequent tokens are appended into.
    pub fn assistant_start(&self, message_id: &str) -> String {
        format!(
            r#"<div id="{list}" hx-swap-oob="beforeend" data-role="assistant"{m}><div class="message assistant" id="{id}"></div></div>"#,
            list = MESSAGE_LIST_ID,
            m = self.marker_attr(true),
            id = encode_double_quoted_attribute(message_id),
        )
    }

    pub fn assistant_token(&self, message_id: &str, text: &str) -> String {
        format!(
            r#"<span hx-swap-oob="beforeend:#{id}"{m}>{text}</span>"#,
            id = encode_double_quoted_attribute(message_id),
            m = self.marker_attr(true),
            text = encode_text(text),
        )
    }

    /// Inline notice inside the assistant bubble (errors, "stopped").
    pub fn notice(&self, message_id: &str, text: &str) -> String {
        format!(
            r#"<span hx-swap-oob="beforeend:#{id}" data-role="notice"{m}><em class="notice">{text}</em></span>"#,
            id = encode_double_quoted_attribute(message_id),
            m = self.marker_attr(true),
            text = encode_text(text),
        )
    }

    /// Terminal fragment closing the turn.
    pub fn assistant_end(&self, message_id: &str) -> String {
        format!(
            r#"<span hx-swap-oob="beforeend:#{id}"></span>"#,
            id = encode_double_quoted_attribute(message_id)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_present_means_more() {
        let f = Fragment::parse(r#"<span data-streaming hx-swap-oob="beforeend:#m">hi</span>"#, DEFAULT_MARKER);
        assert_eq!(f.continuation(), Continuation::More);
        assert!(!f.is_terminal());
    }

    #[test]
    fn test_marker_absent_means_terminal() {
        let f = Fragment::parse(r#"<span hx-swap-oob="beforeend:#m"></span>"#, DEFAULT_MARKER);
        assert_eq!(f.continuation(), Continuation::Terminal);
    }

    #[test]
    fn test_marker_only_counts_on_root() {
        let f = Fragment::parse(r#"<div><span data-streaming>x</span></div>"#, DEFAULT_MARKER);
        assert!(f.is_terminal());
    }

    #[test]
    fn test_marker_match_is_case_insensitive() {
        let f = Fragment::parse("<DIV Data-Streaming>x</DIV>", DEFAULT_MARKER);
        assert_eq!(f.tag(), Some("div"));
        assert_eq!(f.continuation(), Continuation::More);
    }

    #[test]
    fn test_marker_with_value_still_counts() {
        let f = Fragment::parse(r#"<p data-streaming="true">x</p>"#, DEFAULT_MARKER);
        assert_eq!(f.continuation(), Continuation::More);
    }

    #[test]
    fn test_custom_marker() {
        let f = Fragment::parse("<p hx-more>x</p>", "hx-more");
        assert_eq!(f.continuation(), Continuation::More);
        let g = Fragment::parse("<p data-streaming>x</p>", "hx-more");
        assert!(g.is_terminal());
    }

    #[test]
    fn test_plain_text_is_unknown() {
        let f = Fragment::parse("just words", DEFAULT_MARKER);
        assert_eq!(f.continuation(), Continuation::Unknown);
        assert!(f.is_terminal());
        assert_eq!(f.tag(), None);
    }

    #[test]
    fn test_empty_is_unknown() {
        assert_eq!(Fragment::parse("", DEFAULT_MARKER).continuation(), Continuation::Unknown);
        assert_eq!(Fragment::parse("   \n", DEFAULT_MARKER).continuation(), Continuation::Unknown);
    }

    #[test]
    fn test_unclosed_start_tag_is_unknown() {
        let f = Fragment::parse("<span data-streaming", DEFAULT_MARKER);
        assert_eq!(f.continuation(), Continuation::Unknown);
    }

    #[test]
    fn test_unterminated_quote_is_unknown() {
        let f = Fragment::parse(r#"<span id="abc data-streaming>x</span>"#, DEFAULT_MARKER);
        assert_eq!(f.continuation(), Continuation::Unknown);
    }

    #[test]
    fn test_leading_comment_is_skipped() {
        let f = Fragment::parse("  <!-- chunk --> <p data-streaming>x</p>", DEFAULT_MARKER);
        assert_eq!(f.tag(), Some("p"));
        assert_eq!(f.continuation(), Continuation::More);
    }

    #[test]
    fn test_self_closing_root() {
        let f = Fragment::parse("<br data-streaming/>", DEFAULT_MARKER);
        assert_eq!(f.tag(), Some("br"));
        assert_eq!(f.continuation(), Continuation::More);
    }

    #[test]
    fn test_attribute_values_quoted_and_unquoted() {
        let f = Fragment::parse(r#"<div id=list class='a b' hx-swap-oob="beforeend" hidden>x</div>"#, DEFAULT_MARKER);
        assert_eq!(f.attribute("id"), Some("list"));
        assert_eq!(f.attribute("class"), Some("a b"));
        assert_eq!(f.attribute("hx-swap-oob"), Some("beforeend"));
        assert_eq!(f.attribute("hidden"), Some(""));
        assert_eq!(f.attribute("missing"), None);
    }

    #[test]
    fn test_quoted_value_may_contain_gt() {
        let f = Fragment::parse(r#"<div title="a > b" data-streaming>x</div>"#, DEFAULT_MARKER);
        assert_eq!(f.attribute("title"), Some("a > b"));
        assert_eq!(f.continuation(), Continuation::More);
    }

    #[test]
    fn test_text_strips_tags_and_decodes() {
        let f = Fragment::parse("<div><p>fish &amp; chips &lt;3</p></div>", DEFAULT_MARKER);
        assert_eq!(f.text(), "fish & chips <3");
    }

    #[test]
    fn test_text_decodes_numeric_and_named_entities() {
        let f = Fragment::parse("<p>it&#8217;s 5&nbsp;km &#x27;easy&#x27;</p>", DEFAULT_MARKER);
        assert_eq!(f.text(), "it\u{2019}s 5\u{a0}km 'easy'");
    }

    #[test]
    fn test_text_does_not_double_decode() {
        let f = Fragment::parse("<p>&amp;lt;</p>", DEFAULT_MARKER);
        assert_eq!(f.text(), "&lt;");
    }

    #[test]
    fn test_text_ignores_gt_inside_quoted_attribute() {
        let f = Fragment::parse(r#"<div title="a > b" data-x='c > d'>x</div>"#, DEFAULT_MARKER);
        assert_eq!(f.text(), "x");
    }

    #[test]
    fn test_attribute_values_are_decoded() {
        let f = Fragment::parse(r#"<div title="5&nbsp;km &#8211; easy">x</div>"#, DEFAULT_MARKER);
        assert_eq!(f.attribute("title"), Some("5\u{a0}km \u{2013} easy"));
    }

    #[test]
    fn test_writer_escapes_message_id_attribute() {
        let w = FragmentWriter::default();
        let html = w.assistant_token(r#"m"1"#, "x");
        let f = Fragment::parse(html, w.marker());
        assert_eq!(f.attribute("hx-swap-oob"), Some(r#"beforeend:#m"1"#));
    }

    #[test]
    fn test_writer_user_message_escapes_and_marks() {
        let w = FragmentWriter::default();
        let html = w.user_message("<script>", true);
        assert!(html.contains("&lt;script&gt;"));
        let f = Fragment::parse(html, w.marker());
        assert_eq!(f.continuation(), Continuation::More);
        assert_eq!(f.attribute("id"), Some(MESSAGE_LIST_ID));
        assert_eq!(f.attribute("data-role"), Some("user"));
        assert_eq!(f.text(), "<script>");
    }

    #[test]
    fn test_writer_user_message_terminal_when_nothing_follows() {
        let w = FragmentWriter::default();
        let f = Fragment::parse(w.user_message("hi", false), w.marker());
        assert!(f.is_terminal());
    }

    #[test]
    fn test_writer_turn_sequence() {
        let w = FragmentWriter::new("data-more");
        let start = Fragment::parse(w.assistant_start("msg-1"), "data-more");
        let token = Fragment::parse(w.assistant_token("msg-1", "Hello"), "data-more");
        let end = Fragment::parse(w.assistant_end("msg-1"), "data-more");
        assert!(!start.is_terminal());
        assert!(!token.is_terminal());
        assert!(end.is_terminal());
        assert_eq!(token.attribute("hx-swap-oob"), Some("beforeend:#msg-1"));
        assert_eq!(token.text(), "Hello");
        assert_eq!(end.text(), "");
    }

    #[test]
    fn test_writer_notice_is_non_terminal() {
        let w = FragmentWriter::default();
        let f = Fragment::parse(w.notice("msg-1", "stopped"), w.marker());
        assert!(!f.is_terminal());
        assert_eq!(f.attribute("data-role"), Some("notice"));
        assert_eq!(f.text(), "stopped");
    }
}
