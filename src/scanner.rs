//! Pure, in-memory tag scanning over a [`Document`]. No I/O happens here; the
//! [`crate::reader::Reader`] is what feeds a scanner its window.

use std::collections::HashMap;
use std::rc::Rc;

use crate::document::Document;
use crate::error::Result;
use crate::pattern::{LikeSpec, PatternCache};

/// The literal name of a tag: its first word, with the leading `<` and trailing
/// `>`/`/`/`?` stripped, but any leading `/` of a close tag kept (so `</foo>` yields
/// `/foo`, matching the toggled name `extract` computes for the opposite tag).
pub(crate) fn tag_name(tag: &str) -> &str {
    let s = tag.strip_prefix('<').unwrap_or(tag);
    let s = s.strip_suffix('>').unwrap_or(s);
    let s = s.strip_suffix('/').or_else(|| s.strip_suffix('?')).unwrap_or(s);
    s.split_whitespace().next().unwrap_or(s)
}

/// A cursor over a document window, tracking the last tag matched by `find`/`browse`/`next_tag`.
pub struct Scanner {
    doc: Document,
    pos: usize,
    tag: Option<(usize, usize)>,
    patterns: PatternCache,
}

impl Scanner {
    pub fn new(doc: Document) -> Self {
        let pos = doc.begin();
        Self { doc, pos, tag: None, patterns: PatternCache::new() }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn begin(&self) -> usize {
        self.doc.begin()
    }

    pub fn end(&self) -> usize {
        self.doc.end()
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.doc.end()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.map(|(s, g)| &self.doc.full()[s..g])
    }

    /// This scanner's own window, independent of the cursor.
    pub fn text(&self) -> &str {
        self.doc.text()
    }

    fn tag_str(&self) -> &str {
        self.tag.map(|(s, g)| &self.doc.full()[s..g]).unwrap_or("")
    }

    /// Compile and cache `like`; a no-op when it matches the already-cached pattern.
    pub fn tags(&mut self, like: &str) -> Result<()> {
        self.patterns.set(like)?;
        Ok(())
    }

    fn next_lt(&self, from: usize) -> Option<usize> {
        let end = self.doc.end();
        let text = self.doc.full();
        text.get(from..end)?.find('<').map(|rel| from + rel)
    }

    /// The next literal tag (`<...>`) anywhere in `[from, end)`, without touching cursor state.
    fn scan_next_tag(&self, from: usize) -> Option<(usize, usize)> {
        let end = self.doc.end();
        let text = self.doc.full();
        let lt = self.next_lt(from)?;
        let gt_rel = text.get(lt..end)?.find('>')?;
        Some((lt, lt + gt_rel + 1))
    }

    /// This scanner's underlying shared buffer, for a caller (the reader) that needs to
    /// grow it across chunk reads.
    pub(crate) fn bytes_rc(&self) -> &Rc<str> {
        self.doc.bytes()
    }

    pub(crate) fn text_for_extend(&self) -> &str {
        self.doc.full()
    }

    /// Rewind to the start of this scanner's own window, forgetting the last matched tag.
    /// Lets a single extracted child be reused for an independent collect and then a fresh
    /// tag search, mirroring how each use of a sub-document starts from its own beginning.
    pub(crate) fn reset(&mut self) {
        self.pos = self.doc.begin();
        self.tag = None;
    }

    /// Swap in a longer buffer sharing the same prefix, keeping `pos`/`tag` offsets valid.
    pub(crate) fn rebuffer(&mut self, bytes: Rc<str>, end: usize) {
        self.doc = Document::windowed(bytes, self.doc.begin(), end);
    }

    /// Advance to the next tag matching the cached pattern, searched anywhere in the window.
    /// Leaves `pos`/`tag` untouched on failure, per the hard no-partial-progress contract.
    pub fn find(&mut self) -> Option<&str> {
        let spec = self.patterns.get()?;
        let (_, found) = spec.find(self.doc.full(), self.pos, self.doc.end());
        let (start, gt) = found?;
        self.pos = gt;
        self.tag = Some((start, gt));
        Some(self.tag_str())
    }

    /// Like `find`, but jumps over non-matching tags' whole subtrees to stay on the
    /// current structural level. Walks a local cursor and only commits `pos`/`tag` once a
    /// match is found, so a failed browse leaves the scanner's state untouched, same as a
    /// failed `find`.
    pub fn browse(&mut self) -> Option<&str> {
        self.patterns.get()?;
        let mut cursor = self.pos;
        loop {
            let (start, gt) = self.scan_next_tag(cursor)?;
            let candidate = self.doc.full()[start..gt].to_string();
            if self.patterns.get().is_some_and(|spec| spec.matches_tag(&candidate)) {
                self.pos = gt;
                self.tag = Some((start, gt));
                return Some(self.tag_str());
            }
            let (_, resume_at) = self.subtree_span(&candidate, gt);
            cursor = resume_at;
        }
    }

    /// Advance past the very next tag regardless of any pattern.
    pub fn next_tag(&mut self) -> Option<&str> {
        let (start, gt) = self.scan_next_tag(self.pos)?;
        self.pos = gt;
        self.tag = Some((start, gt));
        Some(self.tag_str())
    }

    /// Split off a child scanner bounded by the current tag's matching close.
    ///
    /// Self-closing tags (`/>`, `?>`, or a leading `<?`) produce an empty child at the
    /// current position. Otherwise a balanced walk over same-named tags locates the
    /// matching close; the child's window ends exactly at the close tag's `<`.
    pub fn extract(&mut self, progress: bool) -> Scanner {
        let tag_text = self.tag_str().to_string();
        let start = self.pos;
        let (content_end, resume_at) = self.subtree_span(&tag_text, start);

        let child = Scanner::new(Document::windowed(Rc::clone(self.doc.bytes()), start, content_end));

        if progress {
            self.pos = resume_at;
        }
        child
    }

    /// Where a subtree opened by `tag_text` (its content window end and the position to
    /// resume scanning at) lies, starting the balanced walk at `start`. Pure: reads `self.doc`
    /// only, never touches `self.pos`/`self.tag`, so callers can use it to look ahead
    /// (`browse`) without committing to the skip unless they choose to.
    fn subtree_span(&self, tag_text: &str, start: usize) -> (usize, usize) {
        let is_self_closing =
            tag_text.ends_with("/>") || tag_text.ends_with("?>") || tag_text.starts_with("<?");
        if is_self_closing || tag_text.is_empty() {
            return (start, start);
        }

        let name = tag_name(tag_text).to_string();
        let close_name = match name.strip_prefix('/') {
            Some(rest) => rest.to_string(),
            None => format!("/{name}"),
        };
        let mut depth: i64 = 1;
        let mut cursor = start;
        while let Some((s, g)) = self.scan_next_tag(cursor) {
            let candidate = &self.doc.full()[s..g];
            let candidate_name = tag_name(candidate);
            if candidate_name == close_name {
                depth -= 1;
                if depth == 0 {
                    return (s, g);
                }
            } else if candidate_name == name {
                depth += 1;
            }
            cursor = g;
        }
        (self.doc.end(), self.doc.end())
    }

    /// The text from `pos` up to the next `<` (or window end). Never advances.
    pub fn content(&self) -> &str {
        let lt = self.next_lt(self.pos).unwrap_or(self.doc.end());
        &self.doc.full()[self.pos..lt]
    }

    /// Concatenate content spans up to the window end, or up to a tag matched by
    /// `until`. No depth tracking: every tag crossed while walking is treated the same
    /// way, which is what makes the result a flat list rather than a tree.
    pub fn collect(&mut self, until: Option<&str>, include_empty: bool) -> Result<Vec<String>> {
        if until.is_none() && self.tag.is_some() && self.pos > self.doc.begin() {
            let mut child = self.extract(true);
            return child.collect(None, include_empty);
        }

        let until_spec = match until {
            Some(u) => Some(LikeSpec::compile(u)?),
            None => None,
        };

        let mut out = Vec::new();
        loop {
            if self.pos >= self.doc.end() {
                return Ok(out);
            }
            let lt = self.next_lt(self.pos).unwrap_or(self.doc.end());
            let seg = self.doc.full()[self.pos..lt].to_string();
            if include_empty || !seg.is_empty() {
                out.push(seg);
            }
            self.pos = lt;
            match self.scan_next_tag(self.pos) {
                None => return Ok(out),
                Some((s, g)) => {
                    self.tag = Some((s, g));
                    self.pos = g;
                    if let Some(spec) = &until_spec {
                        let tag_text = &self.doc.full()[s..g];
                        if spec.matches_tag(tag_text) {
                            return Ok(out);
                        }
                    }
                }
            }
        }
    }

    /// Advance through contents (not tags) until one matches `like`. On success, `pos`
    /// lands right after the matched content (before its following tag).
    pub fn search(&mut self, like: &str) -> Result<bool> {
        let spec = crate::pattern::ContentSpec::compile(like)?;
        loop {
            if self.pos >= self.doc.end() {
                return Ok(false);
            }
            let lt = self.next_lt(self.pos).unwrap_or(self.doc.end());
            let con = &self.doc.full()[self.pos..lt];
            if spec.is_match(con) {
                self.pos = lt;
                return Ok(true);
            }
            match self.scan_next_tag(lt) {
                None => return Ok(false),
                Some((s, g)) => {
                    self.tag = Some((s, g));
                    self.pos = g;
                }
            }
        }
    }

    /// Parse the attributes of `tag` (or the last matched tag when omitted) into a
    /// `name -> value` map. Duplicate names are joined with `|`.
    pub fn properties(&self, tag: Option<&str>) -> HashMap<String, String> {
        let raw = tag.unwrap_or_else(|| self.tag_str());
        parse_properties(raw)
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn parse_properties(tag: &str) -> HashMap<String, String> {
    let mut props: HashMap<String, String> = HashMap::new();
    let trimmed = tag
        .trim()
        .trim_end_matches('>')
        .trim_end()
        .trim_end_matches('/')
        .trim_end()
        .trim_end_matches('?');
    if trimmed.is_empty() {
        return props;
    }
    let dummy = format!("{trimmed} x");
    let frags: Vec<&str> = dummy.split('=').collect();
    let mut name = frags[0].trim_end().rsplit(' ').next().unwrap_or("").to_string();
    let rest = &frags[1..];
    if rest.is_empty() {
        return props;
    }
    let last = rest.len() - 1;

    let mut open: Option<char> = None;
    let mut w = String::new();

    for (i, f) in rest.iter().enumerate() {
        if let Some(q) = open {
            if !f.contains(q) && i < last {
                w.push('=');
                w.push_str(f);
                continue;
            }
            w.push('=');
            w.push_str(f.trim_end());
        } else {
            let f_lstripped = f.trim_start();
            let mut chars = f_lstripped.chars();
            match chars.next() {
                Some(q @ ('\'' | '"')) if i < last && !chars.as_str().contains(q) => {
                    open = Some(q);
                    w = f_lstripped.to_string();
                    continue;
                }
                _ => w = f.trim_end().to_string(),
            }
        }

        let chars: Vec<char> = w.chars().collect();
        let mut k = 0usize;
        for j in (0..chars.len()).rev() {
            if !is_identifier_char(chars[j]) {
                k = j + 1;
                break;
            }
        }
        let value_part: String = chars[..k].iter().collect();
        let mut content = value_part.trim_end_matches([';', ' ']).to_string();
        let content_chars: Vec<char> = content.chars().collect();
        if content_chars.len() >= 2 {
            let first = content_chars[0];
            let last_c = content_chars[content_chars.len() - 1];
            if (first == '\'' || first == '"') && first == last_c {
                content = content_chars[1..content_chars.len() - 1].iter().collect();
            }
        }
        props
            .entry(name.clone())
            .and_modify(|v| {
                v.push('|');
                v.push_str(&content);
            })
            .or_insert(content);
        name = chars[k..].iter().collect();
        open = None;
        w.clear();
    }

    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn scanner_for(text: &str) -> Scanner {
        Scanner::new(Document::new(Rc::from(text)))
    }

    #[test]
    fn find_advances_and_sets_tag() {
        let mut s = scanner_for("text<foo>inner</foo>tail");
        s.tags("foo").unwrap();
        assert_eq!(s.find(), Some("<foo>"));
        assert_eq!(s.pos(), 9);
    }

    #[test]
    fn find_failure_leaves_position_untouched() {
        let mut s = scanner_for("text<foo>inner</foo>tail");
        s.tags("bar").unwrap();
        assert_eq!(s.find(), None);
        assert_eq!(s.pos(), 0);
    }

    #[test]
    fn browse_skips_nested_non_matching_subtree() {
        let mut s = scanner_for("<a><skip><a>nested</a></skip><a>found</a></a>");
        s.tags("a").unwrap();
        s.find().unwrap();
        s.tags("a").unwrap();
        let tag = s.browse().unwrap().to_string();
        assert_eq!(tag, "<a>");
        let child = s.extract(false);
        assert_eq!(child.doc.text(), "found");
    }

    #[test]
    fn browse_failure_leaves_position_and_tag_untouched() {
        let mut s = scanner_for("<a><skip>inner</skip></a>");
        s.tags("a").unwrap();
        s.find().unwrap();
        let pos_before = s.pos();
        let tag_before = s.tag().map(str::to_string);
        s.tags("missing").unwrap();
        assert_eq!(s.browse(), None);
        assert_eq!(s.pos(), pos_before);
        assert_eq!(s.tag().map(str::to_string), tag_before);
    }

    #[test]
    fn extract_closes_on_balanced_nesting() {
        let mut s = scanner_for("<a><a>x</a>y</a>z");
        s.tags("a").unwrap();
        s.find().unwrap();
        let child = s.extract(true);
        assert_eq!(child.doc.text(), "<a>x</a>y");
        assert_eq!(&s.doc.full()[s.pos()..], "z");
    }

    #[test]
    fn extract_self_closing_tag_is_empty() {
        let mut s = scanner_for("<a/>tail");
        s.next_tag().unwrap();
        let child = s.extract(true);
        assert_eq!(child.doc.text(), "");
        assert_eq!(&s.doc.full()[s.pos()..], "tail");
    }

    #[test]
    fn content_reports_up_to_next_tag() {
        let s = scanner_for("hello<tag>");
        assert_eq!(s.content(), "hello");
    }

    #[test]
    fn collect_flattens_without_until() {
        let mut s = scanner_for("a<x>b<y>c</y>d</x>e");
        let out = s.collect(None, false).unwrap();
        assert_eq!(out, vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn collect_stops_at_until_tag() {
        let mut s = scanner_for("a<stop>b");
        let out = s.collect(Some("stop"), false).unwrap();
        assert_eq!(out, vec!["a"]);
    }

    #[test]
    fn properties_parses_quoted_and_unquoted_values() {
        let props = parse_properties(r#"<item id="42" status=deleted>"#);
        assert_eq!(props.get("id").map(String::as_str), Some("42"));
        assert_eq!(props.get("status").map(String::as_str), Some("deleted"));
    }

    #[test]
    fn search_finds_matching_content_and_advances() {
        let mut s = scanner_for("skip<a>needle*stuff</a>");
        assert!(s.search("needle*").unwrap());
    }
}
