//! Tag and content "like" patterns: the `?`/`*`/`|` mini-language used throughout path and
//! template definitions, compiled down to [`regex::Regex`].

use once_cell::unsync::OnceCell;
use regex::Regex;

use crate::error::{Error, Result};

/// Turn a `?`/`*` like-string body into a regex source fragment.
///
/// ASCII alphanumerics, `_`, `?`, `*` and space pass through untouched; everything
/// else is backslash-escaped. `*` becomes `.*` and `?` becomes `.` only afterwards,
/// so escaping never touches the placeholders themselves.
fn like_to_regex_body(like: &str) -> String {
    let mut out = String::with_capacity(like.len() * 2);
    for c in like.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '?' || c == '*' || c == ' ' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out.replace('*', ".*").replace('?', ".")
}

/// One alternative of a tag pattern: a literal prefix for a fast byte search plus the
/// regex that must match the whole tag (including the closing `>`).
struct TagAlternative {
    prefix: String,
    regex: Regex,
}

/// A compiled `tags()` pattern: one or more `|`-separated alternatives, grouped by their
/// shared literal prefix so the scanner can do a byte search before it runs any regex.
pub struct LikeSpec {
    source: String,
    groups: Vec<(String, Vec<Regex>)>,
}

impl LikeSpec {
    /// Compile a tag pattern. Rejects alternatives containing a literal `<` or `>`.
    pub fn compile(like: &str) -> Result<Self> {
        let mut alternatives = Vec::new();
        for alt in like.split('|') {
            if alt.contains('<') || alt.contains('>') {
                return Err(Error::InvalidTagDefinition(like.to_string()));
            }
            let templated = format!("<{alt}");
            let placeholder = templated.find(['*', '?']).unwrap_or(templated.len());
            let prefix = templated[..placeholder].to_string();
            let tail = if alt.ends_with('*') {
                ">".to_string()
            } else {
                r"(\s.*)*>".to_string()
            };
            let regex_src = format!("^{}{tail}", like_to_regex_body(&templated));
            let regex = Regex::new(&regex_src)
                .map_err(|_| Error::InvalidTagDefinition(like.to_string()))?;
            alternatives.push(TagAlternative { prefix, regex });
        }

        let mut groups: Vec<(String, Vec<Regex>)> = Vec::new();
        for alt in alternatives {
            match groups.iter_mut().find(|(prefix, _)| *prefix == alt.prefix) {
                Some((_, regexes)) => regexes.push(alt.regex),
                None => groups.push((alt.prefix, vec![alt.regex])),
            }
        }

        Ok(Self { source: like.to_string(), groups })
    }

    pub fn matches_source(&self, like: &str) -> bool {
        self.source == like
    }

    /// Whether `tag` (the full literal text of a single tag, `<...>`) matches any
    /// alternative, ignoring the prefix grouping used by `find`.
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.groups.iter().any(|(_, regexes)| regexes.iter().any(|r| r.is_match(tag)))
    }

    /// Find the earliest tag in `text[start..end)` matched by any alternative.
    ///
    /// Mirrors the reference scanner's search: for each prefix group, walk its byte
    /// occurrences, test the candidate tag (`prefix-match .. next '>'`) against every
    /// regex in the group, and shrink `end` to the earliest successful hit found so far
    /// so later groups cannot report a later match as if it were the earliest.
    pub fn find(&self, text: &str, start: usize, end: usize) -> (usize, Option<(usize, usize)>) {
        let mut next = start;
        let mut found: Option<(usize, usize)> = None;
        let mut window_end = end;

        for (prefix, regexes) in &self.groups {
            let mut search_from = start;
            while search_from < window_end {
                let Some(rel) = text.get(search_from..window_end).and_then(|s| s.find(prefix.as_str())) else {
                    break;
                };
                let pos = search_from + rel;
                let Some(gt_rel) = text.get(pos..window_end).and_then(|s| s.find('>')) else {
                    break;
                };
                let gt = pos + gt_rel + 1;
                let candidate = &text[pos..gt];
                let mut matched_here = false;
                for regex in regexes {
                    if regex.is_match(candidate) {
                        window_end = pos;
                        found = Some((pos, gt));
                        next = gt;
                        matched_here = true;
                        break;
                    }
                }
                if matched_here && gt > window_end {
                    break;
                }
                search_from = gt;
            }
        }

        (next, found)
    }
}

/// A plain (non-tag) like-pattern used for `collect(until=...)` guards, `search()`
/// content matching, and like-matching a property name against attribute keys.
pub struct ContentSpec {
    regexes: Vec<Regex>,
}

impl ContentSpec {
    pub fn compile(like: &str) -> Result<Self> {
        let mut regexes = Vec::with_capacity(1);
        for alt in like.split('|') {
            let src = format!("^{}", like_to_regex_body(alt));
            let regex = Regex::new(&src).map_err(|_| Error::InvalidTagDefinition(like.to_string()))?;
            regexes.push(regex);
        }
        Ok(Self { regexes })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regexes.iter().any(|r| r.is_match(text))
    }
}

/// A lazily-compiled, source-keyed cache slot for a scanner's current `tags()` call.
/// `OnceCell` here mirrors the teacher crate's use of `once_cell::unsync::OnceCell` for
/// single-threaded interior caching of compiled patterns.
#[derive(Default)]
pub struct PatternCache {
    cell: OnceCell<LikeSpec>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    /// Compile `like` unless the cache already holds the same source string.
    pub fn set(&mut self, like: &str) -> Result<&LikeSpec> {
        if self.cell.get().is_some_and(|spec| spec.matches_source(like)) {
            return Ok(self.cell.get().unwrap());
        }
        self.cell = OnceCell::new();
        let spec = LikeSpec::compile(like)?;
        let _ = self.cell.set(spec);
        Ok(self.cell.get().unwrap())
    }

    pub fn get(&self) -> Option<&LikeSpec> {
        self.cell.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_angle_brackets() {
        assert!(LikeSpec::compile("a<b").is_err());
        assert!(LikeSpec::compile("a>b").is_err());
    }

    #[test]
    fn exact_tag_matches_without_attributes() {
        let spec = LikeSpec::compile("name").unwrap();
        let (next, found) = spec.find("<name>X</name>", 0, 14);
        assert_eq!(found, Some((0, 6)));
        assert_eq!(next, 6);
    }

    #[test]
    fn tag_with_attributes_matches_prefix_only() {
        let spec = LikeSpec::compile("client").unwrap();
        let (_, found) = spec.find(r#"<client id="1">"#, 0, 16);
        assert_eq!(found, Some((0, 16)));
    }

    #[test]
    fn star_suffix_forbids_attribute_tail() {
        let spec = LikeSpec::compile("client*").unwrap();
        assert!(spec.find("<client>", 0, 8).1.is_some());
    }

    #[test]
    fn earliest_match_wins_across_alternatives() {
        let spec = LikeSpec::compile("customer|client").unwrap();
        let text = "<client>x</client><customer>y</customer>";
        let (_, found) = spec.find(text, 0, text.len());
        assert_eq!(found, Some((0, 8)));
    }

    #[test]
    fn content_like_matches_prefix_anchored() {
        let spec = ContentSpec::compile("abc*|xyz").unwrap();
        assert!(spec.is_match("abcdef"));
        assert!(spec.is_match("xyz"));
        assert!(!spec.is_match("zxyz"));
    }
}
