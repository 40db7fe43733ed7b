//! Reference scanner for block content.
//!
//! A single left-to-right pass recognizes `[[Name]]` / `[[Name|Alias]]` page
//! references, `((id))` block references, bare `#tag` / `@mention` words, and
//! `{{embed ...}}` wrappers around a page or block reference. The scan never
//! backtracks over consumed text: an opener whose closer is missing is
//! skipped, and one failed closer search marks the rest of the pass, so cost
//! stays linear in content length. Resolution of raw text to target ids is
//! the index's job, not the scanner's.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use unicode_normalization::UnicodeNormalization;

use crate::properties::LinkKind;

/// Surface form a reference token was written in.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefKind {
    Page,
    Block,
    Tag,
    Mention,
    EmbedPage,
    EmbedBlock,
}

impl RefKind {
    /// The edge class this surface form produces. Mentions are the tag class
    /// of reference; embeds are their own class regardless of inner target.
    pub fn link_kind(&self) -> LinkKind {
        match self {
            RefKind::Page => LinkKind::PageRef,
            RefKind::Block => LinkKind::BlockRef,
            RefKind::Tag | RefKind::Mention => LinkKind::Tag,
            RefKind::EmbedPage | RefKind::EmbedBlock => LinkKind::Embed,
        }
    }

    /// Whether the raw text names a block id rather than a page name.
    pub fn targets_block(&self) -> bool {
        matches!(self, RefKind::Block | RefKind::EmbedBlock)
    }
}

impl Display for RefKind {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One recognized reference token. Offsets are byte positions covering the
/// full token including its delimiters.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawRef {
    pub kind: RefKind,
    /// Page name or block id text. Already normalized for tags and mentions;
    /// as written for the other forms.
    pub raw: String,
    /// Cosmetic display text from `[[Name|Alias]]`. Never affects resolution.
    pub alias: Option<String>,
    pub start: usize,
    pub end: usize,
}

/// Registry key for a page name: NFC fold, trim, lowercase, inner whitespace
/// runs collapsed to a single space.
pub fn normalize_page_name(name: &str) -> String {
    let folded: String = name.nfc().collect();
    let mut out = String::with_capacity(folded.len());
    let mut pending_space = false;
    for c in folded.trim().to_lowercase().chars() {
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

/// Canonical form of a tag or mention word: NFC fold, lowercase, whitespace
/// to `_`, everything outside the allow-list dropped.
pub fn normalize_tag(name: &str) -> String {
    let folded: String = name.nfc().collect();
    folded
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

fn at_word_boundary(prev: Option<char>) -> bool {
    match prev {
        None => true,
        Some(c) => !(c.is_alphanumeric() || c == '_' || c == '#' || c == '@'),
    }
}

/// Byte length of the tag word starting at the front of `text`, 0 when the
/// first char cannot start a word.
fn tag_run_len(text: &str) -> usize {
    let mut chars = text.chars();
    let mut len = match chars.next() {
        Some(c) if c.is_alphanumeric() => c.len_utf8(),
        _ => return 0,
    };
    for c in chars {
        if c.is_alphanumeric() || c == '_' || c == '-' {
            len += c.len_utf8();
        } else {
            break;
        }
    }
    len
}

/// Split `[[...]]` inner text into name and optional alias. `None` when the
/// name is empty after trimming.
fn split_name_alias(inner: &str) -> Option<(String, Option<String>)> {
    let mut parts = inner.splitn(2, '|');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        return None;
    }
    let alias = parts
        .next()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string);
    Some((name.to_string(), alias))
}

/// Interpret `{{...}}` body text as an embed of a page or block reference.
/// The caller strips trailing whitespace before the closer; only leading
/// whitespace is handled here.
fn parse_embed(body: &str) -> Option<(RefKind, String, Option<String>)> {
    let rest = body.trim_start().strip_prefix("embed")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let target = rest.trim_start();
    if target.len() >= 5 && target.starts_with("[[") && target.ends_with("]]") {
        let (name, alias) = split_name_alias(&target[2..target.len() - 2])?;
        Some((RefKind::EmbedPage, name, alias))
    } else if target.len() >= 5 && target.starts_with("((") && target.ends_with("))") {
        let id = target[2..target.len() - 2].trim();
        if id.is_empty() {
            return None;
        }
        Some((RefKind::EmbedBlock, id.to_string(), None))
    } else {
        None
    }
}

/// Scan `content` for reference tokens, in order of appearance.
///
/// Unterminated delimiters produce no token for that occurrence and do not
/// abort the scan of the remainder. A recognized token is consumed whole; a
/// `{{...}}` span that is not an embed is left to the ordinary scan so
/// references inside it still count.
pub fn parse(content: &str) -> Vec<RawRef> {
    let mut refs = Vec::new();
    let n = content.len();
    let mut i = 0usize;
    let mut prev: Option<char> = None;
    // Once a closer search comes up empty, every later search would rescan a
    // suffix of the same territory; the flags make those failures free.
    let mut no_bracket_close = false;
    let mut no_paren_close = false;
    let mut no_brace_close = false;
    // Non-embed braces are not consumed, so successful `}}` positions are
    // cached to keep repeated openers from rescanning the same span. The
    // cache also carries the body end with trailing whitespace dropped,
    // computed once per closer rather than once per opener.
    let mut brace_close_hint: Option<(usize, usize)> = None;

    while i < n {
        let rest = &content[i..];

        if rest.starts_with("{{") && !no_brace_close {
            let search_from = i + 2;
            let close = match brace_close_hint.filter(|(c, _)| *c >= search_from) {
                Some(hit) => Some(hit),
                None => content[search_from..].find("}}").map(|rel| {
                    let c = search_from + rel;
                    (c, content[..c].trim_end().len())
                }),
            };
            match close {
                Some((c, body_end)) => {
                    brace_close_hint = Some((c, body_end));
                    let body = &content[search_from..body_end.max(search_from)];
                    if let Some((kind, raw, alias)) = parse_embed(body) {
                        let end = c + 2;
                        refs.push(RawRef {
                            kind,
                            raw,
                            alias,
                            start: i,
                            end,
                        });
                        i = end;
                        prev = Some('}');
                        continue;
                    }
                    // not an embed: skip the opener only
                    i += 2;
                    prev = Some('{');
                    continue;
                }
                None => {
                    no_brace_close = true;
                    i += 2;
                    prev = Some('{');
                    continue;
                }
            }
        }

        if rest.starts_with("[[") && !no_bracket_close {
            match rest[2..].find("]]") {
                Some(rel) => {
                    let end = i + 2 + rel + 2;
                    if let Some((name, alias)) = split_name_alias(&rest[2..2 + rel]) {
                        refs.push(RawRef {
                            kind: RefKind::Page,
                            raw: name,
                            alias,
                            start: i,
                            end,
                        });
                    }
                    i = end;
                    prev = Some(']');
                    continue;
                }
                None => {
                    no_bracket_close = true;
                    i += 2;
                    prev = Some('[');
                    continue;
                }
            }
        }

        if rest.starts_with("((") && !no_paren_close {
            match rest[2..].find("))") {
                Some(rel) => {
                    let end = i + 2 + rel + 2;
                    let id = rest[2..2 + rel].trim();
                    if !id.is_empty() {
                        refs.push(RawRef {
                            kind: RefKind::Block,
                            raw: id.to_string(),
                            alias: None,
                            start: i,
                            end,
                        });
                    }
                    i = end;
                    prev = Some(')');
                    continue;
                }
                None => {
                    no_paren_close = true;
                    i += 2;
                    prev = Some('(');
                    continue;
                }
            }
        }

        let c = rest.chars().next().expect("i < n on a char boundary");
        if (c == '#' || c == '@') && at_word_boundary(prev) {
            let word_len = tag_run_len(&rest[1..]);
            if word_len > 0 {
                let word = &rest[1..1 + word_len];
                refs.push(RawRef {
                    kind: if c == '#' { RefKind::Tag } else { RefKind::Mention },
                    raw: normalize_tag(word),
                    alias: None,
                    start: i,
                    end: i + 1 + word_len,
                });
                prev = word.chars().last();
                i += 1 + word_len;
                continue;
            }
        }

        prev = Some(c);
        i += c.len_utf8();
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn kinds(refs: &[RawRef]) -> Vec<RefKind> {
        refs.iter().map(|r| r.kind).collect()
    }

    #[test]
    fn test_page_and_block_refs_with_offsets() {
        let refs = parse("[[A]] and ((b1))");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, RefKind::Page);
        assert_eq!(refs[0].raw, "A");
        assert_eq!((refs[0].start, refs[0].end), (0, 5));
        assert_eq!(refs[1].kind, RefKind::Block);
        assert_eq!(refs[1].raw, "b1");
        assert_eq!((refs[1].start, refs[1].end), (10, 16));
    }

    #[test]
    fn test_unterminated_delimiters_yield_nothing() {
        assert!(parse("[[unterminated").is_empty());
        assert!(parse("((half open").is_empty());
    }

    #[test]
    fn test_unterminated_embed_still_scans_inner_reference() {
        let refs = parse("{{embed [[x]]");
        assert_eq!(refs.len(), 1, "no embed token, but the inner ref stands");
        assert_eq!(refs[0].kind, RefKind::Page);
        assert_eq!(refs[0].raw, "x");
    }

    #[test]
    fn test_unterminated_opener_does_not_abort_scan() {
        let refs = parse("((dangling [[Still Works]] and #tag");
        assert_eq!(kinds(&refs), vec![RefKind::Page, RefKind::Tag]);
        assert_eq!(refs[0].raw, "Still Works");
        assert_eq!(refs[1].raw, "tag");
    }

    #[test]
    fn test_alias_is_captured_but_separate() {
        let refs = parse("see [[Project Plan|the plan]]");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].raw, "Project Plan");
        assert_eq!(refs[0].alias.as_deref(), Some("the plan"));
        assert_eq!((refs[0].start, refs[0].end), (4, 29));
    }

    #[test]
    fn test_empty_names_are_rejected_but_consumed() {
        assert!(parse("[[ ]] (( )) [[|alias]]").is_empty());
        let refs = parse("[[ ]][[ok]]");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].raw, "ok");
    }

    #[test]
    fn test_tags_and_mentions_normalize() {
        let refs = parse("ship it #Alpha-2 cc @Ada_Lovelace");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, RefKind::Tag);
        assert_eq!(refs[0].raw, "alpha-2");
        assert_eq!((refs[0].start, refs[0].end), (8, 16));
        assert_eq!(refs[1].kind, RefKind::Mention);
        assert_eq!(refs[1].raw, "ada_lovelace");
    }

    #[test]
    fn test_tag_requires_word_boundary() {
        assert!(parse("a#b c@d ##e @@f").is_empty());
        let refs = parse("(#ok) end");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].raw, "ok");
    }

    #[test]
    fn test_tag_allow_list_strips_punctuation() {
        let refs = parse("#tag, then #tag.");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].raw, "tag");
        assert_eq!(refs[1].raw, "tag");
        assert_eq!((refs[0].start, refs[0].end), (0, 4));
    }

    #[test]
    fn test_unicode_tags_and_names() {
        let refs = parse("#Café and [[Über Uns]]");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].raw, "café");
        assert_eq!(refs[1].raw, "Über Uns");
    }

    #[test]
    fn test_embed_forms() {
        let refs = parse("{{embed [[Design Notes]]}} {{embed ((deadbeef))}}");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, RefKind::EmbedPage);
        assert_eq!(refs[0].raw, "Design Notes");
        assert_eq!((refs[0].start, refs[0].end), (0, 26));
        assert_eq!(refs[1].kind, RefKind::EmbedBlock);
        assert_eq!(refs[1].raw, "deadbeef");
    }

    #[test]
    fn test_non_embed_braces_do_not_hide_references() {
        let refs = parse("{{query [[Inside]]}} tail");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, RefKind::Page);
        assert_eq!(refs[0].raw, "Inside");
    }

    #[test]
    fn test_embed_trailing_whitespace_and_stacked_openers() {
        let refs = parse("{{embed [[y]]   }}");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, RefKind::EmbedPage);
        assert_eq!(refs[0].raw, "y");

        // the outer opener caches the closer; the inner one reuses it and
        // still parses through the padding
        let refs = parse("{{{{embed [[x]]  }}");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, RefKind::EmbedPage);
        assert_eq!(refs[0].raw, "x");
        assert_eq!((refs[0].start, refs[0].end), (2, 19));

        assert!(parse("{{{{{{{{   }}").is_empty());
    }

    #[test]
    fn test_repeated_refs_all_reported_in_order() {
        let refs = parse("[[A]] ((x)) [[A]] #a [[B]]");
        assert_eq!(
            kinds(&refs),
            vec![
                RefKind::Page,
                RefKind::Block,
                RefKind::Page,
                RefKind::Tag,
                RefKind::Page
            ]
        );
        assert_eq!(refs[0].raw, refs[2].raw);
    }

    #[test]
    fn test_normalize_page_name_folds_case_and_whitespace() {
        assert_eq!(normalize_page_name("  Project   Plan "), "project plan");
        assert_eq!(normalize_page_name("ÜBER uns"), "über uns");
        assert_eq!(
            normalize_page_name("Cafe\u{0301}"),
            normalize_page_name("Caf\u{e9}"),
            "composed and decomposed spellings share a key"
        );
    }

    #[test]
    fn test_link_kind_mapping() {
        assert_eq!(RefKind::Page.link_kind(), LinkKind::PageRef);
        assert_eq!(RefKind::Block.link_kind(), LinkKind::BlockRef);
        assert_eq!(RefKind::Tag.link_kind(), LinkKind::Tag);
        assert_eq!(RefKind::Mention.link_kind(), LinkKind::Tag);
        assert_eq!(RefKind::EmbedPage.link_kind(), LinkKind::Embed);
        assert!(RefKind::EmbedBlock.targets_block());
        assert!(!RefKind::EmbedPage.targets_block());
    }
}
