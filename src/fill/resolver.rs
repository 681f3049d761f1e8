//! Cross-fragment token substitution.
//!
//! Word splits visible text into arbitrary runs (spell-check state, style
//! flips, revision history), so a placeholder like `<company name>` often
//! arrives as `<com` / `pany na` / `me>` across three `w:t` fragments.
//! The resolver matches tokens over the fragment sequence of one
//! container, splices replacements into the boundary fragments, and
//! blanks fully-consumed interior fragments so run styling stays intact.

use crate::docx::{paragraph_fragments, set_fragment_text};
use crate::model::{ReplacementMap, LOGO_TOKEN};
use crate::xml::{NodeId, XmlTree};
use regex::Regex;
use std::collections::BTreeSet;

/// What resolution did to one container.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    /// Any fragment text changed.
    pub changed: bool,
    /// The logo token was found (and removed).
    pub logo_requested: bool,
    /// Well-formed tokens present before substitution (logo excluded).
    pub found: BTreeSet<String>,
    /// Well-formed tokens remaining after substitution (logo excluded).
    pub unresolved: BTreeSet<String>,
}

/// Token resolution engine for one replacement map.
pub struct Resolver<'a> {
    fields: &'a ReplacementMap,
    token_re: Regex,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over the given map.
    pub fn new(fields: &'a ReplacementMap) -> Self {
        Resolver {
            fields,
            token_re: Regex::new(r"<[^<>]+>").unwrap(),
        }
    }

    /// The map this resolver substitutes from.
    pub fn fields(&self) -> &ReplacementMap {
        self.fields
    }

    /// Well-formed token spans in a text, lowercased.
    pub fn tokens_in(&self, text: &str) -> Vec<String> {
        self.token_re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect()
    }

    /// Resolve every token in one container's fragment sequence.
    ///
    /// The container is a body/header/footer paragraph (`w:t` fragments)
    /// or a drawing text paragraph (`a:t` fragments). Matching is
    /// case-insensitive and spans fragment boundaries; the possessive
    /// pre-pass runs before generic substitution.
    pub fn resolve_container(
        &self,
        tree: &mut XmlTree,
        container: NodeId,
        fragment_tag: &str,
    ) -> ResolveOutcome {
        let mut outcome = ResolveOutcome::default();
        let fragments = paragraph_fragments(tree, container, fragment_tag);
        if fragments.is_empty() {
            return outcome;
        }

        let originals: Vec<String> = fragments
            .iter()
            .map(|&f| tree.element_text(f))
            .collect();
        let mut texts: Vec<Vec<char>> = originals
            .iter()
            .map(|t| t.chars().collect())
            .collect();

        for span in self.token_re.find_iter(&originals.concat()) {
            if !span.as_str().eq_ignore_ascii_case(LOGO_TOKEN) {
                outcome.found.insert(span.as_str().to_string());
            }
        }

        for token in self.fields.tokens() {
            if token == LOGO_TOKEN {
                continue;
            }
            if let Some(value) = self.fields.get(token) {
                if !value.trim().is_empty() {
                    possessive_pass(&mut texts, token, value);
                }
            }
        }

        self.generic_pass(&mut texts, &mut outcome.logo_requested);

        for (index, fragment) in fragments.iter().enumerate() {
            let new_text: String = texts[index].iter().collect();
            if new_text != originals[index] {
                set_fragment_text(tree, *fragment, &new_text);
                outcome.changed = true;
            }
        }

        let after: String = texts.iter().flat_map(|t| t.iter()).collect();
        for span in self.token_re.find_iter(&after) {
            if !span.as_str().eq_ignore_ascii_case(LOGO_TOKEN) {
                outcome.unresolved.insert(span.as_str().to_string());
            }
        }

        outcome
    }

    /// The cursor scan: at each `<`, try every token longest-first; on a
    /// match splice and jump past the inserted value (inserted text is
    /// never rescanned), otherwise advance one character.
    fn generic_pass(&self, texts: &mut [Vec<char>], logo_requested: &mut bool) {
        let patterns: Vec<(&str, Vec<char>)> = self
            .fields
            .tokens()
            .iter()
            .map(|t| (t.as_str(), t.chars().collect()))
            .collect();

        let mut frag = 0usize;
        let mut offset = 0usize;
        loop {
            let Some((next_frag, next_offset)) = find_char(texts, frag, offset, '<') else {
                break;
            };
            frag = next_frag;
            offset = next_offset;

            let mut matched = false;
            for (token, pattern) in &patterns {
                if let Some(end) = match_at(texts, (frag, offset), pattern) {
                    let is_logo = *token == LOGO_TOKEN;
                    let value = if is_logo {
                        ""
                    } else {
                        self.fields.get(token).unwrap_or("")
                    };
                    splice(texts, (frag, offset), end, value);
                    if is_logo {
                        *logo_requested = true;
                    }
                    offset += value.chars().count();
                    matched = true;
                    break;
                }
            }
            if !matched {
                offset += 1;
            }
        }
    }
}

/// Well-formed `<...>` spans in a text, case preserved.
pub fn discover_tokens(text: &str) -> BTreeSet<String> {
    let token_re = Regex::new(r"<[^<>]+>").unwrap();
    token_re
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Replace occurrences of `token` immediately followed by `'s` with the
/// possessive form of `value`. Runs through the same cross-fragment
/// machinery so split tokens and their styling survive.
fn possessive_pass(texts: &mut [Vec<char>], token: &str, value: &str) {
    let pattern: Vec<char> = token.chars().chain(['\'', 's']).collect();
    let mut frag = 0usize;
    let mut offset = 0usize;
    loop {
        let Some((next_frag, next_offset)) = find_char(texts, frag, offset, '<') else {
            break;
        };
        frag = next_frag;
        offset = next_offset;
        if let Some(end) = match_at(texts, (frag, offset), &pattern) {
            let replacement = possessive_form(value);
            splice(texts, (frag, offset), end, &replacement);
            offset += replacement.chars().count();
        } else {
            offset += 1;
        }
    }
}

/// `Smith` -> `Smith's`, `Jones` -> `Jones'`.
fn possessive_form(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed
        .chars()
        .last()
        .is_some_and(|c| c.eq_ignore_ascii_case(&'s'))
    {
        format!("{trimmed}'")
    } else {
        format!("{trimmed}'s")
    }
}

/// Next occurrence of `needle` at or after the cursor.
fn find_char(
    texts: &[Vec<char>],
    mut frag: usize,
    mut offset: usize,
    needle: char,
) -> Option<(usize, usize)> {
    while frag < texts.len() {
        if let Some(pos) = texts[frag][offset..].iter().position(|&c| c == needle) {
            return Some((frag, offset + pos));
        }
        frag += 1;
        offset = 0;
    }
    None
}

/// Match a pattern starting at the cursor, case-insensitively, across
/// fragment boundaries (empty fragments are skipped). Returns the
/// position just past the final matched character.
fn match_at(
    texts: &[Vec<char>],
    start: (usize, usize),
    pattern: &[char],
) -> Option<(usize, usize)> {
    let (mut frag, mut offset) = start;
    for &expected in pattern {
        while frag < texts.len() && offset >= texts[frag].len() {
            frag += 1;
            offset = 0;
        }
        if frag >= texts.len() {
            return None;
        }
        if !chars_match(texts[frag][offset], expected) {
            return None;
        }
        offset += 1;
    }
    Some((frag, offset))
}

fn chars_match(a: char, b: char) -> bool {
    normalize_apostrophe(a).eq_ignore_ascii_case(&normalize_apostrophe(b))
}

fn normalize_apostrophe(c: char) -> char {
    if c == '\u{2019}' {
        '\''
    } else {
        c
    }
}

/// Splice `value` over the matched span: it lands in the starting
/// fragment, interior fragments blank, the final fragment keeps its tail.
fn splice(texts: &mut [Vec<char>], start: (usize, usize), end: (usize, usize), value: &str) {
    let (start_frag, start_offset) = start;
    let (end_frag, end_offset) = end;
    if start_frag == end_frag {
        let tail: Vec<char> = texts[end_frag][end_offset..].to_vec();
        texts[start_frag].truncate(start_offset);
        texts[start_frag].extend(value.chars());
        texts[start_frag].extend(tail);
    } else {
        texts[start_frag].truncate(start_offset);
        texts[start_frag].extend(value.chars());
        for interior in texts.iter_mut().take(end_frag).skip(start_frag + 1) {
            interior.clear();
        }
        texts[end_frag].drain(..end_offset);
    }
}
