//! Search-and-replace driver.
//!
//! Replacement runs in two passes: the first finds every match and sizes
//! the output, the second materializes it. A zero-length match advances
//! the scan by one character so replace-all always terminates.

use crate::regex::vm::RegexSearcher;
use crate::regex::{CompiledPattern, GroupReg, GROUP_REG_CNT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Replace only the first match at or after the start index.
    Once,
    /// Replace every match.
    All,
}

struct MatchSite {
    start: usize,
    len: usize,
    expansion: String,
}

/// Expand a replacement template against one match: `%1`..`%9` insert
/// group captures, `%*` the whole match, `%%` a literal percent sign.
fn expand_template(
    template: &str,
    subject: &str,
    m_start: usize,
    m_len: usize,
    regs: &[GroupReg; GROUP_REG_CNT],
) -> String {
    let mut out = String::new();
    let mut chars = template.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('*') => out.push_str(&subject[m_start..m_start + m_len]),
            Some('%') => out.push('%'),
            Some(d @ '1'..='9') => {
                let idx = d as usize - '1' as usize;
                if let Some((lo, hi)) = regs[idx].range() {
                    out.push_str(&subject[lo..hi]);
                }
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

impl RegexSearcher {
    /// Replace matches of `pat` in `subject` with the expansion of
    /// `template`, starting the scan at byte offset `start_idx`. Text
    /// before the start index is kept verbatim.
    pub fn replace(
        &mut self,
        pat: &CompiledPattern,
        subject: &str,
        template: &str,
        mode: ReplaceMode,
        start_idx: usize,
    ) -> String {
        // pass 1: find the match sites and size the result
        let mut sites: Vec<MatchSite> = Vec::new();
        let mut idx = start_idx.min(subject.len());
        loop {
            let (s, l) = match self.search_for_pattern(pat, subject, idx) {
                Some(hit) => hit,
                None => break,
            };
            let expansion = expand_template(template, subject, s, l, self.regs_snapshot());
            sites.push(MatchSite {
                start: s,
                len: l,
                expansion,
            });
            if mode == ReplaceMode::Once {
                break;
            }
            if l == 0 {
                // advance past the zero-length match by one character
                match subject[s..].chars().next() {
                    Some(c) => idx = s + c.len_utf8(),
                    None => break,
                }
            } else {
                idx = s + l;
            }
            if idx > subject.len() {
                break;
            }
        }

        let total: usize = subject.len()
            + sites
                .iter()
                .map(|m| m.expansion.len())
                .sum::<usize>()
            - sites.iter().map(|m| m.len).sum::<usize>();

        // pass 2: materialize
        let mut out = String::with_capacity(total);
        let mut copied = 0usize;
        for site in &sites {
            out.push_str(&subject[copied..site.start]);
            out.push_str(&site.expansion);
            copied = site.start + site.len;
        }
        out.push_str(&subject[copied..]);
        out
    }

    /// Compile, then replace; a pattern that fails to compile leaves the
    /// subject unchanged.
    pub fn compile_and_replace(
        &mut self,
        pattern: &str,
        subject: &str,
        template: &str,
        mode: ReplaceMode,
        start_idx: usize,
    ) -> String {
        match crate::regex::compile::compile_pattern(pattern) {
            Ok(pat) => self.replace(&pat, subject, template, mode, start_idx),
            Err(_) => subject.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::compile::compile_pattern;

    fn replace_all(pattern: &str, subject: &str, template: &str) -> String {
        let pat = compile_pattern(pattern).unwrap();
        RegexSearcher::new().replace(&pat, subject, template, ReplaceMode::All, 0)
    }

    #[test]
    fn replace_all_digit_runs() {
        // every digit run collapses to one '#'
        assert_eq!(replace_all("%d+", "a12b345c", "#"), "a#b#c");
    }

    #[test]
    fn zero_length_matches_advance_one_character() {
        // "x*" matches empty at every position
        assert_eq!(replace_all("x*", "abc", "-"), "-a-b-c-");
    }

    #[test]
    fn replace_once_stops_after_first() {
        let pat = compile_pattern("o").unwrap();
        let out = RegexSearcher::new().replace(&pat, "foo boo", "0", ReplaceMode::Once, 0);
        assert_eq!(out, "f0o boo");
    }

    #[test]
    fn start_index_preserves_prefix() {
        let pat = compile_pattern("o").unwrap();
        let out = RegexSearcher::new().replace(&pat, "foo boo", "0", ReplaceMode::All, 3);
        assert_eq!(out, "foo b00");
    }

    #[test]
    fn group_references_in_template() {
        assert_eq!(
            replace_all("([a-z]+)@([a-z]+)", "mail: fred@cave", "%2.%1"),
            "mail: cave.fred"
        );
    }

    #[test]
    fn whole_match_and_literal_percent() {
        assert_eq!(replace_all("[0-9]+", "take 5", "[%*]"), "take [5]");
        assert_eq!(replace_all("x", "x", "100%%"), "100%");
    }

    #[test]
    fn unbound_group_expands_empty() {
        assert_eq!(replace_all("(a)|(b)", "ab", "<%1%2>"), "<a><b>");
    }

    #[test]
    fn no_match_returns_subject() {
        assert_eq!(replace_all("zzz", "abc", "#"), "abc");
    }
}
