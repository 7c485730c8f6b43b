//! The NFA simulator: a single-threaded backtracker with an explicit
//! frame stack, plus the search drivers.
//!
//! Stack depth is bounded by the number of pending two-way branches, not
//! by input length; each frame snapshots the group registers and loop
//! counters so backtracking restores them wholesale. Two-branch splits
//! run the first branch, swap to the second from the same starting point,
//! and keep the better result under the pattern's length policy.

use crate::regex::{
    class_matches, is_word_char, to_lower_char, to_upper_char, CompiledPattern, GroupReg,
    NodeType, RangeEntry, RegexCompiler, StateId, GROUP_REG_CNT, LOOP_VARS_MAX, STATE_INVALID,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    /// Running the first branch of a two-way split.
    Eps1,
    /// Running the second branch; `retval` holds the first's result.
    Eps2,
    /// Running an assertion sub-machine.
    Assert,
}

#[derive(Clone)]
struct Frame {
    kind: FrameKind,
    start_ofs: usize,
    str_ofs: usize,
    state: StateId,
    final_state: StateId,
    retval: i32,
    regs: [GroupReg; GROUP_REG_CNT],
    loop_vars: [i16; LOOP_VARS_MAX],
}

/// A searcher owns the group registers of its most recent operation.
pub struct RegexSearcher {
    regs: [GroupReg; GROUP_REG_CNT],
    group_cnt: usize,
    stack: Vec<Frame>,
}

fn char_at(s: &str, pos: usize) -> Option<char> {
    s[pos..].chars().next()
}

fn char_before(s: &str, pos: usize) -> Option<char> {
    s[..pos].chars().next_back()
}

impl RegexSearcher {
    pub fn new() -> Self {
        RegexSearcher {
            regs: [GroupReg::clear(); GROUP_REG_CNT],
            group_cnt: 0,
            stack: Vec::new(),
        }
    }

    /// Captured byte range of group `n` (1-based) in the last searched
    /// string.
    pub fn group(&self, n: usize) -> Option<(usize, usize)> {
        if n == 0 || n > GROUP_REG_CNT {
            return None;
        }
        self.regs[n - 1].range()
    }

    pub fn group_count(&self) -> usize {
        self.group_cnt
    }

    /// The full register bank of the last operation.
    pub(crate) fn regs_snapshot(&self) -> &[GroupReg; GROUP_REG_CNT] {
        &self.regs
    }

    fn clear_regs(&mut self) {
        self.regs = [GroupReg::clear(); GROUP_REG_CNT];
    }

    /// Match the pattern against the leading substring of `s`. Returns
    /// the matched byte length, or -1 for no match. Not a search: the
    /// match is anchored at the start.
    pub fn match_pattern(&mut self, pat: &CompiledPattern, s: &str) -> i32 {
        self.clear_regs();
        self.group_cnt = pat.group_cnt;
        self.match_at(pat, s, 0)
    }

    /// Search for the pattern at each position of `entire` starting at
    /// byte offset `start`. Returns `(match_start, match_len)` in bytes.
    pub fn search_for_pattern(
        &mut self,
        pat: &CompiledPattern,
        entire: &str,
        start: usize,
    ) -> Option<(usize, usize)> {
        self.clear_regs();
        self.group_cnt = pat.group_cnt;
        if start > entire.len() {
            return None;
        }

        let mut best: Option<(usize, usize, [GroupReg; GROUP_REG_CNT])> = None;
        let mut max_start_pos = entire.len();

        let mut pos = start;
        while pos <= max_start_pos {
            let matchlen = self.match_at(pat, entire, pos);
            if matchlen >= 0 {
                let matchlen = matchlen as usize;
                if pat.first_begin {
                    // earliest start wins; no later match can beat it
                    return Some((pos, matchlen));
                }
                // first-end mode: keep the match that ends earliest, with
                // ties going to the length policy
                let end = pos + matchlen;
                let keep = match &best {
                    None => true,
                    Some((bs, bl, _)) => {
                        let best_end = bs + bl;
                        if end < best_end {
                            true
                        } else {
                            // same end: longest mode keeps the earlier
                            // (longer) match, shortest keeps the new one
                            end == best_end && !pat.longest_match
                        }
                    }
                };
                if keep {
                    best = Some((pos, matchlen, self.regs));
                    // nothing starting past our end can end earlier
                    max_start_pos = pos + matchlen;
                }
            }
            if pos >= entire.len() {
                break;
            }
            pos += char_at(entire, pos).map(|c| c.len_utf8()).unwrap_or(1);
        }

        match best {
            Some((s, l, regs)) => {
                self.regs = regs;
                Some((s, l))
            }
            None => None,
        }
    }

    /// Compile and match in one step; the compiled pattern is discarded.
    pub fn compile_and_match(&mut self, pattern: &str, s: &str) -> i32 {
        match RegexCompiler::new().compile(pattern) {
            Ok(pat) => self.match_pattern(&pat, s),
            Err(_) => -1,
        }
    }

    /// Compile and search in one step.
    pub fn compile_and_search(&mut self, pattern: &str, s: &str) -> Option<(usize, usize)> {
        match RegexCompiler::new().compile(pattern) {
            Ok(pat) => self.search_for_pattern(&pat, s, 0),
            Err(_) => None,
        }
    }

    /// Core simulation: match starting at byte offset `start` of
    /// `entire`. Group registers are written as byte offsets into
    /// `entire`.
    pub(crate) fn match_at(&mut self, pat: &CompiledPattern, entire: &str, start: usize) -> i32 {
        self.stack.clear();
        let mut loop_vars = [0i16; LOOP_VARS_MAX];

        let mut cur_state = pat.machine.init;
        let mut final_state = pat.machine.fin;
        let mut pos = start;
        let mut start_ofs = start;

        // a zero-length pattern matches anything
        if cur_state == final_state {
            return 0;
        }

        'outer: loop {
            let tuple = &pat.tuples[cur_state as usize];
            let mut next_override: Option<StateId> = None;
            let mut failed = false;

            match &tuple.typ {
                NodeType::ZeroVar(var) => {
                    loop_vars[*var as usize] = 0;
                }

                NodeType::LoopBranch { var, min, max } => {
                    let v = &mut loop_vars[*var as usize];
                    if (*v as u16) < *min {
                        *v += 1;
                        next_override = Some(if tuple.shortest {
                            tuple.next2
                        } else {
                            tuple.next1
                        });
                    } else if max.map(|mx| *v as u16 >= mx).unwrap_or(false) {
                        next_override = Some(if tuple.shortest {
                            tuple.next1
                        } else {
                            tuple.next2
                        });
                    } else {
                        // indeterminate: count the iteration and fork like
                        // a two-way epsilon
                        *v += 1;
                        self.stack.push(Frame {
                            kind: FrameKind::Eps1,
                            start_ofs,
                            str_ofs: pos,
                            state: cur_state,
                            final_state,
                            retval: -1,
                            regs: self.regs,
                            loop_vars,
                        });
                        next_override = Some(tuple.next1);
                        start_ofs = pos;
                    }
                }

                NodeType::GroupMatch(id) => {
                    let reg = self.regs[*id as usize];
                    match reg.range() {
                        None => failed = true,
                        Some((lo, hi)) => {
                            let slice = &entire.as_bytes()[lo..hi];
                            let rest = &entire.as_bytes()[pos..];
                            if rest.len() < slice.len() || &rest[..slice.len()] != slice {
                                failed = true;
                            } else {
                                pos += slice.len();
                            }
                        }
                    }
                }

                NodeType::TextBegin => {
                    if pos != 0 {
                        failed = true;
                    }
                }

                NodeType::TextEnd => {
                    if pos != entire.len() {
                        failed = true;
                    }
                }

                NodeType::WordBegin => {
                    if pos > 0 && char_before(entire, pos).map(is_word_char).unwrap_or(false) {
                        failed = true;
                    } else if !char_at(entire, pos).map(is_word_char).unwrap_or(false) {
                        failed = true;
                    }
                }

                NodeType::WordEnd => {
                    if char_at(entire, pos).map(is_word_char).unwrap_or(false) {
                        failed = true;
                    } else if pos == 0
                        || !char_before(entire, pos).map(is_word_char).unwrap_or(false)
                    {
                        failed = true;
                    }
                }

                NodeType::WordChar => match char_at(entire, pos) {
                    Some(c) if is_word_char(c) => pos += c.len_utf8(),
                    _ => failed = true,
                },

                NodeType::NonWordChar => match char_at(entire, pos) {
                    Some(c) if !is_word_char(c) => pos += c.len_utf8(),
                    _ => failed = true,
                },

                NodeType::WordBoundary | NodeType::NonWordBoundary => {
                    let prev_is_word =
                        pos > 0 && char_before(entire, pos).map(is_word_char).unwrap_or(false);
                    let next_is_word = char_at(entire, pos).map(is_word_char).unwrap_or(false);
                    let boundary = prev_is_word != next_is_word;
                    let want = tuple.typ == NodeType::WordBoundary;
                    if boundary != want {
                        failed = true;
                    }
                }

                NodeType::Wildcard => match char_at(entire, pos) {
                    Some(c) => pos += c.len_utf8(),
                    None => failed = true,
                },

                NodeType::Range {
                    ofs,
                    cnt,
                    exclusive,
                } => match char_at(entire, pos) {
                    None => failed = true,
                    Some(c) => {
                        let entries = &pat.ranges[*ofs..*ofs + *cnt];
                        let hit = entries.iter().any(|e| range_entry_matches(pat, *e, c));
                        if hit == *exclusive {
                            failed = true;
                        } else {
                            pos += c.len_utf8();
                        }
                    }
                },

                NodeType::Class(class) => match char_at(entire, pos) {
                    Some(c) if class_matches(*class, c) => pos += c.len_utf8(),
                    _ => failed = true,
                },

                NodeType::Literal(pat_ch) => match char_at(entire, pos) {
                    None => failed = true,
                    Some(c) => {
                        if literal_matches(pat, *pat_ch, c) {
                            pos += c.len_utf8();
                        } else {
                            failed = true;
                        }
                    }
                },

                NodeType::AssertPos { init, fin } | NodeType::AssertNeg { init, fin } => {
                    // run the sub-machine as a sub-state; the result is
                    // checked when the frame pops
                    self.stack.push(Frame {
                        kind: FrameKind::Assert,
                        start_ofs,
                        str_ofs: pos,
                        state: cur_state,
                        final_state,
                        retval: -1,
                        regs: self.regs,
                        loop_vars,
                    });
                    final_state = *fin;
                    next_override = Some(*init);
                    start_ofs = pos;
                }

                NodeType::GroupEnter(id) => {
                    if (*id as usize) < GROUP_REG_CNT {
                        self.regs[*id as usize].start_ofs = pos as i32;
                    }
                }

                NodeType::GroupExit(id) => {
                    if (*id as usize) < GROUP_REG_CNT {
                        self.regs[*id as usize].end_ofs = pos as i32;
                    }
                }

                NodeType::Epsilon => {
                    if tuple.next2 != STATE_INVALID {
                        // two-way split: try the first branch, remembering
                        // enough to start the second from the same point
                        self.stack.push(Frame {
                            kind: FrameKind::Eps1,
                            start_ofs,
                            str_ofs: pos,
                            state: cur_state,
                            final_state,
                            retval: -1,
                            regs: self.regs,
                            loop_vars,
                        });
                        next_override = Some(tuple.next1);
                        start_ofs = pos;
                    }
                }

                NodeType::Invalid => failed = true,
            }

            let mut ret: i32;
            if failed {
                ret = -1;
            } else {
                cur_state = next_override.unwrap_or(pat.tuples[cur_state as usize].next1);
                if cur_state == final_state {
                    ret = (pos - start_ofs) as i32;
                } else if cur_state == STATE_INVALID {
                    ret = -1;
                } else {
                    continue 'outer;
                }
            }

            // local return: unwind the frame stack with `ret`
            loop {
                let top_kind = match self.stack.last() {
                    None => return ret,
                    Some(f) => f.kind,
                };
                match top_kind {
                    FrameKind::Eps1 => {
                        // first branch finished: save its outcome, rewind
                        // to the branch point, take the second branch
                        let f1 = self.stack.last().cloned().unwrap();
                        self.stack.push(Frame {
                            kind: FrameKind::Eps2,
                            start_ofs,
                            str_ofs: pos,
                            state: cur_state,
                            final_state,
                            retval: ret,
                            regs: self.regs,
                            loop_vars,
                        });
                        self.regs = f1.regs;
                        loop_vars = f1.loop_vars;
                        pos = f1.str_ofs;
                        start_ofs = f1.str_ofs;
                        final_state = f1.final_state;
                        cur_state = pat.tuples[f1.state as usize].next2;
                        if cur_state == final_state {
                            ret = (pos - start_ofs) as i32;
                            continue;
                        }
                        if cur_state == STATE_INVALID {
                            ret = -1;
                            continue;
                        }
                        continue 'outer;
                    }
                    FrameKind::Eps2 => {
                        let f2 = self.stack.pop().unwrap();
                        let f1 = self.stack.pop().unwrap();
                        let ret1 = f2.retval;
                        let ret2 = ret;
                        if ret1 < 0 && ret2 < 0 {
                            // both branches failed: restore the branch
                            // point and propagate the failure
                            self.regs = f1.regs;
                            loop_vars = f1.loop_vars;
                            pos = f1.str_ofs;
                            start_ofs = f1.start_ofs;
                            cur_state = f1.state;
                            final_state = f1.final_state;
                            ret = -1;
                            continue;
                        }
                        let node_shortest = pat.tuples[f1.state as usize].shortest;
                        let ret1_wins = if pat.longest_match && !node_shortest {
                            ret2 < 0 || ret1 >= ret2
                        } else {
                            (ret1 >= 0 && ret2 < 0)
                                || (ret1 >= 0 && ret2 >= 0 && ret1 <= ret2)
                        };
                        let prefix = (f1.str_ofs - f1.start_ofs) as i32;
                        if ret1_wins {
                            // adopt the first branch's final machine state
                            self.regs = f2.regs;
                            loop_vars = f2.loop_vars;
                            pos = f2.str_ofs;
                            cur_state = f2.state;
                            final_state = f2.final_state;
                            start_ofs = f1.start_ofs;
                            ret = ret1 + prefix;
                        } else {
                            // the machine already sits at the second
                            // branch's final state
                            start_ofs = f1.start_ofs;
                            final_state = f1.final_state;
                            ret = ret2 + prefix;
                        }
                        continue;
                    }
                    FrameKind::Assert => {
                        let f = self.stack.pop().unwrap();
                        self.regs = f.regs;
                        loop_vars = f.loop_vars;
                        pos = f.str_ofs;
                        start_ofs = f.start_ofs;
                        final_state = f.final_state;
                        let positive = matches!(
                            pat.tuples[f.state as usize].typ,
                            NodeType::AssertPos { .. }
                        );
                        if positive != (ret >= 0) {
                            ret = -1;
                            continue;
                        }
                        cur_state = pat.tuples[f.state as usize].next1;
                        if cur_state == final_state {
                            ret = (pos - start_ofs) as i32;
                            continue;
                        }
                        if cur_state == STATE_INVALID {
                            ret = -1;
                            continue;
                        }
                        continue 'outer;
                    }
                }
            }
        }
    }
}

impl Default for RegexSearcher {
    fn default() -> Self {
        Self::new()
    }
}

fn range_entry_matches(pat: &CompiledPattern, entry: RangeEntry, c: char) -> bool {
    match entry {
        RangeEntry::Class(class) => class_matches(class, c),
        RangeEntry::Chars(lo, hi) => {
            if pat.case_sensitive {
                lo <= c && c <= hi
            } else if lo.is_uppercase() && hi.is_uppercase() {
                let u = to_upper_char(c);
                lo <= u && u <= hi
            } else if lo.is_lowercase() && hi.is_lowercase() {
                let l = to_lower_char(c);
                lo <= l && l <= hi
            } else {
                lo <= c && c <= hi
            }
        }
    }
}

/// Case rules for literals: in case-insensitive mode the input folds to
/// the case of the pattern character; a caseless pattern character
/// compares exactly.
fn literal_matches(pat: &CompiledPattern, pat_ch: char, c: char) -> bool {
    if pat_ch == c {
        return true;
    }
    if !pat.case_sensitive && pat_ch.is_alphabetic() && c.is_alphabetic() {
        if pat_ch.is_uppercase() {
            return pat_ch == to_upper_char(c);
        }
        if pat_ch.is_lowercase() {
            return pat_ch == to_lower_char(c);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regex::compile::compile_pattern;

    fn searcher() -> RegexSearcher {
        RegexSearcher::new()
    }

    #[test]
    fn literal_match_and_miss() {
        let pat = compile_pattern("cave").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "cave entrance"), 4);
        assert_eq!(s.match_pattern(&pat, "grate"), -1);
    }

    #[test]
    fn star_takes_longest_by_default() {
        let pat = compile_pattern("a*").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "aaab"), 3);
        assert_eq!(s.match_pattern(&pat, "b"), 0);
    }

    #[test]
    fn shortest_modifier_flips_preference() {
        let pat = compile_pattern("a*?").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "aaa"), 0);
    }

    #[test]
    fn plus_requires_one() {
        let pat = compile_pattern("ab+c").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "abbbc"), 5);
        assert_eq!(s.match_pattern(&pat, "ac"), -1);
    }

    #[test]
    fn interval_counts() {
        let pat = compile_pattern("a{2,3}").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "a"), -1);
        assert_eq!(s.match_pattern(&pat, "aa"), 2);
        assert_eq!(s.match_pattern(&pat, "aaaa"), 3);
    }

    #[test]
    fn interval_exact() {
        let pat = compile_pattern("ab{2}c").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "abbc"), 4);
        assert_eq!(s.match_pattern(&pat, "abc"), -1);
        assert_eq!(s.match_pattern(&pat, "abbbc"), -1);
    }

    #[test]
    fn group_capture_last_iteration() {
        // search("(ab)+", "xxababcd") -> (2, 4), group 1
        // holding the last repetition
        let pat = compile_pattern("(ab)+").unwrap();
        let mut s = searcher();
        let hit = s.search_for_pattern(&pat, "xxababcd", 0);
        assert_eq!(hit, Some((2, 4)));
        assert_eq!(s.group(1), Some((4, 6)));
    }

    #[test]
    fn alternation_longest_vs_shortest() {
        // "a|ab" on "xab"
        let pat = compile_pattern("a|ab").unwrap();
        let mut s = searcher();
        assert_eq!(s.search_for_pattern(&pat, "xab", 0), Some((1, 2)));

        let pat = compile_pattern("<Min>a|ab").unwrap();
        assert_eq!(s.search_for_pattern(&pat, "xab", 0), Some((1, 1)));
    }

    #[test]
    fn backreference_matches_captured_text() {
        // "(a+)b%1"
        let pat = compile_pattern("(a+)b%1").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "aaabaaa"), 7);
        assert_eq!(s.match_pattern(&pat, "aaabaa"), -1);
    }

    #[test]
    fn unbound_backreference_fails() {
        let pat = compile_pattern("(x)?%1").unwrap();
        let mut s = searcher();
        // group 1 never matches, so %1 cannot match either
        assert_eq!(s.match_pattern(&pat, "yy"), -1);
    }

    #[test]
    fn anchors() {
        let pat = compile_pattern("^abc$").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "abc"), 3);
        assert_eq!(s.match_pattern(&pat, "abcd"), -1);
        assert_eq!(s.search_for_pattern(&pat, "xabc", 0), None);
    }

    #[test]
    fn word_ops() {
        let pat = compile_pattern("%<%w+%>").unwrap();
        let mut s = searcher();
        assert_eq!(s.search_for_pattern(&pat, "a word here", 2), Some((2, 4)));

        let b = compile_pattern("%bword%b").unwrap();
        assert!(s.search_for_pattern(&b, "a word", 0).is_some());
        assert!(s.search_for_pattern(&b, "awordy", 0).is_none());
    }

    #[test]
    fn char_classes_and_ranges() {
        let pat = compile_pattern("[a-z]+[0-9]+").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "cave12"), 6);
        assert_eq!(s.match_pattern(&pat, "CAVE12"), -1);

        let neg = compile_pattern("[^0-9]+").unwrap();
        assert_eq!(s.match_pattern(&neg, "abc9"), 3);
    }

    #[test]
    fn named_class_expr() {
        let pat = compile_pattern("<Digit>+").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "123x"), 3);

        let combo = compile_pattern("<Alpha|Digit>+").unwrap();
        assert_eq!(s.match_pattern(&combo, "ab12-"), 4);

        let excl = compile_pattern("<^Space>+").unwrap();
        assert_eq!(s.match_pattern(&excl, "ab cd"), 2);
    }

    #[test]
    fn nocase_folds_to_pattern_case() {
        let pat = compile_pattern("<NoCase>Lamp").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "lamp"), 4);
        assert_eq!(s.match_pattern(&pat, "LAMP"), 4);
        assert_eq!(s.match_pattern(&pat, "LaMp"), 4);

        let cased = compile_pattern("Lamp").unwrap();
        assert_eq!(s.match_pattern(&cased, "lamp"), -1);
    }

    #[test]
    fn nocase_match_length_is_case_stable() {
        let pat = compile_pattern("<NoCase>ab+c").unwrap();
        let mut s = searcher();
        let text = "abbbc";
        let n = s.match_pattern(&pat, text);
        assert_eq!(s.match_pattern(&pat, &text.to_uppercase()), n);
        assert_eq!(s.match_pattern(&pat, &text.to_lowercase()), n);
    }

    #[test]
    fn positive_lookahead_consumes_nothing() {
        let pat = compile_pattern("foo(?=bar)").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "foobar"), 3);
        assert_eq!(s.match_pattern(&pat, "foobaz"), -1);
    }

    #[test]
    fn negative_lookahead() {
        let pat = compile_pattern("foo(?!bar)").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "foobaz"), 3);
        assert_eq!(s.match_pattern(&pat, "foobar"), -1);
    }

    #[test]
    fn non_capturing_group_does_not_take_a_register() {
        let pat = compile_pattern("(?:ab)+(c)").unwrap();
        assert_eq!(pat.group_cnt, 1);
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "ababc"), 5);
        assert_eq!(s.group(1), Some((4, 5)));
    }

    #[test]
    fn search_scans_forward_from_start() {
        let pat = compile_pattern("%d+").unwrap();
        let mut s = searcher();
        assert_eq!(
            s.search_for_pattern(&pat, "room 12 and 345", 0),
            Some((5, 2))
        );
        assert_eq!(
            s.search_for_pattern(&pat, "room 12 and 345", 7),
            Some((12, 3))
        );
    }

    #[test]
    fn first_end_prefers_earliest_end() {
        // "ab|b" on "aab": first-begin finds "ab" at 1; first-end prefers
        // the match ending earliest
        let fe = compile_pattern("<FE>ab|b").unwrap();
        let mut s = searcher();
        assert_eq!(s.search_for_pattern(&fe, "aab", 0), Some((1, 2)));
        let fb = compile_pattern("ab|b").unwrap();
        assert_eq!(s.search_for_pattern(&fb, "aab", 0), Some((1, 2)));
    }

    #[test]
    fn epsilon_cycle_patterns_terminate() {
        let pat = compile_pattern("(x?)*y").unwrap();
        let mut s = searcher();
        assert_eq!(s.match_pattern(&pat, "xxy"), 3);
        assert_eq!(s.match_pattern(&pat, "y"), 1);
        assert_eq!(s.match_pattern(&pat, "z"), -1);
    }

    #[test]
    fn utf8_input_is_matched_by_chars() {
        let pat = compile_pattern("<Alpha>+").unwrap();
        let mut s = searcher();
        // "héllo" is 6 bytes; the match length is in bytes
        assert_eq!(s.match_pattern(&pat, "héllo!"), 6);
    }

    #[test]
    fn compile_and_match_one_shot() {
        let mut s = searcher();
        assert_eq!(s.compile_and_match("gr[ae]y", "grey"), 4);
        assert_eq!(s.compile_and_search("[0-9]+", "abc42"), Some((3, 2)));
    }
}
