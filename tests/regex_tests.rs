//! End-to-end regex scenarios through the public API.

use tadsc::regex::{compile_pattern, RegexSearcher, ReplaceMode};

#[test]
fn group_capture_scenario() {
    // search("(ab)+", "xxababcd") -> (2, 4); group 1 holds the last
    // repetition
    let pat = compile_pattern("(ab)+").unwrap();
    let mut s = RegexSearcher::new();
    assert_eq!(s.search_for_pattern(&pat, "xxababcd", 0), Some((2, 4)));
    assert_eq!(s.group(1), Some((4, 6)));
}

#[test]
fn alternation_length_policy_scenario() {
    let mut s = RegexSearcher::new();
    let max = compile_pattern("a|ab").unwrap();
    assert_eq!(s.search_for_pattern(&max, "xab", 0), Some((1, 2)));
    let min = compile_pattern("<Min>a|ab").unwrap();
    assert_eq!(s.search_for_pattern(&min, "xab", 0), Some((1, 1)));
}

#[test]
fn backreference_scenario() {
    let pat = compile_pattern("(a+)b%1").unwrap();
    let mut s = RegexSearcher::new();
    assert_eq!(s.match_pattern(&pat, "aaabaaa"), 7);
    assert_eq!(s.match_pattern(&pat, "aaabaa"), -1);
}

#[test]
fn replace_all_scenarios() {
    let mut s = RegexSearcher::new();
    let digits = compile_pattern("%d+").unwrap();
    assert_eq!(
        s.replace(&digits, "a12b345c", "#", ReplaceMode::All, 0),
        "a#b#c"
    );
    let xstar = compile_pattern("x*").unwrap();
    assert_eq!(
        s.replace(&xstar, "abc", "-", ReplaceMode::All, 0),
        "-a-b-c-"
    );
}

#[test]
fn search_misses_report_no_match() {
    // search returns nothing exactly when no substring matches
    let pat = compile_pattern("q[0-9]").unwrap();
    let mut s = RegexSearcher::new();
    assert_eq!(s.search_for_pattern(&pat, "no queue here", 0), None);
    assert!(s.search_for_pattern(&pat, "q7 beats q", 0).is_some());
}

#[test]
fn case_insensitive_round_trip_law() {
    // with <NoCase>, a match length is stable under case changes of the
    // subject
    let pat = compile_pattern("<NoCase>gr[ae]y cat").unwrap();
    let mut s = RegexSearcher::new();
    let subject = "Grey Cat";
    let n = s.match_pattern(&pat, subject);
    assert!(n > 0);
    assert_eq!(s.match_pattern(&pat, &subject.to_uppercase()), n);
    assert_eq!(s.match_pattern(&pat, &subject.to_lowercase()), n);
}

#[test]
fn recompilation_is_equivalent() {
    // compiling the same pattern twice yields equivalent matchers
    let texts = ["(ab|cd)+x?", "<NoCase>[a-m]+%d{2,3}", "a*?b"];
    let subjects = ["ababx", "abcx12", "KLM99", "aab", "zzz", ""];
    for text in texts {
        let p1 = compile_pattern(text).unwrap();
        let p2 = compile_pattern(text).unwrap();
        let mut s1 = RegexSearcher::new();
        let mut s2 = RegexSearcher::new();
        for subject in subjects {
            assert_eq!(
                s1.match_pattern(&p1, subject),
                s2.match_pattern(&p2, subject),
                "pattern {:?} subject {:?}",
                text,
                subject
            );
            assert_eq!(
                s1.search_for_pattern(&p1, subject, 0),
                s2.search_for_pattern(&p2, subject, 0)
            );
        }
    }
}

#[test]
fn groups_cover_their_subpattern() {
    let pat = compile_pattern("([0-9]+)-([a-z]+)").unwrap();
    let mut s = RegexSearcher::new();
    let subject = "see 42-cave now";
    let (start, len) = s.search_for_pattern(&pat, subject, 0).unwrap();
    assert_eq!(&subject[start..start + len], "42-cave");
    let (l1, h1) = s.group(1).unwrap();
    assert_eq!(&subject[l1..h1], "42");
    let (l2, h2) = s.group(2).unwrap();
    assert_eq!(&subject[l2..h2], "cave");
}

#[test]
fn lookahead_with_replace() {
    let mut s = RegexSearcher::new();
    // double only the digits that precede an 'x'
    let pat = compile_pattern("%d(?=x)").unwrap();
    assert_eq!(
        s.replace(&pat, "1x 2y 3x", "%*%*", ReplaceMode::All, 0),
        "11x 2y 33x"
    );
}
