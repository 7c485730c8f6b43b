//! Terminal styling for rendered diagnostics.
//!
//! Rather than expose raw colors, the renderer paints by role: what a
//! fragment *is* in the diagnostic decides how it looks, and the escape
//! codes live in exactly one place. Every painted fragment ends with a
//! reset, so fragments compose inside larger format strings.

pub const RESET: &str = "\x1b[0m";

/// Visual roles within one rendered diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paint {
    /// The `error:` / `fatal:` label.
    Error,
    /// The `warning:` label.
    Warning,
    /// The pedantic `note:` label.
    Note,
    /// Line numbers and the gutter pipe.
    Gutter,
    /// The caret underline beneath the offending source text.
    Underline,
    /// Suggestion text.
    Hint,
}

impl Paint {
    fn escape(self) -> &'static str {
        match self {
            Paint::Error => "\x1b[1;31m",
            Paint::Warning => "\x1b[1;33m",
            Paint::Note => "\x1b[2m",
            Paint::Gutter => "\x1b[34m",
            Paint::Underline => "\x1b[31m",
            Paint::Hint => "\x1b[36m",
        }
    }

    pub fn wrap(self, text: &str) -> String {
        format!("{}{}{}", self.escape(), text, RESET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_brackets_text_with_escape_and_reset() {
        let painted = Paint::Warning.wrap("warning");
        assert!(painted.starts_with("\x1b[1;33m"));
        assert!(painted.contains("warning"));
        assert!(painted.ends_with(RESET));
    }

    #[test]
    fn roles_have_distinct_escapes() {
        let all = [
            Paint::Error,
            Paint::Warning,
            Paint::Note,
            Paint::Gutter,
            Paint::Underline,
            Paint::Hint,
        ];
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.escape(), b.escape(), "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn fragments_compose_without_bleeding() {
        let line = format!(
            "{} {} text",
            Paint::Gutter.wrap("12"),
            Paint::Gutter.wrap("|")
        );
        // the reset after each fragment keeps trailing text unstyled
        assert!(line.ends_with("\x1b[0m text"));
    }
}
