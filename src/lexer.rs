//! The tokenizer.
//!
//! Byte-walking scanner over one UTF-8 translation unit. String text is
//! interned as it is scanned; tokens carry `Symbol` handles plus a byte
//! span and a `(file, line)` location.
//!
//! Double-quoted strings containing `<<expr>>` embeddings are split into
//! a start/mid/end segment chain: the scanner emits `DStrStart`, switches
//! to expression mode until the matching `>>`, emits the next segment, and
//! so on. Inside an embedding `>>` always terminates the embedding; it is
//! never a shift operator there.

use crate::diag::ErrorLog;
use crate::intern::{Interner, Symbol};
use crate::token::{SourceLoc, Span, TokKind, Token};
use std::collections::HashMap;

pub struct Lexer<'s, 'e> {
    source: &'s str,
    bytes: &'s [u8],
    pos: usize,
    line: u32,
    file: u16,
    interner: &'e mut Interner,
    log: &'e mut ErrorLog,
    /// `-D name=value` predefines; a bare identifier matching a key is
    /// replaced by the single token its value scans to.
    predefines: HashMap<String, String>,
    /// Non-zero while scanning the expression tokens of a `<<...>>`
    /// string embedding; `>>` then returns to string scanning.
    embed_depth: usize,
}

impl<'s, 'e> Lexer<'s, 'e> {
    pub fn new(
        source: &'s str,
        file: u16,
        interner: &'e mut Interner,
        log: &'e mut ErrorLog,
    ) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            file,
            interner,
            log,
            predefines: HashMap::new(),
            embed_depth: 0,
        }
    }

    /// Register a `-D name=value` predefine. An empty value defines the
    /// name as the integer 1, matching the usual command-line convention.
    pub fn add_predefine(&mut self, name: &str, value: &str) {
        let value = if value.is_empty() { "1" } else { value };
        self.predefines.insert(name.to_string(), value.to_string());
    }

    fn loc(&self) -> SourceLoc {
        SourceLoc::new(self.file, self.line)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.bytes.get(self.pos + off).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn starts_with(&self, s: &str) -> bool {
        self.source[self.pos..].starts_with(s)
    }

    fn skip(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    /// Scan the whole unit to a token list ending in `Eof`.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut out = Vec::new();
        loop {
            let tok = self.next_token();
            let is_eof = tok.kind == TokKind::Eof;
            out.push(tok);
            if is_eof {
                break;
            }
        }
        out
    }

    fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace_and_comments();
            let start = self.pos;
            let loc = self.loc();
            let b = match self.peek() {
                Some(b) => b,
                None => return Token::new(TokKind::Eof, Span::new(start, start), loc),
            };

            // end of a dstring embedding: back to string scanning
            if self.embed_depth > 0 && self.starts_with(">>") {
                self.skip(2);
                self.embed_depth -= 1;
                return self.scan_dstr_segment(false);
            }

            match b {
                b'\'' => return self.scan_sstring(),
                b'"' => {
                    self.bump();
                    return self.scan_dstr_segment(true);
                }
                b'0'..=b'9' => return self.scan_number(),
                b'_' | b'a'..=b'z' | b'A'..=b'Z' => return self.scan_ident(),
                b'#' => {
                    // No preprocessor here beyond -D: directive lines are
                    // handled by a real cpp pass upstream; skip the line.
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                    continue;
                }
                _ => {
                    if !b.is_ascii() {
                        // Stray non-ASCII outside a string.
                        let ch_len = self.source[self.pos..]
                            .chars()
                            .next()
                            .map(|c| c.len_utf8())
                            .unwrap_or(1);
                        self.skip(ch_len);
                        self.log.error(
                            loc,
                            Span::new(start, start + ch_len),
                            "invalid character in input".into(),
                        );
                        continue;
                    }
                    match self.scan_operator() {
                        Some(kind) => return Token::new(kind, Span::new(start, self.pos), loc),
                        None => {
                            self.bump();
                            self.log.error(
                                loc,
                                Span::new(start, start + 1),
                                format!("unexpected character '{}'", b as char),
                            );
                            continue;
                        }
                    }
                }
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(0x0c) => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let loc = self.loc();
                    let start = self.pos;
                    self.skip(2);
                    let mut closed = false;
                    while self.peek().is_some() {
                        if self.starts_with("*/") {
                            self.skip(2);
                            closed = true;
                            break;
                        }
                        self.bump();
                    }
                    if !closed {
                        self.log.error(
                            loc,
                            Span::new(start, self.pos),
                            "unterminated block comment".into(),
                        );
                    }
                }
                _ => return,
            }
        }
    }

    fn scan_ident(&mut self) -> Token {
        let start = self.pos;
        let loc = self.loc();
        while let Some(b) = self.peek() {
            if b == b'_' || b.is_ascii_alphanumeric() {
                self.bump();
            } else {
                break;
            }
        }
        let source = self.source;
        let text = &source[start..self.pos];
        let span = Span::new(start, self.pos);

        if let Some(kw) = TokKind::keyword(text) {
            return Token::new(kw, span, loc);
        }
        if let Some(value) = self.predefines.get(text).cloned() {
            let kind = self.predefine_token(&value);
            return Token::new(kind, span, loc);
        }
        let sym = self.interner.intern(text);
        Token::new(TokKind::Ident(sym), span, loc)
    }

    /// Scan a predefine's replacement text to a single token kind.
    fn predefine_token(&mut self, value: &str) -> TokKind {
        let trimmed = value.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return match i32::try_from(v) {
                Ok(n) => TokKind::Int(n),
                Err(_) => TokKind::Float(self.interner.intern(trimmed)),
            };
        }
        if trimmed.parse::<f64>().is_ok() {
            return TokKind::Float(self.interner.intern(trimmed));
        }
        if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
            return TokKind::SStr(self.interner.intern(&trimmed[1..trimmed.len() - 1]));
        }
        if let Some(kw) = TokKind::keyword(trimmed) {
            return kw;
        }
        TokKind::Ident(self.interner.intern(trimmed))
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        let loc = self.loc();

        // hex
        if self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X'))
            && self.peek_at(2).map(|b| b.is_ascii_hexdigit()).unwrap_or(false)
        {
            self.skip(2);
            let digits_start = self.pos;
            while self.peek().map(|b| b.is_ascii_hexdigit()).unwrap_or(false) {
                self.bump();
            }
            let source = self.source;
            let digits = &source[digits_start..self.pos];
            let span = Span::new(start, self.pos);
            let kind = match u32::from_str_radix(digits, 16) {
                Ok(v) => TokKind::Int(v as i32),
                Err(_) => {
                    self.log
                        .error(loc, span, "hexadecimal constant out of range".into());
                    TokKind::Int(0)
                }
            };
            return Token::new(kind, span, loc);
        }

        let mut is_float = false;
        while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
            self.bump();
        }
        // fraction: a '.' followed by a digit (not '..' or '...')
        if self.peek() == Some(b'.') && self.peek_at(1).map(|b| b.is_ascii_digit()).unwrap_or(false)
        {
            is_float = true;
            self.bump();
            while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                self.bump();
            }
        }
        // exponent
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mut off = 1;
            if matches!(self.peek_at(1), Some(b'+') | Some(b'-')) {
                off = 2;
            }
            if self.peek_at(off).map(|b| b.is_ascii_digit()).unwrap_or(false) {
                is_float = true;
                self.skip(off);
                while self.peek().map(|b| b.is_ascii_digit()).unwrap_or(false) {
                    self.bump();
                }
            }
        }

        let source = self.source;
        let text = &source[start..self.pos];
        let span = Span::new(start, self.pos);
        if is_float {
            let sym = self.interner.intern(text);
            return Token::new(TokKind::Float(sym), span, loc);
        }

        // octal: leading 0 with more digits
        if text.len() > 1 && text.starts_with('0') && text.bytes().all(|b| (b'0'..=b'7').contains(&b))
        {
            return match i64::from_str_radix(&text[1..], 8) {
                Ok(v) if i32::try_from(v).is_ok() => {
                    Token::new(TokKind::Int(v as i32), span, loc)
                }
                _ => {
                    let sym = self.interner.intern(text);
                    Token::new(TokKind::Float(sym), span, loc)
                }
            };
        }

        match text.parse::<i64>() {
            Ok(v) if i32::try_from(v).is_ok() => Token::new(TokKind::Int(v as i32), span, loc),
            _ => {
                // Out-of-range integer literal: keep it as float text; the
                // fold pass can demote it back if arithmetic returns the
                // value to range.
                let sym = self.interner.intern(text);
                Token::new(TokKind::Float(sym), span, loc)
            }
        }
    }

    fn scan_escape(&mut self, out: &mut String) {
        match self.bump() {
            Some(b'n') => out.push('\n'),
            Some(b't') => out.push('\t'),
            Some(b'r') => out.push('\r'),
            Some(b'b') => out.push('\u{0008}'),
            Some(b'\\') => out.push('\\'),
            Some(b'\'') => out.push('\''),
            Some(b'"') => out.push('"'),
            Some(b'<') => out.push('<'),
            Some(b'>') => out.push('>'),
            Some(other) => {
                // unknown escape: keep the character
                out.push(other as char);
            }
            None => {}
        }
    }

    fn scan_sstring(&mut self) -> Token {
        let start = self.pos;
        let loc = self.loc();
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    self.log.error(
                        loc,
                        Span::new(start, self.pos),
                        "unterminated string".into(),
                    );
                    break;
                }
                Some(b'\'') => {
                    self.bump();
                    break;
                }
                Some(b'\\') => {
                    self.bump();
                    self.scan_escape(&mut text);
                }
                Some(b) if b.is_ascii() => {
                    self.bump();
                    text.push(b as char);
                }
                _ => {
                    let ch = self.source[self.pos..].chars().next().unwrap();
                    self.skip(ch.len_utf8());
                    text.push(ch);
                }
            }
        }
        let sym = self.interner.intern(&text);
        Token::new(TokKind::SStr(sym), Span::new(start, self.pos), loc)
    }

    /// Scan one segment of a double-quoted string. `opening` is true when
    /// called right after the opening quote. Emits `DStr` for a plain
    /// string, or the `DStrStart`/`DStrMid`/`DStrEnd` chain around
    /// embeddings.
    fn scan_dstr_segment(&mut self, opening: bool) -> Token {
        let start = self.pos;
        let loc = self.loc();
        let mut text = String::new();
        loop {
            match self.peek() {
                None => {
                    self.log.error(
                        loc,
                        Span::new(start, self.pos),
                        "unterminated string".into(),
                    );
                    let sym = self.interner.intern(&text);
                    let kind = if opening {
                        TokKind::DStr(sym)
                    } else {
                        TokKind::DStrEnd(sym)
                    };
                    return Token::new(kind, Span::new(start, self.pos), loc);
                }
                Some(b'"') => {
                    self.bump();
                    let sym = self.interner.intern(&text);
                    let kind = if opening {
                        TokKind::DStr(sym)
                    } else {
                        TokKind::DStrEnd(sym)
                    };
                    return Token::new(kind, Span::new(start, self.pos), loc);
                }
                Some(b'\\') => {
                    self.bump();
                    self.scan_escape(&mut text);
                }
                Some(b'<') if self.peek_at(1) == Some(b'<') => {
                    self.skip(2);
                    self.embed_depth += 1;
                    let sym = self.interner.intern(&text);
                    let kind = if opening {
                        TokKind::DStrStart(sym)
                    } else {
                        TokKind::DStrMid(sym)
                    };
                    return Token::new(kind, Span::new(start, self.pos), loc);
                }
                Some(b) if b.is_ascii() => {
                    self.bump();
                    text.push(b as char);
                }
                _ => {
                    let ch = self.source[self.pos..].chars().next().unwrap();
                    self.skip(ch.len_utf8());
                    text.push(ch);
                }
            }
        }
    }

    /// Longest-match operator scan.
    fn scan_operator(&mut self) -> Option<TokKind> {
        const OPS: &[(&str, TokKind)] = &[
            (">>>=", TokKind::LshrAssign),
            (">>>", TokKind::Lshr),
            (">>=", TokKind::AshrAssign),
            ("<<=", TokKind::ShlAssign),
            ("...", TokKind::Ellipsis),
            ("==", TokKind::EqEq),
            ("!=", TokKind::NotEq),
            ("<=", TokKind::LtEq),
            (">=", TokKind::GtEq),
            ("<<", TokKind::Shl),
            (">>", TokKind::Ashr),
            ("&&", TokKind::AndAnd),
            ("||", TokKind::OrOr),
            ("++", TokKind::Inc),
            ("--", TokKind::Dec),
            ("+=", TokKind::PlusAssign),
            ("-=", TokKind::MinusAssign),
            ("*=", TokKind::StarAssign),
            ("/=", TokKind::SlashAssign),
            ("%=", TokKind::PercentAssign),
            ("&=", TokKind::AndAssign),
            ("|=", TokKind::OrAssign),
            ("^=", TokKind::XorAssign),
            ("??", TokKind::QQ),
            ("->", TokKind::Arrow),
            ("=", TokKind::Assign),
            ("?", TokKind::Question),
            (":", TokKind::Colon),
            ("|", TokKind::Or),
            ("^", TokKind::Xor),
            ("&", TokKind::And),
            ("<", TokKind::Lt),
            (">", TokKind::Gt),
            ("+", TokKind::Plus),
            ("-", TokKind::Minus),
            ("*", TokKind::Star),
            ("/", TokKind::Slash),
            ("%", TokKind::Percent),
            ("!", TokKind::Bang),
            ("~", TokKind::Tilde),
            ("(", TokKind::LParen),
            (")", TokKind::RParen),
            ("[", TokKind::LBracket),
            ("]", TokKind::RBracket),
            ("{", TokKind::LBrace),
            ("}", TokKind::RBrace),
            (".", TokKind::Dot),
            (",", TokKind::Comma),
            (";", TokKind::Semi),
            ("@", TokKind::At),
        ];
        for (text, kind) in OPS {
            if self.starts_with(text) {
                self.skip(text.len());
                return Some(*kind);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> (Vec<Token>, Interner, ErrorLog) {
        let mut interner = Interner::new();
        let mut log = ErrorLog::new();
        let tokens = Lexer::new(source, 0, &mut interner, &mut log).tokenize();
        (tokens, interner, log)
    }

    fn kinds(tokens: &[Token]) -> Vec<TokKind> {
        tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_identifiers_and_keywords() {
        let (tokens, interner, log) = lex("local x = self;");
        assert_eq!(log.error_count(), 0);
        let k = kinds(&tokens);
        assert_eq!(k[0], TokKind::Local);
        assert!(matches!(k[1], TokKind::Ident(s) if interner.resolve(s) == "x"));
        assert_eq!(k[2], TokKind::Assign);
        assert_eq!(k[3], TokKind::SelfKw);
        assert_eq!(k[4], TokKind::Semi);
        assert_eq!(k[5], TokKind::Eof);
    }

    #[test]
    fn longest_match_operators() {
        let (tokens, _, _) = lex("a >>>= b >>> c >> d > e");
        let k = kinds(&tokens);
        assert_eq!(k[1], TokKind::LshrAssign);
        assert_eq!(k[3], TokKind::Lshr);
        assert_eq!(k[5], TokKind::Ashr);
        assert_eq!(k[7], TokKind::Gt);
    }

    #[test]
    fn scans_numbers() {
        let (tokens, interner, _) = lex("40 0x1F 017 2.5 1e3");
        let k = kinds(&tokens);
        assert_eq!(k[0], TokKind::Int(40));
        assert_eq!(k[1], TokKind::Int(31));
        assert_eq!(k[2], TokKind::Int(15));
        assert!(matches!(k[3], TokKind::Float(s) if interner.resolve(s) == "2.5"));
        assert!(matches!(k[4], TokKind::Float(s) if interner.resolve(s) == "1e3"));
    }

    #[test]
    fn out_of_range_int_becomes_float_text() {
        let (tokens, interner, _) = lex("4000000000");
        match tokens[0].kind {
            TokKind::Float(s) => assert_eq!(interner.resolve(s), "4000000000"),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn scans_single_quoted_strings_with_escapes() {
        let (tokens, interner, log) = lex(r"'it\'s a trap\n'");
        assert_eq!(log.error_count(), 0);
        match tokens[0].kind {
            TokKind::SStr(s) => assert_eq!(interner.resolve(s), "it's a trap\n"),
            other => panic!("expected sstring, got {:?}", other),
        }
    }

    #[test]
    fn plain_dstring_is_one_token() {
        let (tokens, interner, _) = lex("\"You see nothing special. \"");
        match tokens[0].kind {
            TokKind::DStr(s) => assert_eq!(interner.resolve(s), "You see nothing special. "),
            other => panic!("expected dstring, got {:?}", other),
        }
    }

    #[test]
    fn dstring_embedding_produces_segment_chain() {
        let (tokens, interner, log) = lex("\"You have <<score>> points of <<maxScore>> total. \"");
        assert_eq!(log.error_count(), 0);
        let k = kinds(&tokens);
        assert!(matches!(k[0], TokKind::DStrStart(s) if interner.resolve(s) == "You have "));
        assert!(matches!(k[1], TokKind::Ident(s) if interner.resolve(s) == "score"));
        assert!(matches!(k[2], TokKind::DStrMid(s) if interner.resolve(s) == " points of "));
        assert!(matches!(k[3], TokKind::Ident(s) if interner.resolve(s) == "maxScore"));
        assert!(matches!(k[4], TokKind::DStrEnd(s) if interner.resolve(s) == " total. "));
        assert_eq!(k[5], TokKind::Eof);
    }

    #[test]
    fn shift_inside_embedding_still_ends_it() {
        // ">>" terminates the embedding even though it could scan as a
        // shift operator.
        let (tokens, _, _) = lex("\"a<<x>>b\"");
        let k = kinds(&tokens);
        assert!(matches!(k[0], TokKind::DStrStart(_)));
        assert!(matches!(k[1], TokKind::Ident(_)));
        assert!(matches!(k[2], TokKind::DStrEnd(_)));
    }

    #[test]
    fn comments_are_skipped_and_lines_counted() {
        let source = "// line comment\n/* block\n comment */ lamp";
        let (tokens, interner, _) = lex(source);
        assert!(matches!(tokens[0].kind, TokKind::Ident(s) if interner.resolve(s) == "lamp"));
        assert_eq!(tokens[0].loc.line, 3);
    }

    #[test]
    fn unterminated_string_reports_error() {
        let (tokens, _, log) = lex("\"no closing quote");
        assert_eq!(log.error_count(), 1);
        assert!(matches!(tokens[0].kind, TokKind::DStr(_)));
        assert_eq!(tokens[1].kind, TokKind::Eof);
    }

    #[test]
    fn predefines_substitute_single_tokens() {
        let mut interner = Interner::new();
        let mut log = ErrorLog::new();
        let mut lexer = Lexer::new("DEBUG LIMIT NAME", 0, &mut interner, &mut log);
        lexer.add_predefine("DEBUG", "");
        lexer.add_predefine("LIMIT", "64");
        lexer.add_predefine("NAME", "'t3'");
        let tokens = lexer.tokenize();
        assert_eq!(tokens[0].kind, TokKind::Int(1));
        assert_eq!(tokens[1].kind, TokKind::Int(64));
        assert!(matches!(tokens[2].kind, TokKind::SStr(s) if interner.resolve(s) == "t3"));
    }

    #[test]
    fn preprocessor_lines_are_skipped() {
        let (tokens, _, log) = lex("#pragma once\nnil");
        assert_eq!(log.error_count(), 0);
        assert_eq!(tokens[0].kind, TokKind::Nil);
    }

    #[test]
    fn ellipsis_versus_dot() {
        let (tokens, _, _) = lex("f(args...) obj.prop");
        let k = kinds(&tokens);
        assert!(k.contains(&TokKind::Ellipsis));
        assert!(k.contains(&TokKind::Dot));
    }

    #[test]
    fn line_numbers_track_tokens() {
        let (tokens, _, _) = lex("a\nb\n\nc");
        assert_eq!(tokens[0].loc.line, 1);
        assert_eq!(tokens[1].loc.line, 2);
        assert_eq!(tokens[2].loc.line, 4);
    }
}
