//! Lexical classification.
//!
//! streval.c's `gettok` scans operator punctuation itself via a hand-rolled
//! switch on the lookahead byte, and falls through to `strval`/the name
//! lookup path for anything else (digits, letters, `$`, quotes). This module
//! keeps that split: [`Lexer`] recognizes operator and delimiter punctuation
//! by maximal munch, and reports everything else as a span the parser should
//! hand to [`crate::oracle::Oracle::lookup`].

/// A recognized operator or punctuation symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSym {
    Assign,
    PlusEq,
    MinusEq,
    TimesEq,
    DivEq,
    ModEq,
    PowEq,
    AndEq,
    OrEq,
    XorEq,
    LshEq,
    RshEq,
    OrOr,
    AndAnd,
    Or,
    Xor,
    And,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Lsh,
    Rsh,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    Not,
    Tilde,
    PlusPlus,
    MinusMinus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Op(OpSym),
    LParen,
    RParen,
    Comma,
    Question,
    Colon,
    /// The byte at this position starts something the oracle must resolve:
    /// a number, a name, or a quoted character constant.
    NeedsOracle,
    End,
}

/// Maximal-munch operator table, longest symbols first so a prefix never
/// shadows a longer match (mirrors the nested-switch lookahead in `gettok`).
const OPERATORS: &[(&str, OpSym)] = &[
    ("**=", OpSym::PowEq),
    ("<<=", OpSym::LshEq),
    (">>=", OpSym::RshEq),
    ("&&", OpSym::AndAnd),
    ("||", OpSym::OrOr),
    ("**", OpSym::StarStar),
    ("<<", OpSym::Lsh),
    (">>", OpSym::Rsh),
    ("==", OpSym::EqEq),
    ("!=", OpSym::NotEq),
    ("<=", OpSym::Le),
    (">=", OpSym::Ge),
    ("+=", OpSym::PlusEq),
    ("-=", OpSym::MinusEq),
    ("*=", OpSym::TimesEq),
    ("/=", OpSym::DivEq),
    ("%=", OpSym::ModEq),
    ("&=", OpSym::AndEq),
    ("|=", OpSym::OrEq),
    ("^=", OpSym::XorEq),
    ("++", OpSym::PlusPlus),
    ("--", OpSym::MinusMinus),
    ("+", OpSym::Plus),
    ("-", OpSym::Minus),
    ("*", OpSym::Star),
    ("/", OpSym::Slash),
    ("%", OpSym::Percent),
    ("&", OpSym::And),
    ("|", OpSym::Or),
    ("^", OpSym::Xor),
    ("~", OpSym::Tilde),
    ("!", OpSym::Not),
    ("<", OpSym::Lt),
    (">", OpSym::Gt),
    ("=", OpSym::Assign),
];

pub struct Lexer<'a> {
    text: &'a str,
    pos: usize,
    /// Host's decimal-comma mode (spec.md §4.1): a `,` immediately followed
    /// by a digit is not a comma token, it's the start of a number.
    decomma: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(text: &'a str, decomma: bool) -> Self {
        Lexer { text, pos: 0, decomma }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    pub fn advance_to(&mut self, pos: usize) {
        self.pos = pos;
    }

    fn skip_ws(&mut self) {
        while let Some(b) = self.text.as_bytes().get(self.pos) {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// Classify the token starting at the current position without
    /// consuming it, except for whitespace and operator/delimiter
    /// punctuation, which this does consume (there is nothing further for
    /// the caller to do with them).
    pub fn next_token(&mut self) -> Token {
        self.skip_ws();
        let rest = &self.text[self.pos..];
        if rest.is_empty() {
            return Token::End;
        }
        let c = rest.as_bytes()[0];
        match c {
            b'(' => {
                self.pos += 1;
                Token::LParen
            }
            b')' => {
                self.pos += 1;
                Token::RParen
            }
            b',' => {
                if self.decomma && rest.as_bytes().get(1).is_some_and(u8::is_ascii_digit) {
                    // Rewrite to digit-start: leave `pos` on the comma so the
                    // oracle's number scan sees it as the leading byte.
                    Token::NeedsOracle
                } else {
                    self.pos += 1;
                    Token::Comma
                }
            }
            b'?' => {
                self.pos += 1;
                Token::Question
            }
            b':' => {
                self.pos += 1;
                Token::Colon
            }
            b'0'..=b'9' | b'.' | b'_' | b'$' | b'\'' | b'"' | b'@' => Token::NeedsOracle,
            c if c.is_ascii_alphabetic() => Token::NeedsOracle,
            _ => {
                for (sym_text, sym) in OPERATORS {
                    if rest.starts_with(sym_text) {
                        self.pos += sym_text.len();
                        return Token::Op(*sym);
                    }
                }
                Token::NeedsOracle
            }
        }
    }

    /// Peek the token without consuming operator punctuation, used by the
    /// parser when it needs to decide whether to commit to consuming it.
    pub fn peek_token(&self) -> Token {
        let mut clone = Lexer { text: self.text, pos: self.pos, decomma: self.decomma };
        clone.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maximal_munch_prefers_three_char_operators() {
        let mut l = Lexer::new("<<= rest", false);
        assert_eq!(l.next_token(), Token::Op(OpSym::LshEq));
    }

    #[test]
    fn star_star_does_not_split_into_two_stars() {
        let mut l = Lexer::new("2**3", false);
        assert_eq!(l.next_token(), Token::NeedsOracle);
        l.advance_to(1);
        assert_eq!(l.next_token(), Token::Op(OpSym::StarStar));
    }

    #[test]
    fn whitespace_is_skipped_between_tokens() {
        let mut l = Lexer::new("   +   ", false);
        assert_eq!(l.next_token(), Token::Op(OpSym::Plus));
        assert_eq!(l.next_token(), Token::End);
    }

    #[test]
    fn peek_does_not_advance() {
        let l = Lexer::new("+ +", false);
        assert_eq!(l.peek_token(), Token::Op(OpSym::Plus));
        assert_eq!(l.pos(), 0);
    }

    #[test]
    fn question_and_colon_are_distinct_from_operators() {
        let mut l = Lexer::new("?:", false);
        assert_eq!(l.next_token(), Token::Question);
        assert_eq!(l.next_token(), Token::Colon);
    }

    #[test]
    fn comma_before_a_digit_is_a_comma_without_decomma() {
        let mut l = Lexer::new(",5", false);
        assert_eq!(l.next_token(), Token::Comma);
    }

    #[test]
    fn comma_before_a_digit_rewinds_to_digit_start_under_decomma() {
        let mut l = Lexer::new(",5", true);
        assert_eq!(l.next_token(), Token::NeedsOracle);
        assert_eq!(l.pos(), 0);
    }

    #[test]
    fn comma_not_followed_by_a_digit_stays_a_comma_under_decomma() {
        let mut l = Lexer::new(",x", true);
        assert_eq!(l.next_token(), Token::Comma);
    }
}
