// Copyright 2022 Peter Williams <pwil3058@gmail.com> <pwil3058@bigpond.net.au>

use std::fmt;

use lazy_static::lazy_static;
use std::collections::BTreeMap;

/// The closed set of lexical classes. Everything in the lexeme table is
/// recognized even when the grammar has no production for it; the parser
/// rejects the leftovers with its own diagnostics.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq)]
pub enum TokenKind {
    // reserved words
    Fn,
    Let,
    Mut,
    If,
    Else,
    While,
    Return,
    For,
    In,
    Loop,
    Break,
    Continue,
    I32,
    // identifiers and literals
    Identifier,
    Integer,
    Float,
    Str,
    // operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,
    Not,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    Incr,
    Decr,
    // delimiters
    Semicolon,
    Comma,
    Dot,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Question,
    PathSep,
    Arrow,
    DotDot,
    FatArrow,
    // end of input
    Eof,
}

impl TokenKind {
    /// The terminal name this kind carries in the grammar: literal spellings
    /// for fixed lexemes, `ID`/`NUM`/`STRING` for the variable ones and `$`
    /// for end of input.
    pub fn terminal_name(self) -> &'static str {
        use TokenKind::*;
        match self {
            Fn => "fn",
            Let => "let",
            Mut => "mut",
            If => "if",
            Else => "else",
            While => "while",
            Return => "return",
            For => "for",
            In => "in",
            Loop => "loop",
            Break => "break",
            Continue => "continue",
            I32 => "i32",
            Identifier => "ID",
            Integer | Float => "NUM",
            Str => "STRING",
            Plus => "+",
            Minus => "-",
            Star => "*",
            Slash => "/",
            Percent => "%",
            EqEq => "==",
            NotEq => "!=",
            Less => "<",
            LessEq => "<=",
            Greater => ">",
            GreaterEq => ">=",
            AndAnd => "&&",
            OrOr => "||",
            Not => "!",
            Amp => "&",
            Pipe => "|",
            Caret => "^",
            Tilde => "~",
            Shl => "<<",
            Shr => ">>",
            Assign => "=",
            PlusAssign => "+=",
            MinusAssign => "-=",
            StarAssign => "*=",
            SlashAssign => "/=",
            PercentAssign => "%=",
            AmpAssign => "&=",
            PipeAssign => "|=",
            CaretAssign => "^=",
            ShlAssign => "<<=",
            ShrAssign => ">>=",
            Incr => "++",
            Decr => "--",
            Semicolon => ";",
            Comma => ",",
            Dot => ".",
            Colon => ":",
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LBracket => "[",
            RBracket => "]",
            Question => "?",
            PathSep => "::",
            Arrow => "->",
            DotDot => "..",
            FatArrow => "=>",
            Eof => "$",
        }
    }
}

/// A literal payload parsed out of the lexeme.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
}

/// One lexical element. `line`/`column` are 1-based and point at the first
/// character of the lexeme. Immutable after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub literal: Option<Literal>,
    pub line: usize,
    pub column: usize,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: &str, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.to_string(),
            literal: None,
            line,
            column,
        }
    }

    pub fn terminal_name(&self) -> &'static str {
        self.kind.terminal_name()
    }

    pub fn int_value(&self) -> Option<i64> {
        match self.literal {
            Some(Literal::Int(value)) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.lexeme.is_empty() {
            write!(f, "[{:?}]", self.kind)
        } else {
            write!(f, "[{:?}:{}]", self.kind, self.lexeme)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LexError {
    UnknownCharacter { character: char, line: usize, column: usize },
    UnterminatedString { line: usize, column: usize },
    UnterminatedComment { line: usize, column: usize },
    InvalidNumericLiteral { text: String, line: usize, column: usize },
}

impl LexError {
    pub fn line(&self) -> usize {
        match self {
            LexError::UnknownCharacter { line, .. }
            | LexError::UnterminatedString { line, .. }
            | LexError::UnterminatedComment { line, .. }
            | LexError::InvalidNumericLiteral { line, .. } => *line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            LexError::UnknownCharacter { column, .. }
            | LexError::UnterminatedString { column, .. }
            | LexError::UnterminatedComment { column, .. }
            | LexError::InvalidNumericLiteral { column, .. } => *column,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LexError::UnknownCharacter { character, line, column } => {
                write!(f, "unknown character {:?} at {}:{}", character, line, column)
            }
            LexError::UnterminatedString { line, column } => {
                write!(f, "unterminated string literal starting at {}:{}", line, column)
            }
            LexError::UnterminatedComment { line, column } => {
                write!(f, "unterminated block comment starting at {}:{}", line, column)
            }
            LexError::InvalidNumericLiteral { text, line, column } => {
                write!(f, "invalid numeric literal \"{}\" at {}:{}", text, line, column)
            }
        }
    }
}

lazy_static! {
    static ref RESERVED_WORDS: BTreeMap<&'static str, TokenKind> = {
        use TokenKind::*;
        let mut map = BTreeMap::new();
        for &(word, kind) in &[
            ("fn", Fn),
            ("let", Let),
            ("mut", Mut),
            ("if", If),
            ("else", Else),
            ("while", While),
            ("return", Return),
            ("for", For),
            ("in", In),
            ("loop", Loop),
            ("break", Break),
            ("continue", Continue),
            ("i32", I32),
        ] {
            map.insert(word, kind);
        }
        map
    };
}

// Longest match wins: three-character operators are tried before
// two-character ones, which are tried before single characters.
const THREE_CHAR_OPERATORS: &[(&str, TokenKind)] = &[
    ("<<=", TokenKind::ShlAssign),
    (">>=", TokenKind::ShrAssign),
];

const TWO_CHAR_OPERATORS: &[(&str, TokenKind)] = &[
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::NotEq),
    ("<=", TokenKind::LessEq),
    (">=", TokenKind::GreaterEq),
    ("<<", TokenKind::Shl),
    (">>", TokenKind::Shr),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("++", TokenKind::Incr),
    ("--", TokenKind::Decr),
    ("+=", TokenKind::PlusAssign),
    ("-=", TokenKind::MinusAssign),
    ("*=", TokenKind::StarAssign),
    ("/=", TokenKind::SlashAssign),
    ("%=", TokenKind::PercentAssign),
    ("&=", TokenKind::AmpAssign),
    ("|=", TokenKind::PipeAssign),
    ("^=", TokenKind::CaretAssign),
    ("::", TokenKind::PathSep),
    ("->", TokenKind::Arrow),
    ("..", TokenKind::DotDot),
    ("=>", TokenKind::FatArrow),
];

const ONE_CHAR_OPERATORS: &[(char, TokenKind)] = &[
    ('+', TokenKind::Plus),
    ('-', TokenKind::Minus),
    ('*', TokenKind::Star),
    ('/', TokenKind::Slash),
    ('%', TokenKind::Percent),
    ('=', TokenKind::Assign),
    ('!', TokenKind::Not),
    ('<', TokenKind::Less),
    ('>', TokenKind::Greater),
    ('&', TokenKind::Amp),
    ('|', TokenKind::Pipe),
    ('^', TokenKind::Caret),
    ('~', TokenKind::Tilde),
    (';', TokenKind::Semicolon),
    (',', TokenKind::Comma),
    ('.', TokenKind::Dot),
    (':', TokenKind::Colon),
    ('(', TokenKind::LParen),
    (')', TokenKind::RParen),
    ('{', TokenKind::LBrace),
    ('}', TokenKind::RBrace),
    ('[', TokenKind::LBracket),
    (']', TokenKind::RBracket),
    ('?', TokenKind::Question),
];

/// Hand written scanner with one character of lookahead.
pub struct Lexer {
    text: Vec<char>,
    index: usize,
    line: usize,
    column: usize,
}

impl Lexer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.chars().collect(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    /// Scan the whole input. The result ends with exactly one EOF token.
    pub fn tokenize(text: &str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::new(text);
        let mut tokens = vec![];
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn current(&self) -> Option<char> {
        self.text.get(self.index).copied()
    }

    fn peek(&self, n: usize) -> Option<char> {
        self.text.get(self.index + n).copied()
    }

    fn advance(&mut self) {
        if let Some('\n') = self.current() {
            self.line += 1;
            self.column = 0;
        }
        self.index += 1;
        self.column += 1;
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.current() {
            if !c.is_whitespace() {
                break;
            }
            self.advance();
        }
    }

    /// Skips `//` to end of line and `/* ... */` with arbitrary nesting.
    fn skip_comment(&mut self) -> Result<(), LexError> {
        if self.peek(1) == Some('/') {
            while let Some(c) = self.current() {
                if c == '\n' {
                    break;
                }
                self.advance();
            }
        } else {
            let (line, column) = (self.line, self.column);
            self.advance();
            self.advance();
            let mut depth = 1usize;
            while depth > 0 {
                match (self.current(), self.peek(1)) {
                    (Some('/'), Some('*')) => {
                        depth += 1;
                        self.advance();
                        self.advance();
                    }
                    (Some('*'), Some('/')) => {
                        depth -= 1;
                        self.advance();
                        self.advance();
                    }
                    (Some(_), _) => self.advance(),
                    (None, _) => return Err(LexError::UnterminatedComment { line, column }),
                }
            }
        }
        Ok(())
    }

    fn scan_number(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let mut buffer = String::new();
        while let Some(c) = self.current() {
            if !c.is_ascii_digit() {
                break;
            }
            buffer.push(c);
            self.advance();
        }
        // A dot only belongs to the number when a digit follows it,
        // so "3." scans as the integer 3 and a separate dot.
        let mut is_float = false;
        if self.current() == Some('.') && self.peek(1).map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            buffer.push('.');
            self.advance();
            while let Some(c) = self.current() {
                if !c.is_ascii_digit() {
                    break;
                }
                buffer.push(c);
                self.advance();
            }
        }
        let mut token = Token::new(
            if is_float { TokenKind::Float } else { TokenKind::Integer },
            &buffer,
            line,
            column,
        );
        if is_float {
            match buffer.parse::<f64>() {
                Ok(value) => token.literal = Some(Literal::Float(value)),
                Err(_) => return Err(LexError::InvalidNumericLiteral { text: buffer, line, column }),
            }
        } else {
            match buffer.parse::<i64>() {
                Ok(value) => token.literal = Some(Literal::Int(value)),
                Err(_) => return Err(LexError::InvalidNumericLiteral { text: buffer, line, column }),
            }
        }
        Ok(token)
    }

    fn scan_string(&mut self) -> Result<Token, LexError> {
        let (line, column) = (self.line, self.column);
        let mut buffer = String::new();
        self.advance(); // opening quote
        loop {
            match self.current() {
                None => return Err(LexError::UnterminatedString { line, column }),
                Some('"') => break,
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        None => return Err(LexError::UnterminatedString { line, column }),
                        Some('n') => buffer.push('\n'),
                        Some('t') => buffer.push('\t'),
                        Some('r') => buffer.push('\r'),
                        Some('\\') => buffer.push('\\'),
                        Some('"') => buffer.push('"'),
                        Some('\'') => buffer.push('\''),
                        Some('0') => buffer.push('\0'),
                        // unknown escapes survive as the two characters
                        Some(other) => {
                            buffer.push('\\');
                            buffer.push(other);
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    buffer.push(c);
                    self.advance();
                }
            }
        }
        self.advance(); // closing quote
        let mut token = Token::new(TokenKind::Str, &buffer, line, column);
        token.literal = Some(Literal::Str(buffer.clone()));
        Ok(token)
    }

    fn scan_identifier(&mut self) -> Token {
        let (line, column) = (self.line, self.column);
        let mut buffer = String::new();
        while let Some(c) = self.current() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            buffer.push(c);
            self.advance();
        }
        let kind = RESERVED_WORDS
            .get(buffer.as_str())
            .copied()
            .unwrap_or(TokenKind::Identifier);
        Token::new(kind, &buffer, line, column)
    }

    fn scan_operator(&mut self) -> Option<Token> {
        let (line, column) = (self.line, self.column);
        if let (Some(a), Some(b), Some(c)) = (self.current(), self.peek(1), self.peek(2)) {
            let spelling: String = [a, b, c].iter().collect();
            for &(text, kind) in THREE_CHAR_OPERATORS {
                if text == spelling {
                    self.advance();
                    self.advance();
                    self.advance();
                    return Some(Token::new(kind, text, line, column));
                }
            }
        }
        if let (Some(a), Some(b)) = (self.current(), self.peek(1)) {
            let spelling: String = [a, b].iter().collect();
            for &(text, kind) in TWO_CHAR_OPERATORS {
                if text == spelling {
                    self.advance();
                    self.advance();
                    return Some(Token::new(kind, text, line, column));
                }
            }
        }
        if let Some(a) = self.current() {
            for &(character, kind) in ONE_CHAR_OPERATORS {
                if character == a {
                    self.advance();
                    return Some(Token::new(kind, &a.to_string(), line, column));
                }
            }
        }
        None
    }

    /// Produce the next token, skipping whitespace and comments first.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        loop {
            match self.current() {
                None => return Ok(Token::new(TokenKind::Eof, "", self.line, self.column)),
                Some(c) if c.is_whitespace() => self.skip_whitespace(),
                Some('/') if self.peek(1) == Some('/') || self.peek(1) == Some('*') => {
                    self.skip_comment()?
                }
                Some(c) if c.is_ascii_digit() => return self.scan_number(),
                Some('"') => return self.scan_string(),
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    return Ok(self.scan_identifier())
                }
                Some(c) => match self.scan_operator() {
                    Some(token) => return Ok(token),
                    None => {
                        return Err(LexError::UnknownCharacter {
                            character: c,
                            line: self.line,
                            column: self.column,
                        })
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        Lexer::tokenize(text)
            .unwrap()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenize_ends_with_single_eof() {
        let tokens = Lexer::tokenize("fn main() {}").unwrap();
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
        assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::Eof).count(),
            1
        );
        for token in &tokens {
            assert!(token.line >= 1 && token.column >= 1);
        }
    }

    #[test]
    fn keywords_and_identifiers() {
        use TokenKind::*;
        assert_eq!(
            kinds("fn let mut letx loopy i32 i64"),
            vec![Fn, Let, Mut, Identifier, Identifier, I32, Identifier, Eof]
        );
    }

    #[test]
    fn longest_operator_match_wins() {
        use TokenKind::*;
        assert_eq!(kinds("<<= << <= <"), vec![ShlAssign, Shl, LessEq, Less, Eof]);
        assert_eq!(kinds("a..b"), vec![Identifier, DotDot, Identifier, Eof]);
        assert_eq!(kinds("->->"), vec![Arrow, Arrow, Eof]);
    }

    #[test]
    fn integer_then_dot() {
        let tokens = Lexer::tokenize("3.").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Integer);
        assert_eq!(tokens[0].int_value(), Some(3));
        assert_eq!(tokens[1].kind, TokenKind::Dot);
    }

    #[test]
    fn float_literal() {
        let tokens = Lexer::tokenize("3.25").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Float);
        assert_eq!(tokens[0].literal, Some(Literal::Float(3.25)));
    }

    #[test]
    fn nested_block_comments_close_all_levels() {
        let tokens = Lexer::tokenize("a /* one /* two */ still */ b").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].lexeme, "a");
        assert_eq!(tokens[1].lexeme, "b");
    }

    #[test]
    fn unterminated_nested_comment_is_an_error() {
        match Lexer::tokenize("/* outer /* inner */") {
            Err(LexError::UnterminatedComment { line: 1, column: 1 }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn string_escapes() {
        let tokens = Lexer::tokenize(r#""a\tb\x""#).unwrap();
        assert_eq!(tokens[0].literal, Some(Literal::Str("a\tb\\x".to_string())));
    }

    #[test]
    fn unterminated_string_is_an_error() {
        match Lexer::tokenize("\"abc") {
            Err(LexError::UnterminatedString { .. }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn positions_follow_newlines() {
        let tokens = Lexer::tokenize("fn\n  main").unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }

    #[test]
    fn unknown_character() {
        match Lexer::tokenize("let @") {
            Err(LexError::UnknownCharacter { character: '@', line: 1, column: 5 }) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
