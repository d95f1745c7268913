use std::rc::Rc;

use crate::compiler::parse_lua_number::parse_numeral;
use crate::compiler::parser::lua_token_kind::{LuaTokenKind, keyword_kind};
use crate::compiler::parser::reader::Reader;
use crate::lua_value::LuaValue;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenValue {
    None,
    Name(Rc<str>),
    Str(Rc<str>),
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: LuaTokenKind,
    pub value: TokenValue,
    /// Raw source text, used for "near '...'" in diagnostics
    pub text: String,
    pub line: u32,
}

#[derive(Debug, Clone)]
pub struct LexError {
    pub message: String,
    pub near: Option<String>,
    pub line: u32,
}

pub struct LuaTokenize<'a> {
    reader: Reader<'a>,
    line: u32,
    at_start: bool,
}

impl<'a> LuaTokenize<'a> {
    pub fn new(reader: Reader<'a>) -> Self {
        LuaTokenize {
            reader,
            line: 1,
            at_start: true,
        }
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    fn error<T>(&self, message: &str) -> Result<T, LexError> {
        Err(LexError {
            message: message.to_string(),
            near: Some(self.reader.current_text().to_string()),
            line: self.line,
        })
    }

    fn token(&self, kind: LuaTokenKind, value: TokenValue) -> Token {
        Token {
            kind,
            value,
            text: self.reader.current_text().to_string(),
            line: self.line,
        }
    }

    /// Consume a newline sequence (\n, \r, \r\n or \n\r) and count it
    fn inc_line(&mut self) {
        let first = self.reader.current_char();
        self.reader.skip();
        let second = self.reader.current_char();
        if (second == '\n' || second == '\r') && second != first {
            self.reader.skip();
        }
        self.line += 1;
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        if self.at_start {
            self.at_start = false;
            if self.reader.current_char() == '#' {
                while !self.reader.is_eof() && !is_newline(self.reader.current_char()) {
                    self.reader.skip();
                }
            }
        }
        loop {
            if self.reader.is_eof() {
                return Ok(());
            }
            match self.reader.current_char() {
                '\n' | '\r' => self.inc_line(),
                ' ' | '\t' | '\u{0B}' | '\u{0C}' => self.reader.skip(),
                '-' if self.reader.next_char() == '-' => {
                    self.reader.skip();
                    self.reader.skip();
                    if self.reader.current_char() == '[' {
                        self.reader.reset_buff();
                        self.reader.bump();
                        let sep = self.skip_sep();
                        if sep >= 0 {
                            self.reader.bump();
                            self.read_long_string(sep as usize, "comment")?;
                            continue;
                        }
                    }
                    while !self.reader.is_eof() && !is_newline(self.reader.current_char()) {
                        self.reader.skip();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_trivia()?;
        self.reader.reset_buff();

        if self.reader.is_eof() {
            return Ok(Token {
                kind: LuaTokenKind::TkEof,
                value: TokenValue::None,
                text: String::new(),
                line: self.line,
            });
        }

        let ch = self.reader.current_char();
        let kind = match ch {
            '[' => {
                self.reader.bump();
                let sep = self.skip_sep();
                if sep >= 0 {
                    self.reader.bump();
                    let s = self.read_long_string(sep as usize, "string")?;
                    return Ok(self.token(LuaTokenKind::TkString, TokenValue::Str(Rc::from(s))));
                }
                if sep != -1 {
                    return self.error("invalid long string delimiter");
                }
                LuaTokenKind::TkLeftBracket
            }
            '"' | '\'' => {
                let s = self.read_string(ch)?;
                return Ok(self.token(LuaTokenKind::TkString, TokenValue::Str(Rc::from(s))));
            }
            '0'..='9' => return self.read_numeral(),
            '.' => {
                if self.reader.next_char().is_ascii_digit() {
                    return self.read_numeral();
                }
                self.reader.bump();
                if self.reader.current_char() == '.' {
                    self.reader.bump();
                    if self.reader.current_char() == '.' {
                        self.reader.bump();
                        LuaTokenKind::TkDots
                    } else {
                        LuaTokenKind::TkConcat
                    }
                } else {
                    LuaTokenKind::TkDot
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                self.reader.eat_while(|c| c.is_alphanumeric() || c == '_');
                let text = self.reader.current_text();
                if let Some(kind) = keyword_kind(text) {
                    return Ok(self.token(kind, TokenValue::None));
                }
                let name: Rc<str> = Rc::from(text);
                return Ok(self.token(LuaTokenKind::TkName, TokenValue::Name(name)));
            }
            _ => {
                self.reader.bump();
                self.lex_symbol(ch)
            }
        };
        Ok(self.token(kind, TokenValue::None))
    }

    /// Operators and punctuation; `ch` was already consumed
    fn lex_symbol(&mut self, ch: char) -> LuaTokenKind {
        let next = self.reader.current_char();
        let mut two = |kind| {
            self.reader.bump();
            kind
        };
        match (ch, next) {
            ('=', '=') => two(LuaTokenKind::TkEq),
            ('<', '=') => two(LuaTokenKind::TkLe),
            ('<', '<') => two(LuaTokenKind::TkShl),
            ('>', '=') => two(LuaTokenKind::TkGe),
            ('>', '>') => two(LuaTokenKind::TkShr),
            ('~', '=') => two(LuaTokenKind::TkNe),
            ('/', '/') => two(LuaTokenKind::TkIDiv),
            (':', ':') => two(LuaTokenKind::TkDbColon),
            ('=', _) => LuaTokenKind::TkAssign,
            ('<', _) => LuaTokenKind::TkLt,
            ('>', _) => LuaTokenKind::TkGt,
            ('~', _) => LuaTokenKind::TkBitXor,
            ('/', _) => LuaTokenKind::TkDiv,
            (':', _) => LuaTokenKind::TkColon,
            ('+', _) => LuaTokenKind::TkPlus,
            ('-', _) => LuaTokenKind::TkMinus,
            ('*', _) => LuaTokenKind::TkMul,
            ('%', _) => LuaTokenKind::TkMod,
            ('^', _) => LuaTokenKind::TkPow,
            ('#', _) => LuaTokenKind::TkLen,
            ('&', _) => LuaTokenKind::TkBitAnd,
            ('|', _) => LuaTokenKind::TkBitOr,
            (',', _) => LuaTokenKind::TkComma,
            (';', _) => LuaTokenKind::TkSemicolon,
            (']', _) => LuaTokenKind::TkRightBracket,
            ('(', _) => LuaTokenKind::TkLeftParen,
            (')', _) => LuaTokenKind::TkRightParen,
            ('{', _) => LuaTokenKind::TkLeftBrace,
            ('}', _) => LuaTokenKind::TkRightBrace,
            _ => LuaTokenKind::TkUnknown,
        }
    }

    /// After a '[': count '=' signs. Returns the level when a second '['
    /// follows, -1 for a lone bracket and -2 otherwise.
    fn skip_sep(&mut self) -> i32 {
        let count = self.reader.eat_while(|c| c == '=') as i32;
        if self.reader.current_char() == '[' {
            count
        } else if count == 0 {
            -1
        } else {
            -2
        }
    }

    fn read_long_string(&mut self, sep: usize, what: &str) -> Result<String, LexError> {
        let start_line = self.line;
        let mut content = String::new();
        // a newline right after the opening bracket is skipped
        if is_newline(self.reader.current_char()) {
            self.inc_line();
        }
        loop {
            if self.reader.is_eof() {
                let message = format!(
                    "unfinished long {} (starting at line {})",
                    what, start_line
                );
                return Err(LexError {
                    message,
                    near: None,
                    line: self.line,
                });
            }
            match self.reader.current_char() {
                ']' => {
                    let closing = (1..=sep).all(|i| self.reader.peek(i) == '=')
                        && self.reader.peek(sep + 1) == ']';
                    if closing {
                        for _ in 0..sep + 2 {
                            self.reader.bump();
                        }
                        return Ok(content);
                    }
                    self.reader.bump();
                    content.push(']');
                }
                '\n' | '\r' => {
                    self.inc_line();
                    content.push('\n');
                }
                c => {
                    self.reader.bump();
                    content.push(c);
                }
            }
        }
    }

    fn read_string(&mut self, delimiter: char) -> Result<String, LexError> {
        self.reader.bump();
        let mut content = String::new();
        loop {
            let ch = self.reader.current_char();
            if self.reader.is_eof() {
                return Err(LexError {
                    message: "unfinished string".to_string(),
                    near: None,
                    line: self.line,
                });
            }
            match ch {
                c if c == delimiter => {
                    self.reader.bump();
                    return Ok(content);
                }
                '\n' | '\r' => return self.error("unfinished string"),
                '\\' => {
                    self.reader.bump();
                    self.read_escape(&mut content)?;
                }
                c => {
                    self.reader.bump();
                    content.push(c);
                }
            }
        }
    }

    fn read_escape(&mut self, content: &mut String) -> Result<(), LexError> {
        let ch = self.reader.current_char();
        let simple = match ch {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'a' => Some('\u{07}'),
            'b' => Some('\u{08}'),
            'f' => Some('\u{0C}'),
            'v' => Some('\u{0B}'),
            '\\' => Some('\\'),
            '"' => Some('"'),
            '\'' => Some('\''),
            _ => None,
        };
        if let Some(c) = simple {
            self.reader.bump();
            content.push(c);
            return Ok(());
        }
        match ch {
            '\n' | '\r' => {
                self.inc_line();
                content.push('\n');
            }
            'z' => {
                self.reader.bump();
                loop {
                    match self.reader.current_char() {
                        '\n' | '\r' => self.inc_line(),
                        c if c.is_ascii_whitespace() && !self.reader.is_eof() => self.reader.skip(),
                        _ => break,
                    }
                }
            }
            'x' => {
                self.reader.bump();
                let mut value = 0u32;
                for _ in 0..2 {
                    let Some(digit) = self.reader.current_char().to_digit(16) else {
                        self.reader.bump();
                        return self.error("hexadecimal digit expected");
                    };
                    self.reader.bump();
                    value = value * 16 + digit;
                }
                content.push(byte_char(value));
            }
            'u' => {
                self.reader.bump();
                if self.reader.current_char() != '{' {
                    self.reader.bump();
                    return self.error("missing '{' in \\u{xxxx}");
                }
                self.reader.bump();
                let mut value = 0u32;
                let mut digits = 0;
                while let Some(digit) = self.reader.current_char().to_digit(16) {
                    self.reader.bump();
                    value = value.saturating_mul(16).saturating_add(digit);
                    digits += 1;
                }
                if digits == 0 {
                    self.reader.bump();
                    return self.error("hexadecimal digit expected");
                }
                if self.reader.current_char() != '}' {
                    self.reader.bump();
                    return self.error("missing '}' in \\u{xxxx}");
                }
                self.reader.bump();
                match char::from_u32(value) {
                    Some(c) => content.push(c),
                    None => return self.error("UTF-8 value too large"),
                }
            }
            c if c.is_ascii_digit() => {
                let mut value = 0u32;
                for _ in 0..3 {
                    let Some(digit) = self.reader.current_char().to_digit(10) else {
                        break;
                    };
                    self.reader.bump();
                    value = value * 10 + digit;
                }
                if value > 255 {
                    return self.error("decimal escape too large");
                }
                content.push(byte_char(value));
            }
            _ => {
                if !self.reader.is_eof() {
                    self.reader.bump();
                }
                return self.error("invalid escape sequence");
            }
        }
        Ok(())
    }

    fn read_numeral(&mut self) -> Result<Token, LexError> {
        let mut exponent = ['E', 'e'];
        if self.reader.current_char() == '0' && matches!(self.reader.next_char(), 'x' | 'X') {
            self.reader.bump();
            self.reader.bump();
            exponent = ['P', 'p'];
        }
        loop {
            let ch = self.reader.current_char();
            if exponent.contains(&ch) {
                self.reader.bump();
                if matches!(self.reader.current_char(), '+' | '-') {
                    self.reader.bump();
                }
            } else if ch.is_ascii_hexdigit() || ch == '.' {
                self.reader.bump();
            } else {
                break;
            }
        }
        // a numeral touching a name is malformed ("3x")
        if self.reader.current_char().is_alphanumeric() || self.reader.current_char() == '_' {
            self.reader.eat_while(|c| c.is_alphanumeric() || c == '_');
            return self.error("malformed number");
        }
        match parse_numeral(self.reader.current_text()) {
            Some(LuaValue::Integer(i)) => Ok(self.token(LuaTokenKind::TkInt, TokenValue::Int(i))),
            Some(LuaValue::Float(f)) => Ok(self.token(LuaTokenKind::TkFloat, TokenValue::Float(f))),
            _ => self.error("malformed number"),
        }
    }
}

#[inline]
fn is_newline(ch: char) -> bool {
    ch == '\n' || ch == '\r'
}

/// Byte escapes map onto the first 256 code points
fn byte_char(value: u32) -> char {
    char::from_u32(value).unwrap_or(char::REPLACEMENT_CHARACTER)
}
