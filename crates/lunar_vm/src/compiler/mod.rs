// Lua compiler front end
// Streams tokens from a ChunkReader, parses with a recursive-descent parser
// (after lparser.c) and produces a resolved syntax tree per function.
pub mod ast;
mod expression;
mod func_state;
mod parse_lua_number;
pub mod parser;
mod statement;

use std::rc::Rc;

use crate::compiler::func_state::{FuncState, VarKind, resolve_var};
use crate::compiler::parser::lua_tokenize::{LexError, LuaTokenize, Token, TokenValue};
use crate::compiler::parser::{ChunkReader, LuaTokenKind, Reader};
use crate::lua_value::Chunk;
use crate::lua_vm::lua_limits::{MAX_SRC_LEN, MAXCCALLS};
pub use parse_lua_number::{parse_numeral, str_to_number};

pub type ParseResult<T> = Result<T, String>;

/// Compile a chunk pulled from `reader`. `chunkname` follows the usual
/// convention: "=name" and "@file" are shown as given, anything else is
/// treated as the source text itself and shown as `[string "..."]`.
pub fn compile_chunk(reader: &mut dyn ChunkReader, chunkname: &str) -> ParseResult<Chunk> {
    let source_name: Rc<str> = Rc::from(chunk_id(chunkname));
    let lexer = LuaTokenize::new(Reader::new(reader));
    let mut parser = LuaParser::new(lexer, source_name)?;
    parser.main_func()
}

/// Display form of a chunk name (luaO_chunkid)
pub fn chunk_id(chunkname: &str) -> String {
    if let Some(name) = chunkname.strip_prefix('=') {
        return name.chars().take(MAX_SRC_LEN).collect();
    }
    if let Some(file) = chunkname.strip_prefix('@') {
        let count = file.chars().count();
        if count <= MAX_SRC_LEN {
            return file.to_string();
        }
        let tail: String = file.chars().skip(count - (MAX_SRC_LEN - 3)).collect();
        return format!("...{}", tail);
    }

    let first_line = chunkname.lines().next().unwrap_or("");
    let budget = MAX_SRC_LEN - "[string \"...\"]".len();
    let truncated = first_line.len() < chunkname.len() || first_line.chars().count() > budget;
    if truncated {
        let head: String = first_line.chars().take(budget).collect();
        format!("[string \"{}...\"]", head)
    } else {
        format!("[string \"{}\"]", first_line)
    }
}

pub struct LuaParser<'a> {
    lexer: LuaTokenize<'a>,
    current: Token,
    ahead: Option<Token>,
    source_name: Rc<str>,
    fs: Vec<FuncState>,
    depth: usize,
    /// Line of the last consumed token
    lastline: u32,
}

impl<'a> LuaParser<'a> {
    fn new(mut lexer: LuaTokenize<'a>, source_name: Rc<str>) -> ParseResult<Self> {
        let first = lexer
            .next_token()
            .map_err(|e| lex_error_message(&source_name, e))?;
        Ok(LuaParser {
            lexer,
            current: first,
            ahead: None,
            source_name,
            fs: Vec::new(),
            depth: 0,
            lastline: 1,
        })
    }

    fn main_func(&mut self) -> ParseResult<Chunk> {
        let mut fs = FuncState::new(0);
        fs.is_vararg = true;
        self.fs.push(fs);
        let body = self.statlist()?;
        self.check(LuaTokenKind::TkEof)?;
        Ok(self.close_func(body))
    }

    fn close_func(&mut self, body: ast::Block) -> Chunk {
        let fs = self.fs.pop().unwrap_or_else(|| FuncState::new(0));
        Chunk {
            body,
            param_count: fs.param_count,
            is_vararg: fs.is_vararg,
            locals: fs.locals,
            captured: fs.captured,
            upvalue_descs: fs.upvalues,
            source_name: self.source_name.clone(),
            linedefined: fs.linedefined,
        }
    }

    // ============ Token stream ============

    #[inline]
    fn token(&self) -> LuaTokenKind {
        self.current.kind
    }

    #[inline]
    fn line(&self) -> u32 {
        self.current.line
    }

    fn next(&mut self) -> ParseResult<Token> {
        let next = match self.ahead.take() {
            Some(token) => token,
            None => self.lexer.next_token().map_err(|e| self.lex_error(e))?,
        };
        self.lastline = self.current.line;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn peek(&mut self) -> ParseResult<LuaTokenKind> {
        if self.ahead.is_none() {
            let token = self.lexer.next_token().map_err(|e| self.lex_error(e))?;
            self.ahead = Some(token);
        }
        Ok(self.ahead.as_ref().map_or(LuaTokenKind::TkEof, |t| t.kind))
    }

    fn test_next(&mut self, kind: LuaTokenKind) -> ParseResult<bool> {
        if self.token() == kind {
            self.next()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn check(&self, kind: LuaTokenKind) -> ParseResult<()> {
        if self.token() == kind {
            Ok(())
        } else {
            Err(self.error(&format!("'{}' expected", kind)))
        }
    }

    fn check_next(&mut self, kind: LuaTokenKind) -> ParseResult<()> {
        self.check(kind)?;
        self.next()?;
        Ok(())
    }

    /// Expect `what` closing the construct `who` opened at `line`
    fn check_match(&mut self, what: LuaTokenKind, who: LuaTokenKind, line: u32) -> ParseResult<()> {
        if self.token() == what {
            self.next()?;
            return Ok(());
        }
        if line == self.line() {
            Err(self.error(&format!("'{}' expected", what)))
        } else {
            Err(self.error(&format!(
                "'{}' expected (to close '{}' at line {})",
                what, who, line
            )))
        }
    }

    fn str_checkname(&mut self) -> ParseResult<Rc<str>> {
        self.check(LuaTokenKind::TkName)?;
        let token = self.next()?;
        match token.value {
            TokenValue::Name(name) => Ok(name),
            _ => Err(self.error("<name> expected")),
        }
    }

    // ============ Diagnostics ============

    fn error(&self, message: &str) -> String {
        let near = match self.current.kind {
            LuaTokenKind::TkEof => "<eof>".to_string(),
            _ => format!("'{}'", self.current.text),
        };
        format!(
            "{}:{}: {} near {}",
            self.source_name, self.current.line, message, near
        )
    }

    fn lex_error(&self, error: LexError) -> String {
        lex_error_message(&self.source_name, error)
    }

    fn enter_level(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAXCCALLS {
            return Err(self.error("chunk has too many syntax levels"));
        }
        Ok(())
    }

    fn leave_level(&mut self) {
        self.depth -= 1;
    }

    // ============ Scopes ============

    fn fs(&mut self) -> &mut FuncState {
        // the main function is pushed before any parsing starts
        let last = self.fs.len() - 1;
        &mut self.fs[last]
    }

    fn singlevar(&mut self, name: Rc<str>) -> ast::Expr {
        match resolve_var(&mut self.fs, &name) {
            VarKind::Local(slot) => ast::Expr::Local(slot),
            VarKind::Upvalue(idx) => ast::Expr::Upvalue(idx),
            VarKind::Global => ast::Expr::Global(name),
        }
    }
}

fn lex_error_message(source_name: &str, error: LexError) -> String {
    match error.near {
        Some(near) => format!(
            "{}:{}: {} near '{}'",
            source_name, error.line, error.message, near
        ),
        None => format!("{}:{}: {} near <eof>", source_name, error.line, error.message),
    }
}
