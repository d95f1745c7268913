use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LuaTokenKind {
    // KeyWord
    TkAnd,
    TkBreak,
    TkDo,
    TkElse,
    TkElseIf,
    TkEnd,
    TkFalse,
    TkFor,
    TkFunction,
    TkGoto,
    TkIf,
    TkIn,
    TkLocal,
    TkNil,
    TkNot,
    TkOr,
    TkRepeat,
    TkReturn,
    TkThen,
    TkTrue,
    TkUntil,
    TkWhile,

    TkPlus,      // +
    TkMinus,     // -
    TkMul,       // *
    TkDiv,       // /
    TkIDiv,      // //
    TkDot,       // .
    TkConcat,    // ..
    TkDots,      // ...
    TkComma,     // ,
    TkAssign,    // =
    TkEq,        // ==
    TkGe,        // >=
    TkLe,        // <=
    TkNe,        // ~=
    TkShl,       // <<
    TkShr,       // >>
    TkLt,        // <
    TkGt,        // >
    TkMod,       // %
    TkPow,       // ^
    TkLen,       // #
    TkBitAnd,    // &
    TkBitOr,     // |
    TkBitXor,    // ~
    TkColon,     // :
    TkDbColon,   // ::
    TkSemicolon, // ;

    TkLeftBracket,  // [
    TkRightBracket, // ]
    TkLeftParen,    // (
    TkRightParen,   // )
    TkLeftBrace,    // {
    TkRightBrace,   // }
    TkInt,          // int
    TkFloat,        // float

    TkName,   // name
    TkString, // string (short or long)
    TkEof,    // eof

    TkUnknown, // unknown
}

impl fmt::Display for LuaTokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_user_string())
    }
}

impl LuaTokenKind {
    /// Convert token kind to user-readable string (like Lua's luaX_token2str)
    pub fn to_user_string(&self) -> &'static str {
        match self {
            LuaTokenKind::TkAnd => "and",
            LuaTokenKind::TkBreak => "break",
            LuaTokenKind::TkDo => "do",
            LuaTokenKind::TkElse => "else",
            LuaTokenKind::TkElseIf => "elseif",
            LuaTokenKind::TkEnd => "end",
            LuaTokenKind::TkFalse => "false",
            LuaTokenKind::TkFor => "for",
            LuaTokenKind::TkFunction => "function",
            LuaTokenKind::TkGoto => "goto",
            LuaTokenKind::TkIf => "if",
            LuaTokenKind::TkIn => "in",
            LuaTokenKind::TkLocal => "local",
            LuaTokenKind::TkNil => "nil",
            LuaTokenKind::TkNot => "not",
            LuaTokenKind::TkOr => "or",
            LuaTokenKind::TkRepeat => "repeat",
            LuaTokenKind::TkReturn => "return",
            LuaTokenKind::TkThen => "then",
            LuaTokenKind::TkTrue => "true",
            LuaTokenKind::TkUntil => "until",
            LuaTokenKind::TkWhile => "while",
            LuaTokenKind::TkPlus => "+",
            LuaTokenKind::TkMinus => "-",
            LuaTokenKind::TkMul => "*",
            LuaTokenKind::TkDiv => "/",
            LuaTokenKind::TkIDiv => "//",
            LuaTokenKind::TkDot => ".",
            LuaTokenKind::TkConcat => "..",
            LuaTokenKind::TkDots => "...",
            LuaTokenKind::TkComma => ",",
            LuaTokenKind::TkAssign => "=",
            LuaTokenKind::TkEq => "==",
            LuaTokenKind::TkGe => ">=",
            LuaTokenKind::TkLe => "<=",
            LuaTokenKind::TkNe => "~=",
            LuaTokenKind::TkShl => "<<",
            LuaTokenKind::TkShr => ">>",
            LuaTokenKind::TkLt => "<",
            LuaTokenKind::TkGt => ">",
            LuaTokenKind::TkMod => "%",
            LuaTokenKind::TkPow => "^",
            LuaTokenKind::TkLen => "#",
            LuaTokenKind::TkBitAnd => "&",
            LuaTokenKind::TkBitOr => "|",
            LuaTokenKind::TkBitXor => "~",
            LuaTokenKind::TkColon => ":",
            LuaTokenKind::TkDbColon => "::",
            LuaTokenKind::TkSemicolon => ";",
            LuaTokenKind::TkLeftBracket => "[",
            LuaTokenKind::TkRightBracket => "]",
            LuaTokenKind::TkLeftParen => "(",
            LuaTokenKind::TkRightParen => ")",
            LuaTokenKind::TkLeftBrace => "{",
            LuaTokenKind::TkRightBrace => "}",
            LuaTokenKind::TkInt => "<integer>",
            LuaTokenKind::TkFloat => "<number>",
            LuaTokenKind::TkName => "<name>",
            LuaTokenKind::TkString => "<string>",
            LuaTokenKind::TkEof => "<eof>",
            LuaTokenKind::TkUnknown => "<unknown>",
        }
    }

    /// Tokens that close a block
    pub fn is_block_follow(self, with_until: bool) -> bool {
        match self {
            LuaTokenKind::TkElse
            | LuaTokenKind::TkElseIf
            | LuaTokenKind::TkEnd
            | LuaTokenKind::TkEof => true,
            LuaTokenKind::TkUntil => with_until,
            _ => false,
        }
    }
}

pub fn keyword_kind(name: &str) -> Option<LuaTokenKind> {
    Some(match name {
        "and" => LuaTokenKind::TkAnd,
        "break" => LuaTokenKind::TkBreak,
        "do" => LuaTokenKind::TkDo,
        "else" => LuaTokenKind::TkElse,
        "elseif" => LuaTokenKind::TkElseIf,
        "end" => LuaTokenKind::TkEnd,
        "false" => LuaTokenKind::TkFalse,
        "for" => LuaTokenKind::TkFor,
        "function" => LuaTokenKind::TkFunction,
        "goto" => LuaTokenKind::TkGoto,
        "if" => LuaTokenKind::TkIf,
        "in" => LuaTokenKind::TkIn,
        "local" => LuaTokenKind::TkLocal,
        "nil" => LuaTokenKind::TkNil,
        "not" => LuaTokenKind::TkNot,
        "or" => LuaTokenKind::TkOr,
        "repeat" => LuaTokenKind::TkRepeat,
        "return" => LuaTokenKind::TkReturn,
        "then" => LuaTokenKind::TkThen,
        "true" => LuaTokenKind::TkTrue,
        "until" => LuaTokenKind::TkUntil,
        "while" => LuaTokenKind::TkWhile,
        _ => return None,
    })
}
