// CallInfo - Information about a single function call
// Equivalent to CallInfo structure in Lua C API (lstate.h)

use std::rc::Rc;

use crate::lua_value::Chunk;

/// How the called value was reached at the call site (funcnamefromcode).
/// Used for tracebacks and for the variable info in error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum CallName {
    Global(Rc<str>),
    Local(Rc<str>),
    Upvalue(Rc<str>),
    Field(Rc<str>),
    Method(Rc<str>),
    ForIterator,
    Metamethod(&'static str),
}

impl CallName {
    pub fn kind(&self) -> &'static str {
        match self {
            CallName::Global(_) => "global",
            CallName::Local(_) => "local",
            CallName::Upvalue(_) => "upvalue",
            CallName::Field(_) => "field",
            CallName::Method(_) => "method",
            CallName::ForIterator => "for iterator",
            CallName::Metamethod(_) => "metamethod",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CallName::Global(n)
            | CallName::Local(n)
            | CallName::Upvalue(n)
            | CallName::Field(n)
            | CallName::Method(n) => n,
            CallName::ForIterator => "for iterator",
            CallName::Metamethod(event) => event.trim_start_matches("__"),
        }
    }

    /// `global 'x'`, as appended to "attempt to call a nil value"
    pub fn describe(&self) -> String {
        format!("{} '{}'", self.kind(), self.name())
    }

    /// Frame description in a traceback; globals read as functions
    pub fn describe_frame(&self) -> String {
        match self {
            CallName::Global(n) => format!("function '{}'", n),
            _ => self.describe(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum CallKind {
    /// Interpreted function; the chunk gives source name and definition line
    Lua(Rc<Chunk>),
    Native,
}

#[derive(Debug, Clone)]
pub struct CallInfo {
    pub kind: CallKind,
    pub name: Option<CallName>,
    /// Line currently executing (Lua frames only)
    pub current_line: u32,
}

impl CallInfo {
    pub fn lua(chunk: Rc<Chunk>, name: Option<CallName>) -> Self {
        let current_line = chunk.linedefined;
        CallInfo {
            kind: CallKind::Lua(chunk),
            name,
            current_line,
        }
    }

    pub fn native(name: Option<CallName>) -> Self {
        CallInfo {
            kind: CallKind::Native,
            name,
            current_line: 0,
        }
    }

    #[inline]
    pub fn is_lua(&self) -> bool {
        matches!(self.kind, CallKind::Lua(_))
    }

    /// `source:line:` prefix for messages raised at this level
    pub fn location(&self) -> Option<String> {
        match &self.kind {
            CallKind::Lua(chunk) => Some(format!("{}:{}:", chunk.source_name, self.current_line)),
            CallKind::Native => None,
        }
    }

    /// One traceback line, without the leading tab
    pub fn describe(&self) -> String {
        match &self.kind {
            CallKind::Lua(chunk) => {
                let what = if chunk.is_main() {
                    "main chunk".to_string()
                } else {
                    match &self.name {
                        Some(name) => name.describe_frame(),
                        None => format!("function <{}:{}>", chunk.source_name, chunk.linedefined),
                    }
                };
                format!("{}:{}: in {}", chunk.source_name, self.current_line, what)
            }
            CallKind::Native => match &self.name {
                Some(name) => format!("[C]: in {}", name.describe_frame()),
                None => "[C]: in ?".to_string(),
            },
        }
    }
}
