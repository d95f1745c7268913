use std::collections::VecDeque;

/// Pull-based source of chunk text.
///
/// `read` is invoked repeatedly; each call returns the next fragment of the
/// source. An empty or absent fragment ends the chunk.
pub trait ChunkReader {
    fn read(&mut self) -> Option<String>;
}

impl<F> ChunkReader for F
where
    F: FnMut() -> Option<String>,
{
    fn read(&mut self) -> Option<String> {
        self()
    }
}

/// Whole source available up front: a single fragment
pub struct StringReader<'a> {
    source: Option<&'a str>,
}

impl<'a> StringReader<'a> {
    pub fn new(source: &'a str) -> Self {
        StringReader {
            source: Some(source),
        }
    }
}

impl ChunkReader for StringReader<'_> {
    fn read(&mut self) -> Option<String> {
        self.source.take().map(str::to_owned)
    }
}

pub const EOF: char = '\0';

/// Character cursor over a `ChunkReader`. Fragments are pulled lazily, only
/// when the lookahead window runs dry, so the source never has to exist as
/// one buffer.
pub struct Reader<'a> {
    source: &'a mut dyn ChunkReader,
    pending: VecDeque<char>,
    exhausted: bool,
    buff: String,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a mut dyn ChunkReader) -> Self {
        Reader {
            source,
            pending: VecDeque::new(),
            exhausted: false,
            buff: String::new(),
        }
    }

    /// Make sure `n + 1` characters are buffered, if the source has them
    fn fill(&mut self, n: usize) -> bool {
        while self.pending.len() <= n {
            if self.exhausted {
                return false;
            }
            match self.source.read() {
                Some(fragment) if !fragment.is_empty() => self.pending.extend(fragment.chars()),
                _ => self.exhausted = true,
            }
        }
        true
    }

    #[inline]
    pub fn current_char(&mut self) -> char {
        self.peek(0)
    }

    #[inline]
    pub fn next_char(&mut self) -> char {
        self.peek(1)
    }

    pub fn peek(&mut self, n: usize) -> char {
        if self.fill(n) { self.pending[n] } else { EOF }
    }

    pub fn is_eof(&mut self) -> bool {
        !self.fill(0)
    }

    /// Consume the current character into the token buffer
    pub fn bump(&mut self) {
        if self.fill(0)
            && let Some(ch) = self.pending.pop_front()
        {
            self.buff.push(ch);
        }
    }

    /// Consume the current character without recording it
    pub fn skip(&mut self) {
        if self.fill(0) {
            self.pending.pop_front();
        }
    }

    pub fn eat_while(&mut self, f: impl Fn(char) -> bool) -> usize {
        let mut count = 0;
        while !self.is_eof() && f(self.current_char()) {
            self.bump();
            count += 1;
        }
        count
    }

    pub fn reset_buff(&mut self) {
        self.buff.clear();
    }

    pub fn current_text(&self) -> &str {
        &self.buff
    }
}
