// Chunk compilation
// A chunk is the compiled main function of a script. It carries no runtime
// state, so one chunk can be invoked any number of times.

use std::rc::Rc;

use lunar_vm::{ChunkReader, StringReader};
use tracing::debug;

use crate::engine::Engine;
use crate::error::CompileError;

/// Compiled, immediately invocable unit
#[derive(Clone)]
pub struct Chunk {
    pub(crate) proto: Rc<lunar_vm::Chunk>,
}

impl Chunk {
    /// Display name used in messages and tracebacks
    pub fn name(&self) -> &str {
        &self.proto.source_name
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk").field("name", &self.name()).finish()
    }
}

impl Engine {
    /// Compile source text; the text itself names the chunk
    pub fn compile(&mut self, source: &str) -> Result<Chunk, CompileError> {
        self.compile_named(source, source)
    }

    /// Compile with an explicit chunk name (`=name`, `@file` or free text)
    pub fn compile_named(&mut self, source: &str, chunk_name: &str) -> Result<Chunk, CompileError> {
        let mut reader = StringReader::new(source);
        self.compile_reader(&mut reader, chunk_name)
    }

    /// Compile source pulled fragment by fragment from `reader` until it
    /// yields an empty or absent fragment
    pub fn compile_reader(
        &mut self,
        reader: &mut dyn ChunkReader,
        chunk_name: &str,
    ) -> Result<Chunk, CompileError> {
        match self.vm.compile_chunk(reader, chunk_name) {
            Ok(proto) => Ok(Chunk { proto }),
            Err(_) => {
                let message = self.vm.error_message();
                self.vm.clear_error();
                debug!(%message, "compilation failed");
                Err(CompileError { message })
            }
        }
    }
}
