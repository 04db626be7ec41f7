//! Compiled chunk format.
//!
//! A chunk is the immutable unit an external assembler or compiler hands
//! to the VM: typed literal constants, nested child chunks, the register
//! count of one activation, and the instruction vector. Chunks never touch
//! the heap; constants are materialized to values when the interpreter
//! first uses them.

use kpl_asm::Instruction;

use std::sync::Arc;

/// Typed literal stored in a chunk.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    /// The null literal.
    Null,
    /// Integer literal.
    Integer(i64),
    /// Float literal.
    Float(f64),
    /// Boolean literal.
    Boolean(bool),
    /// Byte-string literal; the chunk owns the buffer.
    String(Box<[u8]>),
}

impl From<i64> for Constant {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Constant {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Constant {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for Constant {
    fn from(value: &str) -> Self {
        Self::String(value.as_bytes().into())
    }
}

impl From<&[u8]> for Constant {
    fn from(value: &[u8]) -> Self {
        Self::String(value.into())
    }
}

/// Immutable bundle of constants, child chunks, register count, and code.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chunk {
    constants: Vec<Constant>,
    children: Vec<Arc<Chunk>>,
    register_count: u8,
    code: Vec<Instruction>,
}

impl Chunk {
    /// Starts a builder for a new chunk.
    pub fn builder() -> ChunkBuilder {
        ChunkBuilder::default()
    }

    /// Constant at `index`.
    pub fn constant(&self, index: usize) -> Option<&Constant> {
        self.constants.get(index)
    }

    /// All constants, in index order.
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Child chunk at `index`.
    pub fn child(&self, index: usize) -> Option<&Arc<Chunk>> {
        self.children.get(index)
    }

    /// All child chunks.
    pub fn children(&self) -> &[Arc<Chunk>] {
        &self.children
    }

    /// Register file size of one activation of this chunk.
    pub const fn register_count(&self) -> u8 {
        self.register_count
    }

    /// Instruction at `pc`.
    pub fn instruction(&self, pc: usize) -> Option<Instruction> {
        self.code.get(pc).copied()
    }

    /// The instruction vector.
    pub fn code(&self) -> &[Instruction] {
        &self.code
    }
}

/// Collects the sections of a chunk and emits it in one step.
///
/// Build is total: every section may be empty.
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    constants: Vec<Constant>,
    children: Vec<Arc<Chunk>>,
    register_count: u8,
    code: Vec<Instruction>,
}

impl ChunkBuilder {
    /// Replaces the constant table.
    pub fn constants<I>(mut self, constants: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Constant>,
    {
        self.constants = constants.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one constant.
    pub fn constant(mut self, constant: impl Into<Constant>) -> Self {
        self.constants.push(constant.into());
        self
    }

    /// Replaces the child chunk table.
    pub fn children(mut self, children: Vec<Arc<Chunk>>) -> Self {
        self.children = children;
        self
    }

    /// Appends one child chunk.
    pub fn child(mut self, child: Arc<Chunk>) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the register file size.
    pub fn register_count(mut self, count: u8) -> Self {
        self.register_count = count;
        self
    }

    /// Replaces the instruction vector.
    pub fn code<I>(mut self, code: I) -> Self
    where
        I: IntoIterator<Item = Instruction>,
    {
        self.code = code.into_iter().collect();
        self
    }

    /// Appends one instruction.
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.code.push(instruction);
        self
    }

    /// Emits the chunk.
    pub fn build(self) -> Arc<Chunk> {
        Arc::new(Chunk {
            constants: self.constants,
            children: self.children,
            register_count: self.register_count,
            code: self.code,
        })
    }
}
