use super::{BasicBlock, BinaryOp, Function, Instruction, InstructionKind, Reg, SourceLocation, Value};

/// Incremental construction of a [`Function`]
///
/// The builder keeps a current block and a current debug location; every
/// emitted instruction lands in the current block and carries the current
/// location.
pub struct FunctionBuilder {
    function: Function,
    current_block: usize,
    location: Option<SourceLocation>,
    next_reg: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>, params: u32) -> Self {
        Self {
            function: Function {
                name: name.into(),
                params,
                blocks: vec![BasicBlock::default()],
                location: None,
            },
            current_block: 0,
            location: None,
            next_reg: 0,
        }
    }

    /// Attach a definition location; later `at` calls reuse its file
    pub fn located(&mut self, file: impl Into<String>, line: u32, column: u32) -> &mut Self {
        self.function.location = Some(SourceLocation::new(file, line, column));
        self
    }

    /// Set the debug location for subsequent instructions
    pub fn at(&mut self, line: u32, column: u32) -> &mut Self {
        let file = self
            .function
            .location
            .as_ref()
            .map(|l| l.file.clone())
            .unwrap_or_default();
        self.location = Some(SourceLocation::new(file, line, column));
        self
    }

    /// Emit subsequent instructions without debug info
    pub fn without_location(&mut self) -> &mut Self {
        self.location = None;
        self
    }

    /// Append a new empty block and return its index
    pub fn block(&mut self) -> usize {
        self.function.blocks.push(BasicBlock::default());
        self.function.blocks.len() - 1
    }

    pub fn switch_to(&mut self, block: usize) -> &mut Self {
        self.current_block = block;
        self
    }

    pub fn binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value) -> Value {
        let dst = self.fresh_reg();
        self.emit(InstructionKind::Binary { dst, op, lhs, rhs });
        Value::Reg(dst)
    }

    pub fn call(&mut self, callee: impl Into<String>, args: Vec<Value>) -> Value {
        let dst = self.fresh_reg();
        self.emit(InstructionKind::Call {
            dst: Some(dst),
            callee: callee.into(),
            args,
        });
        Value::Reg(dst)
    }

    /// Call whose result is discarded
    pub fn call_void(&mut self, callee: impl Into<String>, args: Vec<Value>) {
        self.emit(InstructionKind::Call {
            dst: None,
            callee: callee.into(),
            args,
        });
    }

    /// Call through the trampoline registered for `trampoline`
    pub fn dispatch(&mut self, trampoline: impl Into<String>, args: Vec<Value>) -> Value {
        let dst = self.fresh_reg();
        self.emit(InstructionKind::Dispatch {
            dst,
            trampoline: trampoline.into(),
            args,
        });
        Value::Reg(dst)
    }

    pub fn print(&mut self, value: Value) {
        self.emit(InstructionKind::Print { value });
    }

    pub fn jump(&mut self, target: usize) {
        self.emit(InstructionKind::Jump { target });
    }

    pub fn branch(&mut self, cond: Value, then_block: usize, else_block: usize) {
        self.emit(InstructionKind::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn ret(&mut self, value: Value) {
        self.emit(InstructionKind::Return { value });
    }

    pub fn build(self) -> Function {
        self.function
    }

    fn fresh_reg(&mut self) -> Reg {
        let reg = Reg(self.next_reg);
        self.next_reg += 1;
        reg
    }

    fn emit(&mut self, kind: InstructionKind) {
        let instruction = Instruction {
            kind,
            location: self.location.clone(),
        };
        self.function.blocks[self.current_block]
            .instructions
            .push(instruction);
    }
}
