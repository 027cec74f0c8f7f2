//! Register-machine intermediate representation
//!
//! A [`Module`] is one translation unit ("bitcode"). It owns its functions and,
//! once synthesis has run, the trampolines that redirect mutated functions at
//! run time. Modules are stored on disk as JSON.

mod builder;

pub use builder::FunctionBuilder;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MutationError, Result};
use crate::mutation::MutationPoint;

/// Debug location of a function or instruction
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Virtual register, local to one function frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reg(pub u32);

/// Instruction operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Reg(Reg),
    Param(u32),
    Const(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// Evaluate with two's-complement wrapping; `None` on division by zero
    pub fn evaluate(self, lhs: i64, rhs: i64) -> Option<i64> {
        let value = match self {
            BinaryOp::Add => lhs.wrapping_add(rhs),
            BinaryOp::Sub => lhs.wrapping_sub(rhs),
            BinaryOp::Mul => lhs.wrapping_mul(rhs),
            BinaryOp::Div => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_div(rhs)
            }
            BinaryOp::Rem => {
                if rhs == 0 {
                    return None;
                }
                lhs.wrapping_rem(rhs)
            }
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
            BinaryOp::Shl => lhs.wrapping_shl(rhs as u32),
            BinaryOp::Shr => lhs.wrapping_shr(rhs as u32),
            BinaryOp::Eq => i64::from(lhs == rhs),
            BinaryOp::Ne => i64::from(lhs != rhs),
            BinaryOp::Lt => i64::from(lhs < rhs),
            BinaryOp::Le => i64::from(lhs <= rhs),
            BinaryOp::Gt => i64::from(lhs > rhs),
            BinaryOp::Ge => i64::from(lhs >= rhs),
        };
        Some(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InstructionKind {
    Binary {
        dst: Reg,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
    },
    Call {
        dst: Option<Reg>,
        callee: String,
        args: Vec<Value>,
    },
    /// Call through the trampoline of `trampoline`, resolved at process start
    Dispatch {
        dst: Reg,
        trampoline: String,
        args: Vec<Value>,
    },
    Print {
        value: Value,
    },
    Jump {
        target: usize,
    },
    Branch {
        cond: Value,
        then_block: usize,
        else_block: usize,
    },
    Return {
        value: Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    #[serde(flatten)]
    pub kind: InstructionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

/// Position of an instruction inside its function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstructionAddress {
    pub block: usize,
    pub index: usize,
}

impl fmt::Display for InstructionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.block, self.index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub instructions: Vec<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: u32,
    #[serde(default)]
    pub blocks: Vec<BasicBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Function {
    /// A function without a body only declares its symbol
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn instruction(&self, address: InstructionAddress) -> Option<&Instruction> {
        self.blocks
            .get(address.block)
            .and_then(|block| block.instructions.get(address.index))
    }

    pub fn instruction_mut(&mut self, address: InstructionAddress) -> Option<&mut Instruction> {
        self.blocks
            .get_mut(address.block)
            .and_then(|block| block.instructions.get_mut(address.index))
    }

    /// All instructions in block order
    pub fn instructions(&self) -> impl Iterator<Item = (InstructionAddress, &Instruction)> {
        self.blocks.iter().enumerate().flat_map(|(block, bb)| {
            bb.instructions
                .iter()
                .enumerate()
                .map(move |(index, instruction)| (InstructionAddress { block, index }, instruction))
        })
    }

    /// Copy of this function under a new symbol
    pub fn clone_as(&self, name: impl Into<String>) -> Function {
        Function {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Drop the body, keeping the symbol as a declaration
    pub fn strip_body(&mut self) {
        self.blocks.clear();
    }
}

/// One selectable mutant of a trampoline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrampolineTarget {
    /// Environment variable that activates this mutant
    pub selector: String,
    pub function: String,
}

/// Run-time redirection of a mutated function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trampoline {
    pub function: String,
    pub original: String,
    pub mutants: Vec<TrampolineTarget>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub source_file: String,
    pub functions: Vec<Function>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trampolines: Vec<Trampoline>,
    /// Mutation points whose mutants live in this module
    #[serde(skip)]
    pub mutations: Vec<MutationPoint>,
}

/// FNV-1a 64-bit hash, stable across runs and platforms
pub fn stable_hash(input: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    let mut hash = OFFSET_BASIS;
    for b in input.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

impl Module {
    pub fn new(name: impl Into<String>, source_file: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    /// Load a module from a JSON bitcode file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MutationError::BitcodeReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| MutationError::BitcodeParseError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| MutationError::CompileError {
            module: self.name.clone(),
            error: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    /// File name of the translation unit, used to scope coverage records
    pub fn unit_file_name(&self) -> &str {
        Path::new(&self.source_file)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.source_file)
    }

    pub fn add_mutation(&mut self, point: MutationPoint) {
        self.mutations.push(point);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sub_function() -> Function {
        let mut builder = FunctionBuilder::new("sub", 2);
        builder.located("sample.c", 1, 1);
        let diff = builder
            .at(2, 12)
            .binary(BinaryOp::Sub, Value::Param(0), Value::Param(1));
        builder.ret(diff);
        builder.build()
    }

    #[test]
    fn test_evaluate_wraps_and_traps() {
        assert_eq!(BinaryOp::Add.evaluate(i64::MAX, 1), Some(i64::MIN));
        assert_eq!(BinaryOp::Div.evaluate(1, 0), None);
        assert_eq!(BinaryOp::Rem.evaluate(1, 0), None);
        assert_eq!(BinaryOp::Le.evaluate(2, 2), Some(1));
        assert_eq!(BinaryOp::Gt.evaluate(2, 2), Some(0));
    }

    #[test]
    fn test_instruction_addressing() {
        let function = sub_function();
        let addresses: Vec<_> = function.instructions().map(|(a, _)| a).collect();
        assert_eq!(
            addresses,
            vec![
                InstructionAddress { block: 0, index: 0 },
                InstructionAddress { block: 0, index: 1 },
            ]
        );
        let first = function.instruction(addresses[0]).unwrap();
        assert_eq!(first.location, Some(SourceLocation::new("sample.c", 2, 12)));
    }

    #[test]
    fn test_strip_body_keeps_symbol() {
        let mut function = sub_function();
        let clone = function.clone_as("sub.original");
        function.strip_body();
        assert!(function.is_declaration());
        assert_eq!(function.name, "sub");
        assert!(!clone.is_declaration());
    }

    #[test]
    fn test_module_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bc.json");
        let module = Module::new("sample", "/src/sample.c").with_function(sub_function());
        module.save(&path).unwrap();

        let loaded = Module::load(&path).unwrap();
        assert_eq!(loaded.functions, module.functions);
        assert_eq!(loaded.unit_file_name(), "sample.c");
    }

    #[test]
    fn test_every_instruction_kind_survives_json() {
        let located = |kind| Instruction {
            kind,
            location: Some(SourceLocation::new("sample.c", 4, 2)),
        };
        let instructions = vec![
            located(InstructionKind::Binary {
                dst: Reg(0),
                op: BinaryOp::Shl,
                lhs: Value::Param(0),
                rhs: Value::Const(-3),
            }),
            located(InstructionKind::Call {
                dst: Some(Reg(1)),
                callee: "sub".to_string(),
                args: vec![Value::Reg(Reg(0)), Value::Const(2)],
            }),
            located(InstructionKind::Call {
                dst: None,
                callee: "log".to_string(),
                args: Vec::new(),
            }),
            Instruction {
                kind: InstructionKind::Dispatch {
                    dst: Reg(2),
                    trampoline: "sub".to_string(),
                    args: vec![Value::Param(1)],
                },
                location: None,
            },
            located(InstructionKind::Print {
                value: Value::Reg(Reg(2)),
            }),
            located(InstructionKind::Jump { target: 1 }),
            located(InstructionKind::Branch {
                cond: Value::Reg(Reg(1)),
                then_block: 2,
                else_block: 3,
            }),
            located(InstructionKind::Return {
                value: Value::Const(0),
            }),
        ];

        let json = serde_json::to_string(&instructions).unwrap();
        assert!(json.contains(r#""kind":"binary""#), "{}", json);
        assert!(json.contains(r#""op":"shl""#), "{}", json);
        let decoded: Vec<Instruction> = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, instructions);
    }

    #[test]
    fn test_stable_hash_is_fnv1a() {
        assert_eq!(stable_hash(""), 0xcbf29ce484222325);
        assert_eq!(stable_hash("a"), 0xaf63dc4c8601ec8c);
        assert_ne!(stable_hash("sub"), stable_hash("add"));
    }

    #[test]
    fn test_malformed_bitcode_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bc.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Module::load(&path),
            Err(MutationError::BitcodeParseError { .. })
        ));
    }
}
