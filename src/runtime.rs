//! Execution of linked images
//!
//! A linked executable is a launcher that re-enters this crate's binary with
//! `exec-image <image>`. The runtime resolves which mutant each trampoline
//! points at once, from the process environment, and then interprets `main`.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MutationError, Result};
use crate::ir::{Function, InstructionKind, Trampoline, Value};

const MAX_CALL_DEPTH: usize = 1024;

/// Every function and trampoline of a linked program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    pub functions: Vec<Function>,
    #[serde(default)]
    pub trampolines: Vec<Trampoline>,
}

impl Image {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| MutationError::ImageError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        serde_json::from_str(&content).map_err(|e| MutationError::ImageError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self).map_err(|e| MutationError::LinkError {
            reason: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Names of the mutant selectors set for this process
#[derive(Debug, Clone, Default)]
pub struct Selector {
    active: HashSet<String>,
}

impl Selector {
    /// Snapshot of the environment variables present at process start
    pub fn from_env() -> Self {
        Self::from_keys(
            std::env::vars_os()
                .map(|(key, _)| key)
                .filter_map(|key: OsString| key.into_string().ok()),
        )
    }

    pub fn from_keys(keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            active: keys.into_iter().collect(),
        }
    }

    pub fn is_active(&self, key: &str) -> bool {
        self.active.contains(key)
    }
}

/// Reasons interpretation stops abnormally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    DivisionByZero { function: String },
    UnknownFunction(String),
    UndefinedRegister { function: String, register: u32 },
    MissingParameter { function: String, index: u32 },
    InvalidBlock { function: String, block: usize },
    StackOverflow,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trap::DivisionByZero { function } => write!(f, "division by zero in '{}'", function),
            Trap::UnknownFunction(name) => write!(f, "call to unknown function '{}'", name),
            Trap::UndefinedRegister { function, register } => {
                write!(f, "read of undefined register %{} in '{}'", register, function)
            }
            Trap::MissingParameter { function, index } => {
                write!(f, "missing parameter {} in '{}'", index, function)
            }
            Trap::InvalidBlock { function, block } => {
                write!(f, "control reached invalid block {} in '{}'", block, function)
            }
            Trap::StackOverflow => write!(f, "call depth exceeded {}", MAX_CALL_DEPTH),
        }
    }
}

/// Interpreter over one image, with trampolines already resolved
pub struct Machine<'i, W: Write> {
    functions: HashMap<&'i str, &'i Function>,
    trampoline_targets: HashMap<&'i str, &'i str>,
    out: W,
}

impl<'i, W: Write> Machine<'i, W> {
    pub fn new(image: &'i Image, selector: &Selector, out: W) -> Self {
        let functions = image
            .functions
            .iter()
            .filter(|f| !f.is_declaration())
            .map(|f| (f.name.as_str(), f))
            .collect();

        let trampoline_targets = image
            .trampolines
            .iter()
            .map(|trampoline| {
                let target = trampoline
                    .mutants
                    .iter()
                    .find(|mutant| selector.is_active(&mutant.selector))
                    .map(|mutant| mutant.function.as_str())
                    .unwrap_or(trampoline.original.as_str());
                (trampoline.function.as_str(), target)
            })
            .collect();

        Self {
            functions,
            trampoline_targets,
            out,
        }
    }

    /// Function a trampoline dispatches to in this process
    pub fn resolved_target(&self, trampoline: &str) -> Option<&str> {
        self.trampoline_targets.get(trampoline).copied()
    }

    pub fn run_main(&mut self, args: &[i64]) -> std::result::Result<i64, Trap> {
        let value = self.call("main", args, 0);
        let _ = self.out.flush();
        value
    }

    pub fn call(&mut self, name: &str, args: &[i64], depth: usize) -> std::result::Result<i64, Trap> {
        if depth >= MAX_CALL_DEPTH {
            return Err(Trap::StackOverflow);
        }
        let function = *self
            .functions
            .get(name)
            .ok_or_else(|| Trap::UnknownFunction(name.to_string()))?;

        let read = |value: Value, registers: &[Option<i64>]| -> std::result::Result<i64, Trap> {
            match value {
                Value::Const(c) => Ok(c),
                Value::Param(index) => {
                    args.get(index as usize)
                        .copied()
                        .ok_or_else(|| Trap::MissingParameter {
                            function: function.name.clone(),
                            index,
                        })
                }
                Value::Reg(reg) => registers
                    .get(reg.0 as usize)
                    .copied()
                    .flatten()
                    .ok_or_else(|| Trap::UndefinedRegister {
                        function: function.name.clone(),
                        register: reg.0,
                    }),
            }
        };

        let mut registers: Vec<Option<i64>> = Vec::new();
        let mut block = 0;
        loop {
            let instructions = &function
                .blocks
                .get(block)
                .ok_or_else(|| Trap::InvalidBlock {
                    function: function.name.clone(),
                    block,
                })?
                .instructions;

            let mut next_block = None;
            for instruction in instructions {
                match &instruction.kind {
                    InstructionKind::Binary { dst, op, lhs, rhs } => {
                        let lhs = read(*lhs, &registers)?;
                        let rhs = read(*rhs, &registers)?;
                        let value = op.evaluate(lhs, rhs).ok_or_else(|| Trap::DivisionByZero {
                            function: function.name.clone(),
                        })?;
                        write_register(&mut registers, dst.0, value);
                    }
                    InstructionKind::Call {
                        dst,
                        callee,
                        args: operands,
                    } => {
                        let values = operands
                            .iter()
                            .map(|a| read(*a, &registers))
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        let value = self.call(callee, &values, depth + 1)?;
                        if let Some(dst) = dst {
                            write_register(&mut registers, dst.0, value);
                        }
                    }
                    InstructionKind::Dispatch {
                        dst,
                        trampoline,
                        args: operands,
                    } => {
                        let target = self
                            .resolved_target(trampoline)
                            .ok_or_else(|| Trap::UnknownFunction(trampoline.clone()))?
                            .to_string();
                        let values = operands
                            .iter()
                            .map(|a| read(*a, &registers))
                            .collect::<std::result::Result<Vec<_>, _>>()?;
                        let value = self.call(&target, &values, depth + 1)?;
                        write_register(&mut registers, dst.0, value);
                    }
                    InstructionKind::Print { value } => {
                        let value = read(*value, &registers)?;
                        let _ = writeln!(self.out, "{}", value);
                    }
                    InstructionKind::Jump { target } => {
                        next_block = Some(*target);
                        break;
                    }
                    InstructionKind::Branch {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        let taken = if read(*cond, &registers)? != 0 {
                            *then_block
                        } else {
                            *else_block
                        };
                        next_block = Some(taken);
                        break;
                    }
                    InstructionKind::Return { value } => return read(*value, &registers),
                }
            }

            // falling off the end of a block without a terminator
            block = next_block.ok_or_else(|| Trap::InvalidBlock {
                function: function.name.clone(),
                block,
            })?;
        }
    }
}

/// Process exit status for a value returned from `main`
///
/// Only the low byte reaches the parent, so a nonzero value whose low byte is
/// zero still maps to a failing status.
pub fn exit_status(code: i64) -> i32 {
    match (code & 0xff) as i32 {
        0 if code != 0 => 1,
        status => status,
    }
}

fn write_register(registers: &mut Vec<Option<i64>>, index: u32, value: i64) {
    let index = index as usize;
    if registers.len() <= index {
        registers.resize(index + 1, None);
    }
    registers[index] = Some(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, FunctionBuilder, TrampolineTarget};
    use pretty_assertions::assert_eq;

    fn sub(name: &str, op: BinaryOp) -> Function {
        let mut builder = FunctionBuilder::new(name, 2);
        let value = builder.binary(op, Value::Param(0), Value::Param(1));
        builder.ret(value);
        builder.build()
    }

    fn main_calling_sub() -> Function {
        let mut builder = FunctionBuilder::new("main", 0);
        let value = builder.call("sub", vec![Value::Const(2), Value::Const(2)]);
        builder.print(value);
        builder.ret(value);
        builder.build()
    }

    fn trampolined_image() -> Image {
        let mut stub = FunctionBuilder::new("sub", 2);
        let value = stub.dispatch("sub", vec![Value::Param(0), Value::Param(1)]);
        stub.ret(value);
        Image {
            functions: vec![
                main_calling_sub(),
                stub.build(),
                sub("sub.original", BinaryOp::Sub),
                sub("sub.mutant", BinaryOp::Add),
            ],
            trampolines: vec![Trampoline {
                function: "sub".to_string(),
                original: "sub.original".to_string(),
                mutants: vec![TrampolineTarget {
                    selector: "MUTANT_sub".to_string(),
                    function: "sub.mutant".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn test_without_selector_runs_original() {
        let image = trampolined_image();
        let mut out = Vec::new();
        let mut machine = Machine::new(&image, &Selector::default(), &mut out);
        assert_eq!(machine.resolved_target("sub"), Some("sub.original"));
        assert_eq!(machine.run_main(&[]), Ok(0));
        assert_eq!(String::from_utf8(out).unwrap(), "0\n");
    }

    #[test]
    fn test_selector_activates_mutant() {
        let image = trampolined_image();
        let selector = Selector::from_keys(vec!["MUTANT_sub".to_string()]);
        let mut machine = Machine::new(&image, &selector, Vec::new());
        assert_eq!(machine.run_main(&[]), Ok(4));
    }

    #[test]
    fn test_only_the_selected_mutant_is_active() {
        let mut stub = FunctionBuilder::new("twin", 2);
        let value = stub.dispatch("twin", vec![Value::Param(0), Value::Param(1)]);
        stub.ret(value);

        let mut image = trampolined_image();
        image.functions.extend([
            stub.build(),
            sub("twin.original", BinaryOp::Sub),
            sub("twin.mutant", BinaryOp::Add),
        ]);
        image.trampolines.push(Trampoline {
            function: "twin".to_string(),
            original: "twin.original".to_string(),
            mutants: vec![TrampolineTarget {
                selector: "MUTANT_twin".to_string(),
                function: "twin.mutant".to_string(),
            }],
        });

        let selector = Selector::from_keys(vec!["MUTANT_twin".to_string()]);
        let machine = Machine::new(&image, &selector, Vec::new());
        assert_eq!(machine.resolved_target("sub"), Some("sub.original"));
        assert_eq!(machine.resolved_target("twin"), Some("twin.mutant"));
    }

    #[test]
    fn test_exit_status_keeps_failures_nonzero() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(256), 1);
        assert_eq!(exit_status(-256), 1);
        assert_eq!(exit_status(257), 1);
        assert_eq!(exit_status(-1), 255);
    }

    #[test]
    fn test_branches_select_a_block() {
        let mut builder = FunctionBuilder::new("main", 1);
        let then_block = builder.block();
        let else_block = builder.block();
        let positive = builder.binary(BinaryOp::Gt, Value::Param(0), Value::Const(0));
        builder.branch(positive, then_block, else_block);
        builder.switch_to(then_block).ret(Value::Const(1));
        builder.switch_to(else_block);
        builder.call_void("missing", vec![]);
        builder.ret(Value::Const(2));

        let image = Image {
            functions: vec![builder.build()],
            trampolines: Vec::new(),
        };
        let mut machine = Machine::new(&image, &Selector::default(), Vec::new());
        assert_eq!(machine.run_main(&[5]), Ok(1));
        assert_eq!(
            machine.run_main(&[0]),
            Err(Trap::UnknownFunction("missing".to_string()))
        );
    }

    #[test]
    fn test_falling_off_a_block_traps() {
        let mut builder = FunctionBuilder::new("main", 0);
        builder.print(Value::Const(1));
        let image = Image {
            functions: vec![builder.build()],
            trampolines: Vec::new(),
        };
        let mut machine = Machine::new(&image, &Selector::default(), Vec::new());
        assert!(matches!(machine.run_main(&[]), Err(Trap::InvalidBlock { block: 0, .. })));
    }

    #[test]
    fn test_division_by_zero_traps() {
        let image = Image {
            functions: vec![{
                let mut builder = FunctionBuilder::new("main", 0);
                let value = builder.binary(BinaryOp::Div, Value::Const(1), Value::Const(0));
                builder.ret(value);
                builder.build()
            }],
            trampolines: Vec::new(),
        };
        let mut machine = Machine::new(&image, &Selector::default(), Vec::new());
        assert!(matches!(machine.run_main(&[]), Err(Trap::DivisionByZero { .. })));
    }

    #[test]
    fn test_unbounded_recursion_overflows() {
        let mut builder = FunctionBuilder::new("main", 0);
        let value = builder.call("main", vec![]);
        builder.ret(value);
        let image = Image {
            functions: vec![builder.build()],
            trampolines: Vec::new(),
        };
        let mut machine = Machine::new(&image, &Selector::default(), Vec::new());
        assert_eq!(machine.run_main(&[]), Err(Trap::StackOverflow));
    }
}
