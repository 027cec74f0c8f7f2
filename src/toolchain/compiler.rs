use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{MutationError, Result};
use crate::ir::{stable_hash, Function, InstructionKind, Module};

/// Verifies a module and writes it out as an object file
#[derive(Debug, Clone)]
pub struct Compiler {
    output_dir: PathBuf,
}

impl Compiler {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Compile a module of the program under test
    pub fn compile(&self, module: &Module) -> Result<PathBuf> {
        self.emit(module, ObjectKind::Program)
    }

    /// Compile a dynamic library module; its objects never replace program objects
    pub fn compile_library(&self, module: &Module) -> Result<PathBuf> {
        self.emit(module, ObjectKind::Library)
    }

    fn emit(&self, module: &Module, kind: ObjectKind) -> Result<PathBuf> {
        verify(module).map_err(|error| MutationError::CompileError {
            module: module.name.clone(),
            error,
        })?;

        std::fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(object_file_name(module, kind));
        module.save(&path)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ObjectKind {
    Program,
    Library,
}

/// Unique per (kind, name, source file) so same-named units don't collide
fn object_file_name(module: &Module, kind: ObjectKind) -> String {
    let sanitized: String = module
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let prefix = match kind {
        ObjectKind::Program => "",
        ObjectKind::Library => "lib-",
    };
    format!(
        "{}{}-{:016x}.o.json",
        prefix,
        sanitized,
        stable_hash(&format!("{}\0{}", module.name, module.source_file))
    )
}

fn verify(module: &Module) -> std::result::Result<(), String> {
    let mut names = HashSet::new();
    for function in &module.functions {
        if !names.insert(function.name.as_str()) {
            return Err(format!("function '{}' is defined twice", function.name));
        }
        verify_function(module, function)?;
    }

    for trampoline in &module.trampolines {
        let targets = std::iter::once(&trampoline.original)
            .chain(trampoline.mutants.iter().map(|m| &m.function));
        for target in targets {
            if module.function(target).map_or(true, Function::is_declaration) {
                return Err(format!(
                    "trampoline '{}' targets '{}', which has no body",
                    trampoline.function, target
                ));
            }
        }
    }
    Ok(())
}

fn verify_function(module: &Module, function: &Function) -> std::result::Result<(), String> {
    let block_count = function.blocks.len();
    for (index, block) in function.blocks.iter().enumerate() {
        let terminated = matches!(
            block.instructions.last().map(|i| &i.kind),
            Some(InstructionKind::Jump { .. })
                | Some(InstructionKind::Branch { .. })
                | Some(InstructionKind::Return { .. })
        );
        if !terminated {
            return Err(format!(
                "block {} of '{}' has no terminator",
                index, function.name
            ));
        }

        for instruction in &block.instructions {
            match &instruction.kind {
                InstructionKind::Jump { target } if *target >= block_count => {
                    return Err(format!(
                        "'{}' jumps to missing block {}",
                        function.name, target
                    ));
                }
                InstructionKind::Branch {
                    then_block,
                    else_block,
                    ..
                } if *then_block >= block_count || *else_block >= block_count => {
                    return Err(format!("'{}' branches to a missing block", function.name));
                }
                InstructionKind::Dispatch { trampoline, .. }
                    if !module.trampolines.iter().any(|t| &t.function == trampoline) =>
                {
                    return Err(format!(
                        "'{}' dispatches through unknown trampoline '{}'",
                        function.name, trampoline
                    ));
                }
                _ => {}
            }
        }
    }
    Ok(())
}
