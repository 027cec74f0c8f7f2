use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::{MutationError, Result};
use crate::ir::{InstructionKind, Module};
use crate::runtime::Image;

/// Resolves symbols across object files and emits a runnable launcher
#[derive(Debug, Clone)]
pub struct Linker {
    output_dir: PathBuf,
    runtime: PathBuf,
}

impl Linker {
    pub fn new(output_dir: impl Into<PathBuf>, runtime: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            runtime: runtime.into(),
        }
    }

    /// Link `objects` into `<output_dir>/<output_name>` and return its path
    pub fn link(&self, objects: &[PathBuf], output_name: &str) -> Result<PathBuf> {
        let modules = objects
            .iter()
            .map(|path| Module::load(path).map_err(|e| link_error(e.to_string())))
            .collect::<Result<Vec<_>>>()?;
        let image = resolve(modules)?;

        std::fs::create_dir_all(&self.output_dir)?;
        let image_path = self.output_dir.join(format!("{}.image.json", output_name));
        image.save(&image_path)?;

        let executable = self.output_dir.join(output_name);
        write_launcher(&executable, &self.runtime, &image_path)?;
        Ok(executable)
    }
}

fn link_error(reason: impl Into<String>) -> MutationError {
    MutationError::LinkError {
        reason: reason.into(),
    }
}

fn resolve(modules: Vec<Module>) -> Result<Image> {
    let mut image = Image::default();
    let mut defined: HashMap<String, String> = HashMap::new();

    for module in modules {
        for function in module.functions {
            if function.is_declaration() {
                continue;
            }
            if let Some(previous) = defined.insert(function.name.clone(), module.name.clone()) {
                return Err(link_error(format!(
                    "duplicate symbol '{}' in '{}' and '{}'",
                    function.name, previous, module.name
                )));
            }
            image.functions.push(function);
        }
        image.trampolines.extend(module.trampolines);
    }

    let mut trampolines = HashSet::new();
    for trampoline in &image.trampolines {
        if !trampolines.insert(trampoline.function.as_str()) {
            return Err(link_error(format!(
                "duplicate trampoline for '{}'",
                trampoline.function
            )));
        }
    }

    for function in &image.functions {
        for (_, instruction) in function.instructions() {
            match &instruction.kind {
                InstructionKind::Call { callee, .. } if !defined.contains_key(callee) => {
                    return Err(link_error(format!(
                        "undefined symbol '{}' referenced from '{}'",
                        callee, function.name
                    )));
                }
                InstructionKind::Dispatch { trampoline, .. }
                    if !trampolines.contains(trampoline.as_str()) =>
                {
                    return Err(link_error(format!(
                        "undefined trampoline '{}' referenced from '{}'",
                        trampoline, function.name
                    )));
                }
                _ => {}
            }
        }
    }

    if !defined.contains_key("main") {
        return Err(link_error("undefined symbol 'main'"));
    }
    Ok(image)
}

fn shell_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

fn write_launcher(executable: &Path, runtime: &Path, image: &Path) -> Result<()> {
    let script = format!(
        "#!/bin/sh\nexec {} exec-image {} \"$@\"\n",
        shell_quote(runtime),
        shell_quote(image)
    );
    std::fs::write(executable, script)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(executable, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, FunctionBuilder, Value};

    fn returning(name: &str, value: i64) -> Function {
        let mut builder = FunctionBuilder::new(name, 0);
        builder.ret(Value::Const(value));
        builder.build()
    }

    fn object(dir: &Path, module: Module) -> PathBuf {
        let path = dir.join(format!("{}.o.json", module.name));
        module.save(&path).unwrap();
        path
    }

    #[test]
    fn test_link_writes_launcher_and_image() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = FunctionBuilder::new("main", 0);
        let value = builder.call("answer", vec![]);
        builder.ret(value);
        let main = Module::new("main", "main.c").with_function(builder.build());
        let mut declaration = returning("answer", 0);
        declaration.strip_body();
        let main = main.with_function(declaration);
        let answer = Module::new("answer", "answer.c").with_function(returning("answer", 42));

        let objects = vec![object(dir.path(), main), object(dir.path(), answer)];
        let linker = Linker::new(dir.path().join("out"), "/opt/runner");
        let executable = linker.link(&objects, "program").unwrap();

        let script = std::fs::read_to_string(&executable).unwrap();
        assert!(script.starts_with("#!/bin/sh\nexec '/opt/runner' exec-image '"));
        assert!(script.contains("program.image.json"));

        let image = Image::load(&dir.path().join("out/program.image.json")).unwrap();
        assert_eq!(image.functions.len(), 2);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&executable).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_duplicate_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let objects = vec![
            object(dir.path(), Module::new("a", "a.c").with_function(returning("main", 0))),
            object(dir.path(), Module::new("b", "b.c").with_function(returning("main", 1))),
        ];
        let error = Linker::new(dir.path(), "/bin/true")
            .link(&objects, "program")
            .unwrap_err()
            .to_string();
        assert!(error.contains("duplicate symbol 'main'"), "{}", error);
    }

    #[test]
    fn test_undefined_symbol() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = FunctionBuilder::new("main", 0);
        builder.call_void("missing", vec![]);
        builder.ret(Value::Const(0));
        let objects = vec![object(
            dir.path(),
            Module::new("a", "a.c").with_function(builder.build()),
        )];
        let error = Linker::new(dir.path(), "/bin/true")
            .link(&objects, "program")
            .unwrap_err()
            .to_string();
        assert!(error.contains("undefined symbol 'missing'"), "{}", error);
    }

    #[test]
    fn test_missing_main() {
        let dir = tempfile::tempdir().unwrap();
        let objects = vec![object(
            dir.path(),
            Module::new("a", "a.c").with_function(returning("helper", 0)),
        )];
        let result = Linker::new(dir.path(), "/bin/true").link(&objects, "program");
        assert!(matches!(result, Err(MutationError::LinkError { .. })));
    }

    #[test]
    fn test_quoting() {
        assert_eq!(shell_quote(Path::new("/a b/it's")), r"'/a b/it'\''s'");
    }
}
