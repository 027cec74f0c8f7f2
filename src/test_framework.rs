//! Tests discovered in a program

use crate::execution::ExecutionResult;
use crate::program::Program;

/// A named entry point of the test suite
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub name: String,
    /// Outcome of the sanity check run, once it has happened
    pub execution_result: Option<ExecutionResult>,
}

impl Test {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            execution_result: None,
        }
    }

    pub fn set_execution_result(&mut self, result: ExecutionResult) {
        self.execution_result = Some(result);
    }
}

pub trait TestFinder: Send + Sync {
    fn find_tests(&self, program: &Program) -> Vec<Test>;
}

/// Treats the program's `main` as its single test
#[derive(Debug, Default, Clone, Copy)]
pub struct MainTestFinder;

impl TestFinder for MainTestFinder {
    fn find_tests(&self, program: &Program) -> Vec<Test> {
        if program.has_function("main") {
            vec![Test::new("main")]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FunctionBuilder, Module, Value};

    #[test]
    fn test_main_is_the_only_test() {
        let mut builder = FunctionBuilder::new("main", 0);
        builder.ret(Value::Const(0));
        let program = Program::new(vec![Module::new("m", "m.c").with_function(builder.build())]);

        let tests = MainTestFinder.find_tests(&program);
        assert_eq!(tests, vec![Test::new("main")]);
    }

    #[test]
    fn test_no_main_no_tests() {
        let program = Program::new(vec![Module::new("m", "m.c")]);
        assert!(MainTestFinder.find_tests(&program).is_empty());
    }
}
