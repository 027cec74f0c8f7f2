//! IR mutators
//!
//! Each mutator finds the instructions it can rewrite and performs that rewrite
//! on a mutated clone. Mutators are selected by id or by group name.

use crate::error::{MutationError, Result};
use crate::ir::{BinaryOp, Function, InstructionKind};
use crate::mutation::{FunctionUnderTest, MutationPoint};

pub trait Mutator: Send + Sync {
    /// Stable id, used in reports and in mutant selector keys
    fn id(&self) -> &str;

    fn description(&self) -> String;

    /// Emit a point for every selected instruction this mutator matches
    fn find_mutation_points(
        &self,
        candidate: &FunctionUnderTest,
        function: &Function,
    ) -> Vec<MutationPoint>;

    /// Rewrite the instruction at `point.address` of the mutated clone
    fn apply(&self, point: &MutationPoint, function: &mut Function) -> Result<()>;
}

/// Replaces one binary operator with another
pub struct BinaryOperatorReplacement {
    id: &'static str,
    from: BinaryOp,
    to: BinaryOp,
}

impl BinaryOperatorReplacement {
    pub const fn new(id: &'static str, from: BinaryOp, to: BinaryOp) -> Self {
        Self { id, from, to }
    }
}

impl Mutator for BinaryOperatorReplacement {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> String {
        format!("Replaces {} with {}", self.from.symbol(), self.to.symbol())
    }

    fn find_mutation_points(
        &self,
        candidate: &FunctionUnderTest,
        function: &Function,
    ) -> Vec<MutationPoint> {
        candidate
            .selected_instructions
            .iter()
            .filter_map(|&address| {
                let instruction = function.instruction(address)?;
                match instruction.kind {
                    InstructionKind::Binary { op, .. } if op == self.from => Some(MutationPoint::new(
                        self.id,
                        candidate.function.clone(),
                        address,
                        instruction.location.clone(),
                        format!("Replaced {} with {}", self.from.symbol(), self.to.symbol()),
                    )),
                    _ => None,
                }
            })
            .collect()
    }

    fn apply(&self, point: &MutationPoint, function: &mut Function) -> Result<()> {
        if let Some(InstructionKind::Binary { op, .. }) =
            function.instruction_mut(point.address).map(|i| &mut i.kind)
        {
            if *op == self.from {
                *op = self.to;
                return Ok(());
            }
        }
        Err(MutationError::FailedToApply {
            mutation: point.user_identifier(),
            reason: format!(
                "no '{}' instruction at {} in '{}'",
                self.from.symbol(),
                point.address,
                function.name
            ),
        })
    }
}

/// Removes a call whose result is unused
pub struct RemoveVoidCall;

impl Mutator for RemoveVoidCall {
    fn id(&self) -> &str {
        "cxx_remove_void_call"
    }

    fn description(&self) -> String {
        "Removes calls to functions whose result is ignored".to_string()
    }

    fn find_mutation_points(
        &self,
        candidate: &FunctionUnderTest,
        function: &Function,
    ) -> Vec<MutationPoint> {
        candidate
            .selected_instructions
            .iter()
            .filter_map(|&address| {
                let instruction = function.instruction(address)?;
                match &instruction.kind {
                    InstructionKind::Call { dst: None, callee, .. } => Some(MutationPoint::new(
                        self.id(),
                        candidate.function.clone(),
                        address,
                        instruction.location.clone(),
                        format!("Removed the call to '{}'", callee),
                    )),
                    _ => None,
                }
            })
            .collect()
    }

    fn apply(&self, point: &MutationPoint, function: &mut Function) -> Result<()> {
        let matches = matches!(
            function.instruction(point.address).map(|i| &i.kind),
            Some(InstructionKind::Call { dst: None, .. })
        );
        if !matches {
            return Err(MutationError::FailedToApply {
                mutation: point.user_identifier(),
                reason: format!("no void call at {} in '{}'", point.address, function.name),
            });
        }
        function.blocks[point.address.block]
            .instructions
            .remove(point.address.index);
        Ok(())
    }
}

const ARITHMETIC: &[(&str, BinaryOp, BinaryOp)] = &[
    ("cxx_add_to_sub", BinaryOp::Add, BinaryOp::Sub),
    ("cxx_sub_to_add", BinaryOp::Sub, BinaryOp::Add),
    ("cxx_mul_to_div", BinaryOp::Mul, BinaryOp::Div),
    ("cxx_div_to_mul", BinaryOp::Div, BinaryOp::Mul),
    ("cxx_rem_to_div", BinaryOp::Rem, BinaryOp::Div),
];

const COMPARISON: &[(&str, BinaryOp, BinaryOp)] = &[
    ("cxx_eq_to_ne", BinaryOp::Eq, BinaryOp::Ne),
    ("cxx_ne_to_eq", BinaryOp::Ne, BinaryOp::Eq),
    ("cxx_lt_to_ge", BinaryOp::Lt, BinaryOp::Ge),
    ("cxx_gt_to_le", BinaryOp::Gt, BinaryOp::Le),
    ("cxx_le_to_gt", BinaryOp::Le, BinaryOp::Gt),
    ("cxx_ge_to_lt", BinaryOp::Ge, BinaryOp::Lt),
];

const BITWISE: &[(&str, BinaryOp, BinaryOp)] = &[
    ("cxx_and_to_or", BinaryOp::And, BinaryOp::Or),
    ("cxx_or_to_and", BinaryOp::Or, BinaryOp::And),
];

const GROUPS: &[&str] = &[
    "cxx_arithmetic",
    "cxx_comparison",
    "cxx_bitwise",
    "cxx_calls",
    "cxx_default",
];

fn group_members(group: &str) -> Option<Vec<&'static str>> {
    let ids = |table: &[(&'static str, BinaryOp, BinaryOp)]| {
        table.iter().map(|(id, _, _)| *id).collect::<Vec<_>>()
    };
    match group {
        "cxx_arithmetic" => Some(ids(ARITHMETIC)),
        "cxx_comparison" => Some(ids(COMPARISON)),
        "cxx_bitwise" => Some(ids(BITWISE)),
        "cxx_calls" => Some(vec!["cxx_remove_void_call"]),
        "cxx_default" => {
            let mut all = ids(ARITHMETIC);
            all.extend(ids(COMPARISON));
            all.extend(ids(BITWISE));
            all.push("cxx_remove_void_call");
            Some(all)
        }
        _ => None,
    }
}

fn single(id: &str) -> Option<Box<dyn Mutator>> {
    if id == "cxx_remove_void_call" {
        return Some(Box::new(RemoveVoidCall));
    }
    ARITHMETIC
        .iter()
        .chain(COMPARISON)
        .chain(BITWISE)
        .find(|(known, _, _)| *known == id)
        .map(|&(id, from, to)| Box::new(BinaryOperatorReplacement::new(id, from, to)) as Box<dyn Mutator>)
}

/// Every id and group name accepted by [`mutators_from_ids`]
pub fn available_ids() -> Vec<String> {
    ARITHMETIC
        .iter()
        .chain(COMPARISON)
        .chain(BITWISE)
        .map(|(id, _, _)| id.to_string())
        .chain(std::iter::once("cxx_remove_void_call".to_string()))
        .chain(GROUPS.iter().map(|g| g.to_string()))
        .collect()
}

/// Resolve mutator ids and groups; an empty list selects `cxx_default`
///
/// Duplicates are dropped, keeping the first occurrence.
pub fn mutators_from_ids(ids: &[String]) -> Result<Vec<Box<dyn Mutator>>> {
    let requested: Vec<String> = if ids.is_empty() {
        vec!["cxx_default".to_string()]
    } else {
        ids.to_vec()
    };

    let mut expanded: Vec<String> = Vec::new();
    for id in &requested {
        let members = match group_members(id) {
            Some(members) => members.into_iter().map(str::to_string).collect(),
            None => vec![id.clone()],
        };
        for member in members {
            if !expanded.contains(&member) {
                expanded.push(member);
            }
        }
    }

    expanded
        .iter()
        .map(|id| {
            single(id).ok_or_else(|| MutationError::UnknownMutator {
                id: id.clone(),
                available: available_ids(),
            })
        })
        .collect()
}
