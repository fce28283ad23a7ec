//! IR optimization passes.
//!
//! Passes work function-at-a-time and report whether they changed
//! anything; the manager reruns the pipeline until it reaches a fixed
//! point. Both passes are local: constant folding tracks known-constant
//! temporaries within each block, and dead-code elimination drops unused
//! pure instructions and unreachable blocks.

use std::collections::{HashMap, HashSet};

use crate::ir::{BinOp, Block, Function, Inst, Module, Terminator, Value};

/// A rewrite over one function.
pub trait Pass {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass. Returns `true` when the function was changed.
    fn run(&self, function: &mut Function) -> bool;
}

/// Runs a pipeline of passes over every function until nothing changes.
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
}

// Guard against a pass pair that keeps toggling state.
const MAX_ITERATIONS: usize = 10;

impl PassManager {
    /// Create an empty pass manager.
    pub fn new() -> Self {
        Self { passes: Vec::new() }
    }

    /// The standard pipeline: constant folding, then dead-code elimination.
    pub fn standard() -> Self {
        let mut manager = Self::new();
        manager.add_pass(Box::new(ConstantFolding));
        manager.add_pass(Box::new(DeadCodeElimination));
        manager
    }

    /// Append a pass to the pipeline.
    pub fn add_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Optimize every function in the module.
    pub fn run(&self, module: &mut Module) {
        for function in &mut module.functions {
            for _ in 0..MAX_ITERATIONS {
                let mut changed = false;
                for pass in &self.passes {
                    changed |= pass.run(function);
                }
                if !changed {
                    break;
                }
            }
        }
    }
}

impl Default for PassManager {
    fn default() -> Self {
        Self::standard()
    }
}

/// Per-block constant propagation and folding.
///
/// Temporaries bound to constants are substituted into later operand
/// positions, binary operations on two constants are computed at compile
/// time, and conditional branches on a constant collapse to plain
/// branches. Division by a constant zero is left alone so the runtime
/// trap is preserved.
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&self, function: &mut Function) -> bool {
        let mut changed = false;
        for block in &mut function.blocks {
            changed |= fold_block(block);
        }
        changed
    }
}

fn fold_block(block: &mut Block) -> bool {
    let mut consts: HashMap<String, i32> = HashMap::new();
    let mut changed = false;

    let resolve = |value: &mut Value, consts: &HashMap<String, i32>, changed: &mut bool| {
        if let Value::Var(name) = value {
            if let Some(known) = consts.get(name.as_str()) {
                *value = Value::Const(*known);
                *changed = true;
            }
        }
    };

    for inst in &mut block.instructions {
        match inst {
            Inst::Copy { value, .. } => resolve(value, &consts, &mut changed),
            Inst::BinOp { left, right, .. } => {
                resolve(left, &consts, &mut changed);
                resolve(right, &consts, &mut changed);
            }
            Inst::Store { value, .. } | Inst::StoreGlobal { value, .. } => {
                resolve(value, &consts, &mut changed)
            }
            Inst::Call { args, .. } => {
                for arg in args {
                    resolve(arg, &consts, &mut changed);
                }
            }
            Inst::Load { .. } | Inst::LoadGlobal { .. } => {}
        }

        let folded = match inst {
            Inst::BinOp {
                dest,
                op,
                left: Value::Const(left),
                right: Value::Const(right),
            } => eval(*op, *left, *right).map(|result| (dest.clone(), result)),
            Inst::Copy {
                dest,
                value: Value::Const(value),
            } => {
                consts.insert(dest.clone(), *value);
                None
            }
            _ => None,
        };
        if let Some((dest, result)) = folded {
            consts.insert(dest.clone(), result);
            *inst = Inst::Copy {
                dest,
                value: Value::Const(result),
            };
            changed = true;
        }
    }

    match &mut block.terminator {
        Terminator::Return(value) => resolve(value, &consts, &mut changed),
        Terminator::CondBranch { cond, .. } => resolve(cond, &consts, &mut changed),
        Terminator::Branch { .. } | Terminator::Unreachable => {}
    }

    let folded_target = match &block.terminator {
        Terminator::CondBranch {
            cond: Value::Const(cond),
            then_block,
            else_block,
        } => Some(if *cond != 0 {
            then_block.clone()
        } else {
            else_block.clone()
        }),
        _ => None,
    };
    if let Some(target) = folded_target {
        block.terminator = Terminator::Branch { target };
        changed = true;
    }

    changed
}

/// Two's-complement arithmetic at scalar width; comparisons yield 0 or 1.
fn eval(op: BinOp, left: i32, right: i32) -> Option<i32> {
    Some(match op {
        BinOp::Add => left.wrapping_add(right),
        BinOp::Sub => left.wrapping_sub(right),
        BinOp::Mul => left.wrapping_mul(right),
        BinOp::Div => {
            if right == 0 {
                return None;
            }
            left.wrapping_div(right)
        }
        BinOp::Lt => (left < right) as i32,
        BinOp::Gt => (left > right) as i32,
        BinOp::Le => (left <= right) as i32,
        BinOp::Ge => (left >= right) as i32,
        BinOp::Eq => (left == right) as i32,
        BinOp::Ne => (left != right) as i32,
    })
}

/// Removes instructions whose result is never read and blocks that cannot
/// be reached from the entry block.
///
/// Calls are kept for their side effects even when the result is unused;
/// only the destination binding is dropped. Stores are always kept.
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&self, function: &mut Function) -> bool {
        let mut changed = false;

        loop {
            let used = used_temps(function);
            let mut removed = false;

            for block in &mut function.blocks {
                block.instructions.retain_mut(|inst| match inst {
                    Inst::Copy { dest, .. }
                    | Inst::BinOp { dest, .. }
                    | Inst::Load { dest, .. }
                    | Inst::LoadGlobal { dest, .. } => {
                        let keep = used.contains(dest.as_str());
                        if !keep {
                            removed = true;
                        }
                        keep
                    }
                    Inst::Call { dest, .. } => {
                        if let Some(name) = dest {
                            if !used.contains(name.as_str()) {
                                *dest = None;
                                removed = true;
                            }
                        }
                        true
                    }
                    Inst::Store { .. } | Inst::StoreGlobal { .. } => true,
                });
            }

            if !removed {
                break;
            }
            changed = true;
        }

        changed |= remove_unreachable_blocks(function);
        changed
    }
}

fn used_temps(function: &Function) -> HashSet<String> {
    let mut used = HashSet::new();
    let mut mark = |value: &Value| {
        if let Value::Var(name) = value {
            used.insert(name.clone());
        }
    };

    for block in &function.blocks {
        for inst in &block.instructions {
            match inst {
                Inst::Copy { value, .. }
                | Inst::Store { value, .. }
                | Inst::StoreGlobal { value, .. } => mark(value),
                Inst::BinOp { left, right, .. } => {
                    mark(left);
                    mark(right);
                }
                Inst::Call { args, .. } => args.iter().for_each(&mut mark),
                Inst::Load { .. } | Inst::LoadGlobal { .. } => {}
            }
        }
        match &block.terminator {
            Terminator::Return(value) => mark(value),
            Terminator::CondBranch { cond, .. } => mark(cond),
            Terminator::Branch { .. } | Terminator::Unreachable => {}
        }
    }

    used
}

fn remove_unreachable_blocks(function: &mut Function) -> bool {
    if function.blocks.is_empty() {
        return false;
    }

    let mut reachable: HashSet<String> = HashSet::new();
    let mut worklist = vec![function.blocks[0].label.clone()];
    while let Some(label) = worklist.pop() {
        if !reachable.insert(label.clone()) {
            continue;
        }
        if let Some(block) = function.block(&label) {
            match &block.terminator {
                Terminator::Branch { target } => worklist.push(target.clone()),
                Terminator::CondBranch {
                    then_block,
                    else_block,
                    ..
                } => {
                    worklist.push(then_block.clone());
                    worklist.push(else_block.clone());
                }
                Terminator::Return(_) | Terminator::Unreachable => {}
            }
        }
    }

    let before = function.blocks.len();
    function
        .blocks
        .retain(|block| reachable.contains(block.label.as_str()));
    function.blocks.len() != before
}
