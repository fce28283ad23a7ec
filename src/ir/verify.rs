//! IR well-formedness checks.
//!
//! A function is checked right after it is lowered; the whole module is
//! checked once generation finishes. Any failure is a fatal internal error:
//! the pipeline aborts and no artifact is written.

use std::collections::HashSet;

use super::*;
use crate::CompileError;

/// Check a single finished function.
pub fn verify_function(function: &Function) -> Result<(), CompileError> {
    if function.blocks.is_empty() {
        return Err(malformed(function, "has no basic blocks"));
    }

    let mut labels = HashSet::new();
    for block in &function.blocks {
        if !labels.insert(block.label.as_str()) {
            return Err(malformed(
                function,
                &format!("duplicate block label '{}'", block.label),
            ));
        }
    }

    let mut locals = HashSet::new();
    for local in &function.locals {
        if !locals.insert(local.as_str()) {
            return Err(malformed(
                function,
                &format!("duplicate local slot '{}'", local),
            ));
        }
    }
    for param in &function.params {
        if !locals.contains(param.as_str()) {
            return Err(malformed(
                function,
                &format!("parameter '{}' has no slot", param),
            ));
        }
    }

    let temps: HashSet<&str> = function
        .blocks
        .iter()
        .flat_map(|block| block.instructions.iter())
        .filter_map(inst_dest)
        .collect();

    for block in &function.blocks {
        for inst in &block.instructions {
            verify_inst(function, block, inst, &locals, &temps)?;
        }
        verify_terminator(function, block, &labels, &temps)?;
    }

    Ok(())
}

/// Check the whole module: name uniqueness, every function, and every call
/// site against the functions the module actually defines.
pub fn verify_module(module: &Module) -> Result<(), CompileError> {
    let mut names = HashSet::new();
    for global in &module.globals {
        if !names.insert(global.name.as_str()) {
            return Err(CompileError::InvalidIr(format!(
                "duplicate global '{}'",
                global.name
            )));
        }
    }
    for function in &module.functions {
        if !names.insert(function.name.as_str()) {
            return Err(CompileError::InvalidIr(format!(
                "name '{}' defined more than once",
                function.name
            )));
        }
    }

    for function in &module.functions {
        verify_function(function)?;

        for block in &function.blocks {
            for inst in &block.instructions {
                if let Inst::Call { func, args, .. } = inst {
                    verify_call(module, function, func, args)?;
                }
            }
        }
    }

    Ok(())
}

fn verify_call(
    module: &Module,
    caller: &Function,
    callee: &str,
    args: &[Value],
) -> Result<(), CompileError> {
    if callee == PRINTF {
        if args.len() != 2 || !matches!(args.first(), Some(Value::Str(_))) {
            return Err(malformed(
                caller,
                "printf call must take a format string and one scalar",
            ));
        }
        return Ok(());
    }

    match module.function(callee) {
        Some(target) if target.params.len() == args.len() => Ok(()),
        Some(target) => Err(malformed(
            caller,
            &format!(
                "call to '{}' passes {} arguments, expected {}",
                callee,
                args.len(),
                target.params.len()
            ),
        )),
        None => Err(malformed(
            caller,
            &format!("call to undefined function '{}'", callee),
        )),
    }
}

fn verify_inst(
    function: &Function,
    block: &Block,
    inst: &Inst,
    locals: &HashSet<&str>,
    temps: &HashSet<&str>,
) -> Result<(), CompileError> {
    let check_value = |value: &Value, allow_str: bool| -> Result<(), CompileError> {
        match value {
            Value::Var(name) if !temps.contains(name.as_str()) => Err(in_block(
                function,
                block,
                &format!("use of undefined temporary '{}'", name),
            )),
            Value::Str(_) if !allow_str => Err(in_block(
                function,
                block,
                "string value outside a printf call",
            )),
            _ => Ok(()),
        }
    };

    match inst {
        Inst::Copy { value, .. } => check_value(value, false),
        Inst::BinOp { left, right, .. } => {
            check_value(left, false)?;
            check_value(right, false)
        }
        Inst::Load { slot, .. } | Inst::Store { slot, value: _ } => {
            if !locals.contains(slot.as_str()) {
                return Err(in_block(
                    function,
                    block,
                    &format!("reference to unknown slot '{}'", slot),
                ));
            }
            if let Inst::Store { value, .. } = inst {
                check_value(value, false)?;
            }
            Ok(())
        }
        Inst::LoadGlobal { .. } => Ok(()),
        Inst::StoreGlobal { value, .. } => check_value(value, false),
        Inst::Call { args, .. } => {
            for arg in args {
                check_value(arg, true)?;
            }
            Ok(())
        }
    }
}

fn verify_terminator(
    function: &Function,
    block: &Block,
    labels: &HashSet<&str>,
    temps: &HashSet<&str>,
) -> Result<(), CompileError> {
    let check_target = |target: &str| -> Result<(), CompileError> {
        if labels.contains(target) {
            Ok(())
        } else {
            Err(in_block(
                function,
                block,
                &format!("branch to unknown block '{}'", target),
            ))
        }
    };
    let check_value = |value: &Value| -> Result<(), CompileError> {
        match value {
            Value::Var(name) if !temps.contains(name.as_str()) => Err(in_block(
                function,
                block,
                &format!("use of undefined temporary '{}'", name),
            )),
            Value::Str(_) => Err(in_block(function, block, "string value in terminator")),
            _ => Ok(()),
        }
    };

    match &block.terminator {
        Terminator::Return(value) => check_value(value),
        Terminator::Branch { target } => check_target(target),
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => {
            check_value(cond)?;
            check_target(then_block)?;
            check_target(else_block)
        }
        Terminator::Unreachable => Err(in_block(function, block, "block has no terminator")),
    }
}

fn inst_dest(inst: &Inst) -> Option<&str> {
    match inst {
        Inst::Copy { dest, .. }
        | Inst::BinOp { dest, .. }
        | Inst::Load { dest, .. }
        | Inst::LoadGlobal { dest, .. } => Some(dest),
        Inst::Call { dest, .. } => dest.as_deref(),
        Inst::Store { .. } | Inst::StoreGlobal { .. } => None,
    }
}

fn malformed(function: &Function, message: &str) -> CompileError {
    CompileError::InvalidIr(format!("function '{}' {}", function.name, message))
}

fn in_block(function: &Function, block: &Block, message: &str) -> CompileError {
    CompileError::InvalidIr(format!(
        "function '{}', block '{}': {}",
        function.name, block.label, message
    ))
}
