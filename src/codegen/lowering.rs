//! AST to IR lowering.
//!
//! The lowering walk carries a stack of per-function contexts (the function
//! under construction plus its designated return block). Functions do not
//! nest in the language, so the stack is at most one deep below the
//! top-level walk, but the push/pop discipline is kept exact regardless.
//!
//! Name resolution follows a fixed precedence: a name that matches a
//! declared global binds to the global's storage; otherwise it binds to the
//! current function's local slot, creating the slot on first use. There is
//! no declaration statement in the language, so first use defines a local,
//! and a read before any write observes the slot's zero initialization.

use crate::ast::{self, AstNode};
use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
use crate::ir::{self, verify, Inst, Terminator, Value};
use crate::CompileError;

/// Slot holding the unified return value. The leading dot keeps the name
/// out of the source identifier namespace.
pub const RETURN_SLOT: &str = ".ret";

/// Lowers a program into an IR module.
pub struct Lowering {
    module: ModuleBuilder,
    contexts: Vec<FunctionCtx>,
}

/// State carried across one function's lowering.
struct FunctionCtx {
    builder: FunctionBuilder,
    return_block: String,
}

impl Lowering {
    /// Create a lowering context for a new module.
    pub fn new(module_name: &str) -> Self {
        Self {
            module: ModuleBuilder::new(module_name),
            contexts: Vec::new(),
        }
    }

    /// Lower a whole program. Globals are materialized first, in the order
    /// the collector produced them; the top-level sequence is then lowered
    /// as a statement, which dispatches to function-definition lowering for
    /// each `FunctionDef` and ignores each `GlobalVar`.
    pub fn lower_program(
        mut self,
        root: &AstNode,
        globals: &[ast::GlobalVar],
    ) -> Result<ir::Module, CompileError> {
        for global in globals {
            self.module.add_global(&global.name, global.value);
        }
        self.lower_stmt(root)?;
        Ok(self.module.build())
    }

    fn lower_stmt(&mut self, node: &AstNode) -> Result<(), CompileError> {
        match node {
            AstNode::Sequence { first, second } => {
                self.lower_stmt(first)?;
                self.lower_stmt(second)
            }

            AstNode::FunctionDef { name, params, body } => {
                self.lower_function_def(name, params, body)
            }

            // Globals were materialized up front; their declarations are
            // no-ops here.
            AstNode::GlobalVar { .. } => Ok(()),

            AstNode::Assignment { name, value } => {
                self.ensure_open_block();
                let value = self.lower_expr(value)?;
                if self.module.has_global(name) {
                    self.ctx_mut()?.builder.push(Inst::StoreGlobal {
                        name: name.clone(),
                        value,
                    });
                } else {
                    let ctx = self.ctx_mut()?;
                    ctx.builder.add_local(name);
                    ctx.builder.push(Inst::Store {
                        slot: name.clone(),
                        value,
                    });
                }
                Ok(())
            }

            AstNode::Return(value) => {
                self.ensure_open_block();
                if let Some(value) = value {
                    let value = self.lower_expr(value)?;
                    self.ctx_mut()?.builder.push(Inst::Store {
                        slot: RETURN_SLOT.to_string(),
                        value,
                    });
                }
                let ctx = self.ctx_mut()?;
                let target = ctx.return_block.clone();
                ctx.builder.terminate(Terminator::Branch { target });
                Ok(())
            }

            AstNode::While { condition, body } => {
                self.ensure_open_block();
                let ctx = self.ctx_mut()?;
                let cond_block = ctx.builder.create_block("loop");
                let body_block = ctx.builder.create_block("loopbody");
                let after_block = ctx.builder.create_block("afterloop");

                ctx.builder.terminate(Terminator::Branch {
                    target: cond_block.clone(),
                });
                ctx.builder.switch_to_block(&cond_block);
                let cond = self.lower_expr(condition)?;
                self.ctx_mut()?.builder.terminate(Terminator::CondBranch {
                    cond,
                    then_block: body_block.clone(),
                    else_block: after_block.clone(),
                });

                self.ctx_mut()?.builder.switch_to_block(&body_block);
                self.lower_stmt(body)?;
                let ctx = self.ctx_mut()?;
                ctx.builder.terminate(Terminator::Branch {
                    target: cond_block,
                });

                ctx.builder.switch_to_block(&after_block);
                Ok(())
            }

            AstNode::For {
                init,
                condition,
                increment,
                body,
            } => {
                self.ensure_open_block();
                self.lower_stmt(init)?;

                let ctx = self.ctx_mut()?;
                let cond_block = ctx.builder.create_block("forloop");
                let body_block = ctx.builder.create_block("forbody");
                let after_block = ctx.builder.create_block("afterfor");

                ctx.builder.terminate(Terminator::Branch {
                    target: cond_block.clone(),
                });
                ctx.builder.switch_to_block(&cond_block);
                let cond = self.lower_expr(condition)?;
                self.ctx_mut()?.builder.terminate(Terminator::CondBranch {
                    cond,
                    then_block: body_block.clone(),
                    else_block: after_block.clone(),
                });

                self.ctx_mut()?.builder.switch_to_block(&body_block);
                self.lower_stmt(body)?;
                self.lower_stmt(increment)?;
                let ctx = self.ctx_mut()?;
                ctx.builder.terminate(Terminator::Branch {
                    target: cond_block,
                });

                ctx.builder.switch_to_block(&after_block);
                Ok(())
            }

            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.ensure_open_block();
                let cond = self.lower_expr(condition)?;

                let ctx = self.ctx_mut()?;
                let then_block = ctx.builder.create_block("then");
                let else_block = else_branch
                    .as_ref()
                    .map(|_| ctx.builder.create_block("else"));
                let merge_block = ctx.builder.create_block("ifcont");

                ctx.builder.terminate(Terminator::CondBranch {
                    cond,
                    then_block: then_block.clone(),
                    else_block: else_block.clone().unwrap_or_else(|| merge_block.clone()),
                });

                self.ctx_mut()?.builder.switch_to_block(&then_block);
                self.lower_stmt(then_branch)?;
                // A branch that ended in `return` is already terminated;
                // `terminate` keeps the first terminator either way.
                self.ctx_mut()?.builder.terminate(Terminator::Branch {
                    target: merge_block.clone(),
                });

                if let (Some(else_branch), Some(else_block)) = (else_branch, else_block) {
                    self.ctx_mut()?.builder.switch_to_block(&else_block);
                    self.lower_stmt(else_branch)?;
                    self.ctx_mut()?.builder.terminate(Terminator::Branch {
                        target: merge_block.clone(),
                    });
                }

                self.ctx_mut()?.builder.switch_to_block(&merge_block);
                Ok(())
            }

            AstNode::Print(value) => {
                self.ensure_open_block();
                let value = self.lower_expr(value)?;
                self.ctx_mut()?.builder.push(Inst::Call {
                    dest: None,
                    func: ir::PRINTF.to_string(),
                    args: vec![Value::Str(ir::PRINT_FORMAT.to_string()), value],
                });
                Ok(())
            }

            // Expression used as a statement: lower it for its effects and
            // discard the value.
            _ => {
                self.ensure_open_block();
                self.lower_expr(node)?;
                Ok(())
            }
        }
    }

    fn lower_expr(&mut self, node: &AstNode) -> Result<Value, CompileError> {
        match node {
            AstNode::Number(value) => Ok(Value::Const(*value)),

            AstNode::Variable(name) => {
                if self.module.has_global(name) {
                    let ctx = self.ctx_mut()?;
                    let dest = ctx.builder.new_temp();
                    ctx.builder.push(Inst::LoadGlobal {
                        dest: dest.clone(),
                        name: name.clone(),
                    });
                    return Ok(Value::Var(dest));
                }

                let ctx = self.ctx_mut()?;
                // First use of an unknown name creates the local; its read
                // observes the slot's zero initialization.
                ctx.builder.add_local(name);
                let dest = ctx.builder.new_temp();
                ctx.builder.push(Inst::Load {
                    dest: dest.clone(),
                    slot: name.clone(),
                });
                Ok(Value::Var(dest))
            }

            AstNode::BinaryOp { op, left, right } => {
                let left = self.lower_expr(left)?;
                let right = self.lower_expr(right)?;
                let ctx = self.ctx_mut()?;
                let dest = ctx.builder.new_temp();
                ctx.builder.push(Inst::BinOp {
                    dest: dest.clone(),
                    op: map_binary_op(*op),
                    left,
                    right,
                });
                Ok(Value::Var(dest))
            }

            AstNode::FunctionCall { name, args } => {
                let arity = self.module.arity(name).ok_or_else(|| {
                    CompileError::LoweringError(format!("unknown function referenced: {}", name))
                })?;
                if arity != args.len() {
                    return Err(CompileError::LoweringError(format!(
                        "function '{}' takes {} arguments, {} given",
                        name,
                        arity,
                        args.len()
                    )));
                }

                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expr(arg)?);
                }

                let ctx = self.ctx_mut()?;
                let dest = ctx.builder.new_temp();
                ctx.builder.push(Inst::Call {
                    dest: Some(dest.clone()),
                    func: name.clone(),
                    args: lowered,
                });
                Ok(Value::Var(dest))
            }

            other => Err(CompileError::LoweringError(format!(
                "{} node is not an expression",
                node_kind(other)
            ))),
        }
    }

    /// Register the function, lower its body in a fresh context, emit the
    /// unified return block, verify the result, and restore the previous
    /// context.
    fn lower_function_def(
        &mut self,
        name: &str,
        params: &[String],
        body: &AstNode,
    ) -> Result<(), CompileError> {
        if !self.module.declare_function(name, params.len()) {
            return Err(CompileError::LoweringError(format!(
                "function '{}' defined more than once",
                name
            )));
        }

        let mut builder = FunctionBuilder::new(name, params.to_vec());
        let entry = builder.create_block("entry");
        let return_block = builder.create_block("return");
        builder.switch_to_block(&entry);

        // The return slot feeds the function's single return instruction;
        // every `return` statement and the implicit fallthrough write it.
        builder.add_local(RETURN_SLOT);
        builder.push(Inst::Store {
            slot: RETURN_SLOT.to_string(),
            value: Value::Const(0),
        });

        self.contexts.push(FunctionCtx {
            builder,
            return_block: return_block.clone(),
        });

        self.lower_stmt(body)?;

        let ctx = self.ctx_mut()?;
        // Natural end of the body: fall through to the return block.
        ctx.builder.terminate(Terminator::Branch {
            target: return_block.clone(),
        });

        ctx.builder.switch_to_block(&return_block);
        let result = ctx.builder.new_temp();
        ctx.builder.push(Inst::Load {
            dest: result.clone(),
            slot: RETURN_SLOT.to_string(),
        });
        ctx.builder.terminate(Terminator::Return(Value::Var(result)));

        let ctx = self.contexts.pop().ok_or_else(|| {
            CompileError::LoweringError("function context stack underflow".to_string())
        })?;
        let function = ctx.builder.build();
        verify::verify_function(&function)?;
        self.module.add_function(function);
        Ok(())
    }

    /// If the current block is already terminated (a `return` was just
    /// lowered), open a fresh block so trailing statements keep the
    /// one-terminator-per-block invariant. Such blocks are unreachable and
    /// are swept away by dead-code elimination.
    fn ensure_open_block(&mut self) {
        if let Some(ctx) = self.contexts.last_mut() {
            if ctx.builder.is_terminated() {
                let label = ctx.builder.create_block("dead");
                ctx.builder.switch_to_block(&label);
            }
        }
    }

    fn ctx_mut(&mut self) -> Result<&mut FunctionCtx, CompileError> {
        self.contexts.last_mut().ok_or_else(|| {
            CompileError::LoweringError("statement outside a function body".to_string())
        })
    }
}

fn map_binary_op(op: ast::BinaryOp) -> ir::BinOp {
    match op {
        ast::BinaryOp::Add => ir::BinOp::Add,
        ast::BinaryOp::Sub => ir::BinOp::Sub,
        ast::BinaryOp::Mul => ir::BinOp::Mul,
        ast::BinaryOp::Div => ir::BinOp::Div,
        ast::BinaryOp::Lt => ir::BinOp::Lt,
        ast::BinaryOp::Gt => ir::BinOp::Gt,
        ast::BinaryOp::Le => ir::BinOp::Le,
        ast::BinaryOp::Ge => ir::BinOp::Ge,
        ast::BinaryOp::Eq => ir::BinOp::Eq,
        ast::BinaryOp::Ne => ir::BinOp::Ne,
    }
}

fn node_kind(node: &AstNode) -> &'static str {
    match node {
        AstNode::Number(_) => "Number",
        AstNode::Variable(_) => "Variable",
        AstNode::BinaryOp { .. } => "BinaryOp",
        AstNode::Assignment { .. } => "Assignment",
        AstNode::Return(_) => "Return",
        AstNode::Sequence { .. } => "Sequence",
        AstNode::While { .. } => "While",
        AstNode::For { .. } => "For",
        AstNode::If { .. } => "If",
        AstNode::Print(_) => "Print",
        AstNode::FunctionDef { .. } => "FunctionDef",
        AstNode::FunctionCall { .. } => "FunctionCall",
        AstNode::GlobalVar { .. } => "GlobalVar",
    }
}
