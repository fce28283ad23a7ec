//! Code generation: AST to IR, then IR verification.

mod lowering;

pub use lowering::{Lowering, RETURN_SLOT};

use crate::ast::{AstNode, GlobalVar};
use crate::ir::{self, verify};
use crate::CompileError;

/// Drives lowering for a whole program and verifies the result.
pub struct CodeGenerator {
    module_name: String,
}

impl CodeGenerator {
    /// Create a generator for a module with the given name.
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
        }
    }

    /// Lower the program rooted at `root` together with its collected
    /// globals, then verify the whole module. Any lowering or verification
    /// failure aborts generation; no partial module is returned.
    pub fn generate(
        &self,
        root: &AstNode,
        globals: &[GlobalVar],
    ) -> Result<ir::Module, CompileError> {
        let module = Lowering::new(&self.module_name).lower_program(root, globals)?;
        verify::verify_module(&module)?;
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Inst, Terminator, Value};

    fn number(value: i32) -> Box<AstNode> {
        Box::new(AstNode::Number(value))
    }

    fn function(name: &str, body: AstNode) -> AstNode {
        AstNode::FunctionDef {
            name: name.to_string(),
            params: vec![],
            body: Box::new(body),
        }
    }

    fn generate(root: AstNode, globals: &[GlobalVar]) -> ir::Module {
        CodeGenerator::new("test")
            .generate(&root, globals)
            .expect("generation must succeed")
    }

    #[test]
    fn return_goes_through_the_unified_exit() {
        let module = generate(function("main", AstNode::Return(Some(number(42)))), &[]);

        let main = module.function("main").expect("main lowered");
        assert_eq!(main.blocks[0].label, "entry");
        assert!(main.blocks[0].instructions.contains(&Inst::Store {
            slot: RETURN_SLOT.to_string(),
            value: Value::Const(42),
        }));
        assert_eq!(
            main.blocks[0].terminator,
            Terminator::Branch {
                target: "return".to_string()
            }
        );

        let exit = main.block("return").expect("return block emitted");
        assert!(matches!(exit.terminator, Terminator::Return(_)));
    }

    #[test]
    fn unknown_variable_reads_a_fresh_zeroed_slot() {
        let module = generate(
            function(
                "main",
                AstNode::Return(Some(Box::new(AstNode::Variable("x".to_string())))),
            ),
            &[],
        );

        let main = module.function("main").expect("main lowered");
        assert!(main.locals.iter().any(|local| local == "x"));
        assert!(main.blocks[0].instructions.iter().any(|inst| matches!(
            inst,
            Inst::Load { slot, .. } if slot == "x"
        )));
    }

    #[test]
    fn globals_shadow_locals() {
        let globals = vec![GlobalVar {
            name: "g".to_string(),
            value: 7,
        }];
        let module = generate(
            function(
                "main",
                AstNode::Assignment {
                    name: "g".to_string(),
                    value: number(1),
                },
            ),
            &globals,
        );

        assert_eq!(module.globals[0].init, 7);
        let main = module.function("main").expect("main lowered");
        assert!(main.blocks[0].instructions.iter().any(|inst| matches!(
            inst,
            Inst::StoreGlobal { name, .. } if name == "g"
        )));
        assert!(!main.locals.iter().any(|local| local == "g"));
    }

    #[test]
    fn call_to_unknown_function_is_fatal() {
        let root = function(
            "main",
            AstNode::Return(Some(Box::new(AstNode::FunctionCall {
                name: "missing".to_string(),
                args: vec![],
            }))),
        );

        let err = CodeGenerator::new("test")
            .generate(&root, &[])
            .expect_err("must fail");
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn forward_reference_is_fatal_while_recursion_is_not() {
        let call_helper = AstNode::Return(Some(Box::new(AstNode::FunctionCall {
            name: "helper".to_string(),
            args: vec![],
        })));
        let forward = AstNode::Sequence {
            first: Box::new(function("main", call_helper)),
            second: Box::new(function("helper", AstNode::Return(Some(number(1))))),
        };
        assert!(CodeGenerator::new("test").generate(&forward, &[]).is_err());

        let recursive = function(
            "main",
            AstNode::Return(Some(Box::new(AstNode::FunctionCall {
                name: "main".to_string(),
                args: vec![],
            }))),
        );
        assert!(CodeGenerator::new("test").generate(&recursive, &[]).is_ok());
    }

    #[test]
    fn while_lowers_to_the_three_block_shape() {
        let body = AstNode::Sequence {
            first: Box::new(AstNode::While {
                condition: number(0),
                body: Box::new(AstNode::Assignment {
                    name: "x".to_string(),
                    value: number(1),
                }),
            }),
            second: Box::new(AstNode::Return(Some(number(0)))),
        };
        let module = generate(function("main", body), &[]);
        let main = module.function("main").expect("main lowered");

        let labels: Vec<&str> = main.blocks.iter().map(|b| b.label.as_str()).collect();
        assert!(labels.contains(&"loop"));
        assert!(labels.contains(&"loopbody"));
        assert!(labels.contains(&"afterloop"));

        let cond = main.block("loop").expect("condition block");
        assert_eq!(
            cond.terminator,
            Terminator::CondBranch {
                cond: Value::Const(0),
                then_block: "loopbody".to_string(),
                else_block: "afterloop".to_string(),
            }
        );
        let body = main.block("loopbody").expect("body block");
        assert_eq!(
            body.terminator,
            Terminator::Branch {
                target: "loop".to_string()
            }
        );
    }

    #[test]
    fn duplicate_function_definition_is_rejected() {
        let root = AstNode::Sequence {
            first: Box::new(function("main", AstNode::Return(Some(number(0))))),
            second: Box::new(function("main", AstNode::Return(Some(number(1))))),
        };
        let err = CodeGenerator::new("test")
            .generate(&root, &[])
            .expect_err("must fail");
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn statement_outside_a_function_is_rejected() {
        let root = AstNode::Assignment {
            name: "x".to_string(),
            value: number(1),
        };
        let err = CodeGenerator::new("test")
            .generate(&root, &[])
            .expect_err("must fail");
        assert!(err.to_string().contains("outside a function"));
    }

    #[test]
    fn print_calls_the_formatted_output_routine() {
        let body = AstNode::Sequence {
            first: Box::new(AstNode::Print(number(5))),
            second: Box::new(AstNode::Return(Some(number(0)))),
        };
        let module = generate(function("main", body), &[]);
        let main = module.function("main").expect("main lowered");

        assert!(main.blocks[0].instructions.iter().any(|inst| matches!(
            inst,
            Inst::Call { dest: None, func, args }
                if func == ir::PRINTF
                    && args.first() == Some(&Value::Str(ir::PRINT_FORMAT.to_string()))
        )));
    }
}
