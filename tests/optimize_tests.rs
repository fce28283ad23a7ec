use toycc::ir::{self, Inst, Terminator, Value};
use toycc::optimize::{ConstantFolding, DeadCodeElimination, Pass, PassManager};
use toycc::Compiler;

fn lower_unoptimized(source: &str) -> ir::Module {
    let mut compiler = Compiler::new();
    compiler.opt_level = 0;
    compiler
        .compile_source(source, "optimize_test")
        .expect("compile should succeed")
}

#[test]
fn pipeline_reduces_constant_expressions_to_stores() {
    let mut module = lower_unoptimized("int main() { x = 2 * 3 + 4; return x; }");
    PassManager::standard().run(&mut module);

    let main = module.function("main").expect("main present");
    assert!(main.blocks[0].instructions.contains(&Inst::Store {
        slot: "x".to_string(),
        value: Value::Const(10),
    }));
    // The folded BinOp chain leaves no temporaries behind.
    assert!(!main.blocks[0]
        .instructions
        .iter()
        .any(|inst| matches!(inst, Inst::BinOp { .. } | Inst::Copy { .. })));
}

#[test]
fn constant_loop_condition_removes_the_body() {
    let mut module = lower_unoptimized("int main() { while (0) x = 1; return 2; }");
    PassManager::standard().run(&mut module);

    let main = module.function("main").expect("main present");
    assert!(main.block("loopbody").is_none());
    assert!(main.block("loop").is_some());
}

#[test]
fn folding_keeps_division_by_zero_for_the_runtime_trap() {
    let mut module = lower_unoptimized("int main() { return 1 / 0; }");
    PassManager::standard().run(&mut module);

    let main = module.function("main").expect("main present");
    assert!(main
        .blocks
        .iter()
        .flat_map(|block| block.instructions.iter())
        .any(|inst| matches!(inst, Inst::BinOp { op: ir::BinOp::Div, .. })));
}

#[test]
fn passes_report_whether_they_changed_anything() {
    let mut module = lower_unoptimized("int main() { return 1 + 1; }");
    let function = &mut module.functions[0];

    assert!(ConstantFolding.run(function));
    assert!(!ConstantFolding.run(function));
    assert!(DeadCodeElimination.run(function));
    assert!(!DeadCodeElimination.run(function));
}

#[test]
fn optimization_is_idempotent_at_the_module_level() {
    let source = "int f(int n) { if (n <= 1) return 1; return n * f(n - 1); }\n\
                  int main() { print(f(5)); return 0; }";
    let mut module = lower_unoptimized(source);
    let manager = PassManager::standard();

    manager.run(&mut module);
    let first = module.to_string();
    manager.run(&mut module);
    assert_eq!(module.to_string(), first);
}

#[test]
fn calls_survive_even_when_their_results_are_unused() {
    let source = "int noisy() { print(1); return 0; }\n\
                  int main() { noisy(); return 0; }";
    let mut module = lower_unoptimized(source);
    PassManager::standard().run(&mut module);

    let main = module.function("main").expect("main present");
    assert!(main
        .blocks
        .iter()
        .flat_map(|block| block.instructions.iter())
        .any(|inst| matches!(inst, Inst::Call { dest: None, func, .. } if func == "noisy")));
}

#[test]
fn unreachable_code_after_return_is_deleted() {
    let mut module = lower_unoptimized("int main() { return 1; print(2); }");
    PassManager::standard().run(&mut module);

    let main = module.function("main").expect("main present");
    for block in &main.blocks {
        assert!(!block
            .instructions
            .iter()
            .any(|inst| matches!(inst, Inst::Call { func, .. } if func == ir::PRINTF)));
    }
    assert!(main
        .blocks
        .iter()
        .any(|block| matches!(block.terminator, Terminator::Return(_))));
}
