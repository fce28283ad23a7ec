use toycc::ast::{AstNode, BinaryOp};
use toycc::lexer;
use toycc::parser::Parser;

fn parse(source: &str) -> AstNode {
    let tokens = lexer::lex(source).expect("lex should succeed");
    let mut parser = Parser::new(tokens);
    parser.parse_program().expect("parse should succeed")
}

fn parse_err(source: &str) -> String {
    let tokens = lexer::lex(source).expect("lex should succeed");
    let mut parser = Parser::new(tokens);
    parser
        .parse_program()
        .expect_err("parse should fail")
        .to_string()
}

/// Flatten the right-leaning sequence chain into top-level items.
fn top_level_items(root: &AstNode) -> Vec<&AstNode> {
    let mut items = Vec::new();
    let mut node = root;
    loop {
        match node {
            AstNode::Sequence { first, second } => {
                items.push(first.as_ref());
                node = second;
            }
            other => {
                items.push(other);
                return items;
            }
        }
    }
}

#[test]
fn parses_function_with_parameters() {
    let root = parse("int add(int a, int b) { return a + b; }");
    match &root {
        AstNode::FunctionDef { name, params, body } => {
            assert_eq!(name, "add");
            assert_eq!(params, &["a".to_string(), "b".to_string()]);
            match body.as_ref() {
                AstNode::Return(Some(value)) => {
                    assert!(matches!(
                        value.as_ref(),
                        AstNode::BinaryOp {
                            op: BinaryOp::Add,
                            ..
                        }
                    ));
                }
                other => panic!("expected return statement, got {:?}", other),
            }
        }
        other => panic!("expected function definition, got {:?}", other),
    }
}

#[test]
fn parses_globals_with_and_without_initializer() {
    let root = parse("int x = 5;\nint y;\nint main() { return 0; }");
    let items = top_level_items(&root);
    assert_eq!(items.len(), 3);

    match items[0] {
        AstNode::GlobalVar { name, init } => {
            assert_eq!(name, "x");
            assert!(matches!(init.as_deref(), Some(AstNode::Number(5))));
        }
        other => panic!("expected global, got {:?}", other),
    }
    match items[1] {
        AstNode::GlobalVar { name, init } => {
            assert_eq!(name, "y");
            assert!(init.is_none());
        }
        other => panic!("expected global, got {:?}", other),
    }
    assert!(matches!(items[2], AstNode::FunctionDef { .. }));
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let root = parse("int main() { return 1 + 2 * 3; }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    let AstNode::Return(Some(value)) = body.as_ref() else {
        panic!("expected return");
    };
    match value.as_ref() {
        AstNode::BinaryOp {
            op: BinaryOp::Add,
            left,
            right,
        } => {
            assert!(matches!(left.as_ref(), AstNode::Number(1)));
            assert!(matches!(
                right.as_ref(),
                AstNode::BinaryOp {
                    op: BinaryOp::Mul,
                    ..
                }
            ));
        }
        other => panic!("expected addition at the root, got {:?}", other),
    }
}

#[test]
fn parentheses_override_precedence() {
    let root = parse("int main() { return (1 + 2) * 3; }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    let AstNode::Return(Some(value)) = body.as_ref() else {
        panic!("expected return");
    };
    assert!(matches!(
        value.as_ref(),
        AstNode::BinaryOp {
            op: BinaryOp::Mul,
            ..
        }
    ));
}

#[test]
fn statements_fold_into_a_right_leaning_sequence() {
    let root = parse("int main() { a = 1; b = 2; return a; }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    // Sequence(Assignment, Sequence(Assignment, Return))
    let AstNode::Sequence { first, second } = body.as_ref() else {
        panic!("expected sequence");
    };
    assert!(matches!(first.as_ref(), AstNode::Assignment { .. }));
    let AstNode::Sequence { first, second } = second.as_ref() else {
        panic!("expected nested sequence");
    };
    assert!(matches!(first.as_ref(), AstNode::Assignment { .. }));
    assert!(matches!(second.as_ref(), AstNode::Return(_)));
}

#[test]
fn parses_if_with_and_without_else() {
    let root = parse("int main() { if (x < 1) return 1; else return 2; }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    match body.as_ref() {
        AstNode::If {
            condition,
            else_branch,
            ..
        } => {
            assert!(matches!(
                condition.as_ref(),
                AstNode::BinaryOp {
                    op: BinaryOp::Lt,
                    ..
                }
            ));
            assert!(else_branch.is_some());
        }
        other => panic!("expected if, got {:?}", other),
    }

    let root = parse("int main() { if (x) return 1; return 2; }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    let AstNode::Sequence { first, .. } = body.as_ref() else {
        panic!("expected sequence");
    };
    assert!(matches!(
        first.as_ref(),
        AstNode::If {
            else_branch: None,
            ..
        }
    ));
}

#[test]
fn parses_for_with_all_three_clauses() {
    let root = parse("int main() { for (i = 0; i < 10; i = i + 1) print(i); return 0; }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    let AstNode::Sequence { first, .. } = body.as_ref() else {
        panic!("expected sequence");
    };
    match first.as_ref() {
        AstNode::For {
            init,
            condition,
            increment,
            body,
        } => {
            assert!(matches!(init.as_ref(), AstNode::Assignment { .. }));
            assert!(matches!(condition.as_ref(), AstNode::BinaryOp { .. }));
            assert!(matches!(increment.as_ref(), AstNode::Assignment { .. }));
            assert!(matches!(body.as_ref(), AstNode::Print(_)));
        }
        other => panic!("expected for, got {:?}", other),
    }
}

#[test]
fn for_requires_an_increment_assignment() {
    let message = parse_err("int main() { for (i = 0; i < 10;) print(i); }");
    assert!(message.contains("assignment target"));
}

#[test]
fn parses_calls_with_arguments_in_order() {
    let root = parse("int main() { return f(1, 2 + 3, g()); }");
    let AstNode::FunctionDef { body, .. } = &root else {
        panic!("expected function definition");
    };
    let AstNode::Return(Some(value)) = body.as_ref() else {
        panic!("expected return");
    };
    match value.as_ref() {
        AstNode::FunctionCall { name, args } => {
            assert_eq!(name, "f");
            assert_eq!(args.len(), 3);
            assert!(matches!(args[0], AstNode::Number(1)));
            assert!(matches!(args[1], AstNode::BinaryOp { .. }));
            assert!(matches!(&args[2], AstNode::FunctionCall { name, .. } if name == "g"));
        }
        other => panic!("expected call, got {:?}", other),
    }
}

#[test]
fn parser_records_functions_and_parameters_in_the_symbol_table() {
    let tokens = lexer::lex("int add(int a, int b) { c = a + b; return c; }")
        .expect("lex should succeed");
    let mut parser = Parser::new(tokens);
    parser.parse_program().expect("parse should succeed");

    let symbols = parser.symbols();
    let function = symbols.lookup("add").expect("function recorded");
    assert_eq!(function.param_count, 2);
    assert!(symbols.lookup("a").is_some());
    assert!(symbols.lookup("b").is_some());
    assert!(symbols.lookup("c").is_some());
}

#[test]
fn reports_positioned_errors() {
    let message = parse_err("int main() { return 1 + ; }");
    assert!(message.contains("line 1"));
    assert!(message.contains("expected an expression"));

    let message = parse_err("int main() { x = 1 }");
    assert!(message.contains("';'"));
}

#[test]
fn empty_source_is_a_parse_error() {
    assert!(parse_err("").contains("expected a declaration"));
}
