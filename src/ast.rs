//! Abstract syntax tree for the toy language.
//!
//! The parser hands the rest of the compiler a fully built tree and performs
//! no semantic analysis. Nodes own their children exclusively (a tree, never
//! a DAG), so dropping the root releases everything.

/// Binary operators of the language.
///
/// Comparisons produce 0 or 1 widened to the scalar width, so their results
/// compose with arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (signed, truncating toward zero)
    Div,
    /// `<`
    Lt,
    /// `>`
    Gt,
    /// `<=`
    Le,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

/// A single expression or statement node.
///
/// The language has one scalar type (32-bit signed integer), so there is no
/// type annotation anywhere in the tree. A well-formed program's top level is
/// a `Sequence` chain (or a lone `FunctionDef`) whose elements are only
/// `FunctionDef` and `GlobalVar` nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// Integer literal.
    Number(i32),
    /// Variable reference, resolved at lowering time.
    Variable(String),
    /// Binary operation.
    BinaryOp {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<AstNode>,
        /// Right operand.
        right: Box<AstNode>,
    },
    /// Assignment; the target may resolve to a global or a local.
    Assignment {
        /// Target name.
        name: String,
        /// Value expression.
        value: Box<AstNode>,
    },
    /// Return statement; all returns funnel into one exit point per function.
    Return(Option<Box<AstNode>>),
    /// Right-leaning list encoding of statement blocks.
    Sequence {
        /// First statement.
        first: Box<AstNode>,
        /// Rest of the block.
        second: Box<AstNode>,
    },
    /// `while (condition) body`
    While {
        /// Loop condition; nonzero is true.
        condition: Box<AstNode>,
        /// Loop body.
        body: Box<AstNode>,
    },
    /// `for (init; condition; increment) body`
    For {
        /// Init statement, run once.
        init: Box<AstNode>,
        /// Loop condition; nonzero is true.
        condition: Box<AstNode>,
        /// Increment statement, run after each iteration.
        increment: Box<AstNode>,
        /// Loop body.
        body: Box<AstNode>,
    },
    /// `if (condition) then_branch [else else_branch]`
    If {
        /// Condition; nonzero is true.
        condition: Box<AstNode>,
        /// Taken when the condition is nonzero.
        then_branch: Box<AstNode>,
        /// Taken when the condition is zero, if present.
        else_branch: Option<Box<AstNode>>,
    },
    /// `print(expr)`, the language's only I/O primitive.
    Print(Box<AstNode>),
    /// Top-level function definition; functions do not nest.
    FunctionDef {
        /// Function name.
        name: String,
        /// Ordered parameter names.
        params: Vec<String>,
        /// Function body.
        body: Box<AstNode>,
    },
    /// Call to a named function; arguments evaluate left to right.
    FunctionCall {
        /// Callee name.
        name: String,
        /// Ordered argument expressions.
        args: Vec<AstNode>,
    },
    /// Top-level global declaration, optionally initialized.
    GlobalVar {
        /// Global name.
        name: String,
        /// Initializer; only `Number` literals are honored.
        init: Option<Box<AstNode>>,
    },
}

/// A collected global variable: name plus its literal-derived initial value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    /// Global name.
    pub name: String,
    /// Initial value; 0 unless the initializer was a number literal.
    pub value: i32,
}

/// Collect the global variables declared at the top level of a program.
///
/// Only top-level `Sequence`/`GlobalVar` nodes are visited; function bodies
/// are never descended into, so globals are top-level-only by construction.
/// Non-literal initializers degrade silently to 0. Callers must not depend
/// on the order of the returned list, only on its contents.
pub fn collect_global_vars(root: &AstNode) -> Vec<GlobalVar> {
    let mut globals = Vec::new();
    collect_into(root, &mut globals);
    globals
}

fn collect_into(node: &AstNode, globals: &mut Vec<GlobalVar>) {
    match node {
        AstNode::GlobalVar { name, init } => {
            let value = match init.as_deref() {
                Some(AstNode::Number(value)) => *value,
                _ => 0,
            };
            globals.push(GlobalVar {
                name: name.clone(),
                value,
            });
        }
        AstNode::Sequence { first, second } => {
            collect_into(first, globals);
            collect_into(second, globals);
        }
        _ => {}
    }
}

/// Report whether the program defines a function named `main`.
///
/// Searches only `Sequence`/`FunctionDef` nodes; a `main` nested anywhere
/// else does not count.
pub fn has_main_function(root: &AstNode) -> bool {
    match root {
        AstNode::FunctionDef { name, .. } => name == "main",
        AstNode::Sequence { first, second } => {
            has_main_function(first) || has_main_function(second)
        }
        _ => false,
    }
}
