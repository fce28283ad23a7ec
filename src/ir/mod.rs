//! Intermediate representation.
//!
//! The IR is a low-level, block-structured representation of lowered
//! programs. Every value is a 32-bit signed integer; mutable storage lives
//! in named per-function slots (one per local variable) and named module
//! globals, keeping the representation easy to optimize and to hand to the
//! machine-code backend.

pub mod builder;
pub mod printer;
pub mod verify;

/// Name of the external variadic formatted-output routine.
pub const PRINTF: &str = "printf";

/// Format string used by the `print` built-in: integer followed by newline.
pub const PRINT_FORMAT: &str = "%d\n";

/// A lowered module.
#[derive(Debug, Clone)]
pub struct Module {
    /// Module name.
    pub name: String,
    /// Module globals, one per collected global variable.
    pub globals: Vec<Global>,
    /// Functions in lowering order.
    pub functions: Vec<Function>,
}

impl Module {
    /// Create an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            globals: Vec::new(),
            functions: Vec::new(),
        }
    }

    /// Look up a function by name.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}

/// An externally linked mutable global holding one scalar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    /// Global name.
    pub name: String,
    /// Initial value.
    pub init: i32,
}

/// A lowered function.
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name.
    pub name: String,
    /// Ordered parameter names; each also appears in `locals`.
    pub params: Vec<String>,
    /// Names of the function's stack slots, one scalar each. Slots are
    /// zero-initialized at entry; parameter slots are then overwritten with
    /// the incoming argument values.
    pub locals: Vec<String>,
    /// Basic blocks; the first block is the entry block.
    pub blocks: Vec<Block>,
}

impl Function {
    /// Create a function with no blocks yet. Parameter slots are registered
    /// up front.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        let locals = params.clone();
        Self {
            name: name.into(),
            params,
            locals,
            blocks: Vec::new(),
        }
    }

    /// Look up a block by label.
    pub fn block(&self, label: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.label == label)
    }
}

/// A basic block: straight-line instructions ending in one terminator.
#[derive(Debug, Clone)]
pub struct Block {
    /// Block label, unique within the function.
    pub label: String,
    /// Instructions in execution order.
    pub instructions: Vec<Inst>,
    /// Block terminator. `Unreachable` is the builder's not-yet-terminated
    /// sentinel and never survives verification.
    pub terminator: Terminator,
}

impl Block {
    /// Create an empty, unterminated block.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }
}

/// An IR instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    /// Bind a value to a temporary.
    Copy {
        /// Destination temporary.
        dest: String,
        /// Source value.
        value: Value,
    },
    /// Binary operation; comparisons yield 0 or 1 at scalar width.
    BinOp {
        /// Destination temporary.
        dest: String,
        /// Operation.
        op: BinOp,
        /// Left operand.
        left: Value,
        /// Right operand.
        right: Value,
    },
    /// Load from a local slot.
    Load {
        /// Destination temporary.
        dest: String,
        /// Slot name.
        slot: String,
    },
    /// Store to a local slot.
    Store {
        /// Slot name.
        slot: String,
        /// Value to store.
        value: Value,
    },
    /// Load from a module global.
    LoadGlobal {
        /// Destination temporary.
        dest: String,
        /// Global name.
        name: String,
    },
    /// Store to a module global.
    StoreGlobal {
        /// Global name.
        name: String,
        /// Value to store.
        value: Value,
    },
    /// Call a function by name; arguments are already in evaluation order.
    Call {
        /// Destination temporary for the return value, if used.
        dest: Option<String>,
        /// Callee name.
        func: String,
        /// Argument values.
        args: Vec<Value>,
    },
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    /// Return a scalar to the caller.
    Return(Value),
    /// Unconditional branch.
    Branch {
        /// Target label.
        target: String,
    },
    /// Two-way branch on a scalar condition; nonzero means true.
    CondBranch {
        /// Condition value.
        cond: Value,
        /// Target when the condition is nonzero.
        then_block: String,
        /// Target when the condition is zero.
        else_block: String,
    },
    /// Not-yet-terminated sentinel; rejected by the verifier.
    Unreachable,
}

/// Binary operations at the IR level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Wrapping addition.
    Add,
    /// Wrapping subtraction.
    Sub,
    /// Wrapping multiplication.
    Mul,
    /// Signed division, truncating toward zero; traps on divide-by-zero.
    Div,
    /// Signed less-than, yielding 0 or 1.
    Lt,
    /// Signed greater-than, yielding 0 or 1.
    Gt,
    /// Signed less-or-equal, yielding 0 or 1.
    Le,
    /// Signed greater-or-equal, yielding 0 or 1.
    Ge,
    /// Equality, yielding 0 or 1.
    Eq,
    /// Inequality, yielding 0 or 1.
    Ne,
}

/// An IR value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Temporary produced by an earlier instruction in the same function.
    Var(String),
    /// Scalar constant.
    Const(i32),
    /// Interned string constant; only ever the format argument of the
    /// formatted-output routine.
    Str(String),
}
