//! Scope-local symbol table.
//!
//! One table is created per compilation and populated by the parser as it
//! encounters functions, parameters, and assigned variables. The code
//! generator keeps its own per-generation maps (declared globals and the
//! current function's locals) and does not consult this table for scoping;
//! the table records what the frontend saw, including each function's arity.

/// Width in bytes of the language's single scalar type.
pub const SCALAR_WIDTH: i32 = 4;

/// What kind of name a symbol binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Assigned variable.
    Variable,
    /// Function parameter.
    Parameter,
    /// Function definition.
    Function,
}

/// One entry in the symbol table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Symbol name, unique within one table.
    pub name: String,
    /// Symbol kind.
    pub kind: SymbolKind,
    /// Evaluator-style value slot; unused by the code generator.
    pub value: i32,
    /// Stack slot offset, assigned monotonically in scalar-width units.
    /// Always 0 for functions.
    pub offset: i32,
    /// Arity; only meaningful for functions.
    pub param_count: usize,
}

/// Name registry mapping identifiers to their kind, stack offset, and
/// (for functions) arity. Duplicate insertions are rejected, not overwritten.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    stack_offset: i32,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assigned variable, assigning it the next stack offset.
    /// Returns `false` if the name is already present.
    pub fn add_variable(&mut self, name: &str) -> bool {
        self.insert(name, SymbolKind::Variable, 0)
    }

    /// Register a function parameter, assigning it the next stack offset.
    /// Returns `false` if the name is already present.
    pub fn add_parameter(&mut self, name: &str) -> bool {
        self.insert(name, SymbolKind::Parameter, 0)
    }

    /// Register a function together with its arity. Functions occupy no
    /// stack slot. Returns `false` if the name is already present.
    pub fn add_function(&mut self, name: &str, param_count: usize) -> bool {
        if self.lookup(name).is_some() {
            return false;
        }
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function,
            value: 0,
            offset: 0,
            param_count,
        });
        true
    }

    fn insert(&mut self, name: &str, kind: SymbolKind, param_count: usize) -> bool {
        if self.lookup(name).is_some() {
            return false;
        }
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind,
            value: 0,
            offset: self.stack_offset,
            param_count,
        });
        self.stack_offset += SCALAR_WIDTH;
        true
    }

    /// Look up a symbol by name.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|symbol| symbol.name == name)
    }

    /// Set the evaluator-style value of a known symbol; ignored for unknown
    /// names.
    pub fn set(&mut self, name: &str, value: i32) {
        if let Some(symbol) = self.symbols.iter_mut().find(|symbol| symbol.name == name) {
            symbol.value = value;
        }
    }

    /// Get the evaluator-style value of a symbol, or 0 for unknown names.
    pub fn get(&self, name: &str) -> i32 {
        self.lookup(name).map_or(0, |symbol| symbol.value)
    }

    /// Total stack space handed out so far, in bytes.
    pub fn stack_offset(&self) -> i32 {
        self.stack_offset
    }

    /// Number of registered symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
