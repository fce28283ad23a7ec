//! Builders for constructing IR programmatically.

use std::collections::HashMap;

use super::*;

/// Builder for a module.
///
/// Function signatures are registered as soon as a definition is entered,
/// before its body is lowered, so direct recursion resolves while forward
/// references to not-yet-visited functions do not.
pub struct ModuleBuilder {
    module: Module,
    signatures: HashMap<String, usize>,
}

impl ModuleBuilder {
    /// Create a builder for an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            module: Module::new(name),
            signatures: HashMap::new(),
        }
    }

    /// Add a global with its initial value.
    pub fn add_global(&mut self, name: impl Into<String>, init: i32) {
        self.module.globals.push(Global {
            name: name.into(),
            init,
        });
    }

    /// Whether a global with this name has been added.
    pub fn has_global(&self, name: &str) -> bool {
        self.module.globals.iter().any(|global| global.name == name)
    }

    /// Register a function signature. Returns `false` when the name is
    /// already taken.
    pub fn declare_function(&mut self, name: &str, arity: usize) -> bool {
        if self.signatures.contains_key(name) {
            return false;
        }
        self.signatures.insert(name.to_string(), arity);
        true
    }

    /// Arity of a registered function, if any.
    pub fn arity(&self, name: &str) -> Option<usize> {
        self.signatures.get(name).copied()
    }

    /// Add a finished function body to the module.
    pub fn add_function(&mut self, function: Function) {
        self.module.functions.push(function);
    }

    /// Finish building and return the module.
    pub fn build(self) -> Module {
        self.module
    }
}

/// Builder for a single function.
pub struct FunctionBuilder {
    function: Function,
    current_block: Option<usize>,
    next_temp: usize,
}

impl FunctionBuilder {
    /// Create a builder for a function with the given parameters.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            function: Function::new(name, params),
            current_block: None,
            next_temp: 0,
        }
    }

    /// Create a new basic block and return its label. The label is the hint
    /// itself when free, otherwise the hint with a numeric suffix.
    pub fn create_block(&mut self, hint: &str) -> String {
        let label = self.unique_label(hint);
        self.function.blocks.push(Block::new(label.clone()));
        label
    }

    fn unique_label(&self, hint: &str) -> String {
        if self.function.block(hint).is_none() {
            return hint.to_string();
        }
        let mut counter = 1;
        loop {
            let candidate = format!("{}{}", hint, counter);
            if self.function.block(&candidate).is_none() {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Switch the insertion point to the block with this label.
    pub fn switch_to_block(&mut self, label: &str) {
        self.current_block = self
            .function
            .blocks
            .iter()
            .position(|block| block.label == label);
    }

    /// Label of the current insertion block, if any.
    pub fn current_label(&self) -> Option<&str> {
        self.current_block
            .map(|index| self.function.blocks[index].label.as_str())
    }

    /// Whether the current insertion block already has a terminator.
    pub fn is_terminated(&self) -> bool {
        match self.current_block {
            Some(index) => !matches!(
                self.function.blocks[index].terminator,
                Terminator::Unreachable
            ),
            None => true,
        }
    }

    /// Append an instruction to the current block.
    pub fn push(&mut self, inst: Inst) {
        if let Some(index) = self.current_block {
            self.function.blocks[index].instructions.push(inst);
        }
    }

    /// Terminate the current block. The first terminator wins; later
    /// attempts on an already-terminated block are ignored, so a branch that
    /// ended in `return` never grows a second terminator.
    pub fn terminate(&mut self, terminator: Terminator) {
        if let Some(index) = self.current_block {
            if matches!(
                self.function.blocks[index].terminator,
                Terminator::Unreachable
            ) {
                self.function.blocks[index].terminator = terminator;
            }
        }
    }

    /// Allocate a fresh temporary name.
    pub fn new_temp(&mut self) -> String {
        let temp = format!("t{}", self.next_temp);
        self.next_temp += 1;
        temp
    }

    /// Register a local slot if it does not exist yet.
    pub fn add_local(&mut self, name: &str) {
        if !self.has_local(name) {
            self.function.locals.push(name.to_string());
        }
    }

    /// Whether a local slot with this name exists.
    pub fn has_local(&self, name: &str) -> bool {
        self.function.locals.iter().any(|local| local == name)
    }

    /// Finish building and return the function.
    pub fn build(self) -> Function {
        self.function
    }
}
