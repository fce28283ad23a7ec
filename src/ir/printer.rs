//! Textual IR rendering.
//!
//! `Module`'s `Display` output is the human-readable dump written next to
//! the object file; the other impls exist so single instructions show up
//! readably in diagnostics and tests.

use std::fmt;

use super::*;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;

        for global in &self.globals {
            writeln!(f, "  global @{} = {}", global.name, global.init)?;
        }
        if !self.globals.is_empty() && !self.functions.is_empty() {
            writeln!(f)?;
        }

        for (index, function) in self.functions.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", function)?;
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  fn {}(", self.name)?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "%{}", param)?;
        }
        writeln!(f, ") {{")?;

        if !self.locals.is_empty() {
            write!(f, "    slots:")?;
            for local in &self.locals {
                write!(f, " %{}", local)?;
            }
            writeln!(f)?;
        }

        for block in &self.blocks {
            writeln!(f, "  {}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "    {}", inst)?;
            }
            writeln!(f, "    {}", block.terminator)?;
        }

        writeln!(f, "  }}")
    }
}

impl fmt::Display for Inst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Inst::Copy { dest, value } => write!(f, "{} = {}", dest, value),
            Inst::BinOp {
                dest,
                op,
                left,
                right,
            } => write!(f, "{} = {} {}, {}", dest, op, left, right),
            Inst::Load { dest, slot } => write!(f, "{} = load %{}", dest, slot),
            Inst::Store { slot, value } => write!(f, "store %{}, {}", slot, value),
            Inst::LoadGlobal { dest, name } => write!(f, "{} = load @{}", dest, name),
            Inst::StoreGlobal { name, value } => write!(f, "store @{}, {}", name, value),
            Inst::Call { dest, func, args } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest)?;
                }
                write!(f, "call {}(", func)?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Return(value) => write!(f, "ret {}", value),
            Terminator::Branch { target } => write!(f, "br {}", target),
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => write!(f, "brif {}, {}, {}", cond, then_block, else_block),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::Le => "le",
            BinOp::Ge => "ge",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
        };
        write!(f, "{}", name)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Var(name) => write!(f, "{}", name),
            Value::Const(value) => write!(f, "{}", value),
            Value::Str(text) => write!(f, "{:?}", text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_a_small_module() {
        let mut module = Module::new("demo");
        module.globals.push(Global {
            name: "x".to_string(),
            init: 5,
        });

        let mut function = Function::new("main", vec![]);
        let mut entry = Block::new("entry");
        entry.instructions.push(Inst::LoadGlobal {
            dest: "t0".to_string(),
            name: "x".to_string(),
        });
        entry.terminator = Terminator::Return(Value::Var("t0".to_string()));
        function.blocks.push(entry);
        module.functions.push(function);

        let text = module.to_string();
        assert!(text.contains("module demo {"));
        assert!(text.contains("global @x = 5"));
        assert!(text.contains("fn main() {"));
        assert!(text.contains("t0 = load @x"));
        assert!(text.contains("ret t0"));
    }

    #[test]
    fn renders_calls_and_branches() {
        let call = Inst::Call {
            dest: Some("t1".to_string()),
            func: "f".to_string(),
            args: vec![Value::Const(1), Value::Var("t0".to_string())],
        };
        assert_eq!(call.to_string(), "t1 = call f(1, t0)");

        let print = Inst::Call {
            dest: None,
            func: PRINTF.to_string(),
            args: vec![Value::Str(PRINT_FORMAT.to_string()), Value::Const(7)],
        };
        assert_eq!(print.to_string(), "call printf(\"%d\\n\", 7)");

        let branch = Terminator::CondBranch {
            cond: Value::Var("t2".to_string()),
            then_block: "loopbody".to_string(),
            else_block: "afterloop".to_string(),
        };
        assert_eq!(branch.to_string(), "brif t2, loopbody, afterloop");
    }
}
