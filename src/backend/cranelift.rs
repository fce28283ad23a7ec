//! Cranelift backend.
//!
//! Lowers verified IR to native machine code, either into a relocatable
//! object image or straight into executable memory for `run_main`. Every
//! IR value is a 32-bit integer; local slots become explicit stack slots,
//! globals become writable data objects, and `print` reaches the host C
//! library through an imported `printf`.

use std::collections::HashMap;
use std::ffi::c_char;

use cranelift::codegen::ir::{FuncRef, StackSlot};
use cranelift::codegen::isa::OwnedTargetIsa;
use cranelift::prelude::{
    settings, types, AbiParam, Block as ClifBlock, Configurable, FunctionBuilder,
    FunctionBuilderContext, InstBuilder, IntCC, MemFlags, StackSlotData, StackSlotKind,
    TrapCode, Value as ClifValue,
};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module as ClifModule};
use cranelift_object::{ObjectBuilder, ObjectModule};

use crate::backend::Backend;
use crate::ir::{self, BinOp, Function as IrFunction, Inst, Module, Terminator, Value};
use crate::CompileError;

extern "C" {
    fn printf(format: *const c_char, ...) -> i32;
}

/// Size and alignment of one scalar slot.
const SLOT_BYTES: u32 = 4;
const SLOT_ALIGN_SHIFT: u8 = 2;

/// Cranelift code generator.
pub struct CraneliftBackend {
    target: String,
}

impl CraneliftBackend {
    /// Create a backend for the host machine.
    pub fn new() -> Result<Self, CompileError> {
        Ok(Self {
            target: std::env::consts::ARCH.to_string(),
        })
    }

    /// Compile IR to object bytes.
    fn compile_module(&self, module: &Module) -> Result<Vec<u8>, CompileError> {
        let isa = build_native_isa()?;
        let builder = ObjectBuilder::new(
            isa,
            module.name.clone(),
            cranelift_module::default_libcall_names(),
        )
        .map_err(module_error)?;
        let mut object_module = ObjectModule::new(builder);

        compile_into_module(&mut object_module, module)?;
        let product = object_module.finish();
        product.emit().map_err(|err| {
            CompileError::BackendError(format!("failed to emit object bytes: {}", err))
        })
    }

    /// JIT-compile the module and run its `main`, returning main's result.
    pub fn run_main(&self, module: &Module) -> Result<i32, CompileError> {
        let mut jit_builder =
            JITBuilder::new(cranelift_module::default_libcall_names()).map_err(module_error)?;
        jit_builder.symbol(ir::PRINTF, printf as *const u8);

        let mut jit_module = JITModule::new(jit_builder);
        let compiled = compile_into_module(&mut jit_module, module)?;
        jit_module.finalize_definitions().map_err(module_error)?;

        let main_id = compiled
            .functions
            .get("main")
            .copied()
            .ok_or_else(|| CompileError::MissingMain)?;

        let code = jit_module.get_finalized_function(main_id);
        // SAFETY: `main` is declared and defined with signature `fn() -> i32`
        // in this backend.
        let main_fn: extern "C" fn() -> i32 = unsafe { std::mem::transmute(code) };
        Ok(main_fn())
    }

    /// Configured target architecture name.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Backend for CraneliftBackend {
    fn generate(&self, module: &Module) -> Result<Vec<u8>, CompileError> {
        self.compile_module(module)
    }

    fn name(&self) -> &'static str {
        "cranelift"
    }

    fn supported_targets(&self) -> &[&str] {
        &["x86_64", "aarch64"]
    }
}

struct CompiledFunctions {
    functions: HashMap<String, FuncId>,
}

/// Interned nul-terminated string constants.
struct StringPool {
    next_id: usize,
    ids: HashMap<String, DataId>,
}

impl StringPool {
    fn new() -> Self {
        Self {
            next_id: 0,
            ids: HashMap::new(),
        }
    }

    fn data_id_for<M: ClifModule>(
        &mut self,
        module: &mut M,
        text: &str,
    ) -> Result<DataId, CompileError> {
        if let Some(id) = self.ids.get(text) {
            return Ok(*id);
        }

        let name = format!(".str{}", self.next_id);
        self.next_id += 1;

        let mut data = DataDescription::new();
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        data.define(bytes.into_boxed_slice());

        let data_id = module
            .declare_data(&name, Linkage::Local, false, false)
            .map_err(module_error)?;
        module.define_data(data_id, &data).map_err(module_error)?;
        self.ids.insert(text.to_string(), data_id);
        Ok(data_id)
    }
}

fn compile_into_module<M: ClifModule>(
    module: &mut M,
    ir_module: &Module,
) -> Result<CompiledFunctions, CompileError> {
    let printf_id = declare_printf(module)?;
    let globals = define_globals(module, ir_module)?;

    let mut functions = HashMap::new();
    for function in &ir_module.functions {
        let signature = make_signature(module, function);
        let func_id = module
            .declare_function(&function.name, Linkage::Export, &signature)
            .map_err(module_error)?;
        functions.insert(function.name.clone(), func_id);
    }

    let mut string_pool = StringPool::new();

    for function in &ir_module.functions {
        let func_id = *functions.get(&function.name).ok_or_else(|| {
            CompileError::InvalidIr(format!("missing function id for {}", function.name))
        })?;

        let mut context = module.make_context();
        context.func.signature = make_signature(module, function);

        {
            let mut builder_context = FunctionBuilderContext::new();
            let mut builder = FunctionBuilder::new(&mut context.func, &mut builder_context);
            lower_function(
                module,
                function,
                printf_id,
                &functions,
                &globals,
                &mut string_pool,
                &mut builder,
            )?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        module
            .define_function(func_id, &mut context)
            .map_err(module_error)?;
    }

    Ok(CompiledFunctions { functions })
}

/// Define every IR global as a writable, exported data object holding its
/// initial value.
fn define_globals<M: ClifModule>(
    module: &mut M,
    ir_module: &Module,
) -> Result<HashMap<String, DataId>, CompileError> {
    let mut globals = HashMap::new();
    for global in &ir_module.globals {
        let mut data = DataDescription::new();
        data.define(Box::new(global.init.to_le_bytes()));
        data.set_align(u64::from(SLOT_BYTES));

        let data_id = module
            .declare_data(&global.name, Linkage::Export, true, false)
            .map_err(module_error)?;
        module.define_data(data_id, &data).map_err(module_error)?;
        globals.insert(global.name.clone(), data_id);
    }
    Ok(globals)
}

/// Per-function lowering state: the label-to-block map, one stack slot per
/// local, and the values bound to temporaries so far.
struct FunctionState {
    blocks: HashMap<String, ClifBlock>,
    slots: HashMap<String, StackSlot>,
    temps: HashMap<String, ClifValue>,
}

fn lower_function<M: ClifModule>(
    module: &mut M,
    ir_function: &IrFunction,
    printf_id: FuncId,
    function_ids: &HashMap<String, FuncId>,
    globals: &HashMap<String, DataId>,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    if ir_function.blocks.is_empty() {
        return Err(CompileError::InvalidIr(format!(
            "function '{}' has no basic blocks",
            ir_function.name
        )));
    }

    let mut state = FunctionState {
        blocks: HashMap::new(),
        slots: HashMap::new(),
        temps: HashMap::new(),
    };

    for block in &ir_function.blocks {
        let id = builder.create_block();
        state.blocks.insert(block.label.clone(), id);
    }

    let entry = state.blocks[&ir_function.blocks[0].label];
    builder.append_block_params_for_function_params(entry);
    builder.switch_to_block(entry);

    // Entry prologue: one zero-initialized stack slot per local, with the
    // incoming argument values spilled over their parameter slots.
    let zero = builder.ins().iconst(types::I32, 0);
    for local in &ir_function.locals {
        let slot = builder.create_sized_stack_slot(StackSlotData::new(
            StackSlotKind::ExplicitSlot,
            SLOT_BYTES,
            SLOT_ALIGN_SHIFT,
        ));
        builder.ins().stack_store(zero, slot, 0);
        state.slots.insert(local.clone(), slot);
    }
    for (index, param) in ir_function.params.iter().enumerate() {
        let value = *builder
            .block_params(entry)
            .get(index)
            .ok_or_else(|| {
                CompileError::InvalidIr(format!(
                    "missing block parameter {} for function {}",
                    index, ir_function.name
                ))
            })?;
        let slot = state.slots[param.as_str()];
        builder.ins().stack_store(value, slot, 0);
    }

    let printf_ref = module.declare_func_in_func(printf_id, builder.func);
    let mut function_refs = HashMap::new();
    for (name, id) in function_ids {
        let func_ref = module.declare_func_in_func(*id, builder.func);
        function_refs.insert(name.clone(), func_ref);
    }

    for (index, block) in ir_function.blocks.iter().enumerate() {
        if index > 0 {
            builder.switch_to_block(state.blocks[&block.label]);
        }

        for inst in &block.instructions {
            lower_inst(
                module,
                inst,
                &mut state,
                globals,
                &function_refs,
                printf_ref,
                string_pool,
                builder,
            )?;
        }

        lower_terminator(&block.terminator, &mut state, builder)?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn lower_inst<M: ClifModule>(
    module: &mut M,
    inst: &Inst,
    state: &mut FunctionState,
    globals: &HashMap<String, DataId>,
    function_refs: &HashMap<String, FuncRef>,
    printf_ref: FuncRef,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    match inst {
        Inst::Copy { dest, value } => {
            let lowered = lower_value(module, value, state, string_pool, builder)?;
            state.temps.insert(dest.clone(), lowered);
            Ok(())
        }
        Inst::BinOp {
            dest,
            op,
            left,
            right,
        } => {
            let lhs = lower_value(module, left, state, string_pool, builder)?;
            let rhs = lower_value(module, right, state, string_pool, builder)?;
            let result = lower_binop(*op, lhs, rhs, builder);
            state.temps.insert(dest.clone(), result);
            Ok(())
        }
        Inst::Load { dest, slot } => {
            let slot = *state.slots.get(slot.as_str()).ok_or_else(|| {
                CompileError::InvalidIr(format!("unknown slot '{}' in backend", slot))
            })?;
            let value = builder.ins().stack_load(types::I32, slot, 0);
            state.temps.insert(dest.clone(), value);
            Ok(())
        }
        Inst::Store { slot, value } => {
            let value = lower_value(module, value, state, string_pool, builder)?;
            let slot = *state.slots.get(slot.as_str()).ok_or_else(|| {
                CompileError::InvalidIr(format!("unknown slot '{}' in backend", slot))
            })?;
            builder.ins().stack_store(value, slot, 0);
            Ok(())
        }
        Inst::LoadGlobal { dest, name } => {
            let addr = global_address(module, globals, name, builder)?;
            let value = builder.ins().load(types::I32, MemFlags::trusted(), addr, 0);
            state.temps.insert(dest.clone(), value);
            Ok(())
        }
        Inst::StoreGlobal { name, value } => {
            let value = lower_value(module, value, state, string_pool, builder)?;
            let addr = global_address(module, globals, name, builder)?;
            builder.ins().store(MemFlags::trusted(), value, addr, 0);
            Ok(())
        }
        Inst::Call { dest, func, args } => {
            let func_ref = if func == ir::PRINTF {
                printf_ref
            } else {
                function_refs.get(func).copied().ok_or_else(|| {
                    CompileError::InvalidIr(format!("unknown call target '{}'", func))
                })?
            };

            let mut lowered_args = Vec::with_capacity(args.len());
            for arg in args {
                lowered_args.push(lower_value(module, arg, state, string_pool, builder)?);
            }

            let call = builder.ins().call(func_ref, &lowered_args);
            if let Some(dest) = dest {
                let result = builder
                    .inst_results(call)
                    .first()
                    .copied()
                    .ok_or_else(|| {
                        CompileError::InvalidIr(format!("call to '{}' produced no result", func))
                    })?;
                state.temps.insert(dest.clone(), result);
            }
            Ok(())
        }
    }
}

fn lower_terminator(
    terminator: &Terminator,
    state: &mut FunctionState,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    match terminator {
        Terminator::Return(value) => {
            let lowered = lower_plain_value(value, state, builder)?;
            builder.ins().return_(&[lowered]);
            Ok(())
        }
        Terminator::Branch { target } => {
            let target = *state.blocks.get(target.as_str()).ok_or_else(|| {
                CompileError::InvalidIr(format!("unknown branch target '{}'", target))
            })?;
            builder.ins().jump(target, &[]);
            Ok(())
        }
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => {
            let then_block = *state.blocks.get(then_block.as_str()).ok_or_else(|| {
                CompileError::InvalidIr(format!("unknown branch target '{}'", then_block))
            })?;
            let else_block = *state.blocks.get(else_block.as_str()).ok_or_else(|| {
                CompileError::InvalidIr(format!("unknown branch target '{}'", else_block))
            })?;

            let cond = lower_plain_value(cond, state, builder)?;
            let cond_bool = builder.ins().icmp_imm(IntCC::NotEqual, cond, 0);
            builder
                .ins()
                .brif(cond_bool, then_block, &[], else_block, &[]);
            Ok(())
        }
        Terminator::Unreachable => {
            builder.ins().trap(TrapCode::unwrap_user(1));
            Ok(())
        }
    }
}

/// Lower a scalar value: a temporary or a constant. String constants never
/// reach this path.
fn lower_plain_value(
    value: &Value,
    state: &FunctionState,
    builder: &mut FunctionBuilder,
) -> Result<ClifValue, CompileError> {
    match value {
        Value::Var(name) => state.temps.get(name.as_str()).copied().ok_or_else(|| {
            CompileError::InvalidIr(format!("unknown temporary '{}' referenced in backend", name))
        }),
        Value::Const(value) => Ok(builder.ins().iconst(types::I32, i64::from(*value))),
        Value::Str(_) => Err(CompileError::InvalidIr(
            "string constant in a scalar position".to_string(),
        )),
    }
}

fn lower_value<M: ClifModule>(
    module: &mut M,
    value: &Value,
    state: &FunctionState,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<ClifValue, CompileError> {
    match value {
        Value::Str(text) => {
            let data_id = string_pool.data_id_for(module, text)?;
            let global_value = module.declare_data_in_func(data_id, builder.func);
            let ptr_ty = module.target_config().pointer_type();
            Ok(builder.ins().global_value(ptr_ty, global_value))
        }
        other => lower_plain_value(other, state, builder),
    }
}

fn global_address<M: ClifModule>(
    module: &mut M,
    globals: &HashMap<String, DataId>,
    name: &str,
    builder: &mut FunctionBuilder,
) -> Result<ClifValue, CompileError> {
    let data_id = *globals.get(name).ok_or_else(|| {
        CompileError::InvalidIr(format!("unknown global '{}' in backend", name))
    })?;
    let global_value = module.declare_data_in_func(data_id, builder.func);
    let ptr_ty = module.target_config().pointer_type();
    Ok(builder.ins().global_value(ptr_ty, global_value))
}

fn lower_binop(op: BinOp, lhs: ClifValue, rhs: ClifValue, builder: &mut FunctionBuilder) -> ClifValue {
    match op {
        BinOp::Add => builder.ins().iadd(lhs, rhs),
        BinOp::Sub => builder.ins().isub(lhs, rhs),
        BinOp::Mul => builder.ins().imul(lhs, rhs),
        // Division by zero traps at runtime, matching the C toolchain the
        // emitted objects link against.
        BinOp::Div => builder.ins().sdiv(lhs, rhs),
        BinOp::Eq => cmp_to_i32(builder.ins().icmp(IntCC::Equal, lhs, rhs), builder),
        BinOp::Ne => cmp_to_i32(builder.ins().icmp(IntCC::NotEqual, lhs, rhs), builder),
        BinOp::Lt => cmp_to_i32(builder.ins().icmp(IntCC::SignedLessThan, lhs, rhs), builder),
        BinOp::Le => cmp_to_i32(
            builder.ins().icmp(IntCC::SignedLessThanOrEqual, lhs, rhs),
            builder,
        ),
        BinOp::Gt => cmp_to_i32(
            builder.ins().icmp(IntCC::SignedGreaterThan, lhs, rhs),
            builder,
        ),
        BinOp::Ge => cmp_to_i32(
            builder
                .ins()
                .icmp(IntCC::SignedGreaterThanOrEqual, lhs, rhs),
            builder,
        ),
    }
}

/// Comparisons produce an i8; widen back to scalar width.
fn cmp_to_i32(value: ClifValue, builder: &mut FunctionBuilder) -> ClifValue {
    builder.ins().uextend(types::I32, value)
}

/// Signature of an IR function: one scalar per parameter, one scalar out.
fn make_signature<M: ClifModule>(
    module: &M,
    function: &IrFunction,
) -> cranelift::prelude::Signature {
    let mut signature = module.make_signature();
    for _ in &function.params {
        signature.params.push(AbiParam::new(types::I32));
    }
    signature.returns.push(AbiParam::new(types::I32));
    signature
}

fn declare_printf<M: ClifModule>(module: &mut M) -> Result<FuncId, CompileError> {
    let pointer_ty = module.target_config().pointer_type();
    let mut signature = module.make_signature();
    signature.params.push(AbiParam::new(pointer_ty));
    signature.params.push(AbiParam::new(types::I32));
    signature.returns.push(AbiParam::new(types::I32));

    module
        .declare_function(ir::PRINTF, Linkage::Import, &signature)
        .map_err(module_error)
}

fn build_native_isa() -> Result<OwnedTargetIsa, CompileError> {
    let mut flags = settings::builder();
    flags.set("is_pic", "true").map_err(|err| {
        CompileError::BackendError(format!("failed to set Cranelift flag: {}", err))
    })?;

    let isa_builder = cranelift_native::builder().map_err(|msg| {
        CompileError::BackendError(format!("host machine is not supported by Cranelift: {}", msg))
    })?;

    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(module_error)
}

fn module_error(err: impl std::fmt::Display) -> CompileError {
    CompileError::BackendError(err.to_string())
}
