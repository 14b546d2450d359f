//! `TypedFunction`/`TypedStaticVariable` → `RuntimeStatic` (§4.6 "Function
//! generation", "Static variable generation"). This is where a function's
//! own [`crate::builder::Builder`] is created and its body fully lowered
//! into blocks; a static variable needs no `Builder` at all, since its
//! only runtime content is a single folded `IrConstantValue`.
//!
//! Neither entry point handles `extern`-tagged declarations — those never
//! reach `talc-lower` at all. `talc-pipeline`'s entry-seed driver builds
//! their `RuntimeStatic` directly from the resolved signature/type, with
//! empty blocks and no initializer, since an external declaration has no
//! body to type-check or lower in the first place.

use std::rc::Rc;

use talc_check::{Builtins, CompilerContext, Scheduler};
use talc_ir::{FunctionStatic, InstructionKind, IrType, StaticVariableStatic};
use talc_tir::{TypedFunction, TypedStaticVariable};
use talc_types::TypeKind;

use crate::builder::LocalSlot;
use crate::expr::FnLower;
use crate::shared::LowerShared;

/// Lower one non-external function's body to a [`FunctionStatic`] (§4.6).
/// Parameters are bound as plain registers, allocated in declaration order
/// before anything else — the S1 scenario's literal `Return(param0)`
/// depends on the first parameter landing on register 0.
pub fn lower_function(ctx: &mut CompilerContext, scheduler: &mut Scheduler, builtins: &Builtins, shared: &mut LowerShared, function: &TypedFunction, name: Rc<str>) -> FunctionStatic {
    let (parameter_tys, returns, calling_convention) = match ctx.types.get(function.ty).clone() {
        TypeKind::Function { parameters, returns, calling_convention } => (parameters, returns, calling_convention),
        other => unreachable!("a function's own type must be TypeKind::Function: {other:?}"),
    };
    let mut lower = FnLower::new(ctx, scheduler, builtins, shared, function.range);
    log::debug!("lowering function `{name}`");

    let mut ir_parameters = Vec::with_capacity(function.parameters.len());
    for (param_name, &param_ty) in function.parameters.iter().zip(parameter_tys.iter()) {
        let ir_ty = lower.ir_ty(param_ty);
        let register = lower.builder.fresh_register();
        lower.builder.bind_local(param_name.clone(), LocalSlot::Register { register, ty: ir_ty.clone() });
        ir_parameters.push(ir_ty);
    }

    lower.lower_body(&function.body);

    // §4.6 "every block must end in a terminator" (P5): `TypeFunctionBody`'s
    // `MissingTerminalReturn` check only rejects a wholly empty body, not a
    // body whose control flow falls off the end (an `if` with no `else`,
    // say), so lowering closes any such block itself rather than relying on
    // the checker to have proven every path returns.
    if !lower.builder.current_is_terminated() {
        lower.builder.push(InstructionKind::Return { value: None }, function.range);
    }

    let has_return = !returns.is_empty();
    let return_type = if !has_return {
        None
    } else if returns.len() == 1 {
        Some(lower.ir_ty(returns[0]))
    } else {
        Some(IrType::struct_of(returns.iter().map(|&t| lower.ir_ty(t)).collect::<Vec<_>>()))
    };

    FunctionStatic {
        parameters: ir_parameters,
        has_return,
        return_type,
        is_external: false,
        blocks: lower.builder.blocks,
        external_libraries: function.external_libraries.clone(),
        calling_convention,
        debug_scopes: lower.builder.debug_scopes,
    }
}

/// Lower one non-external static variable's initializer to a
/// [`StaticVariableStatic`] (§4.6). Unlike a function body, a static
/// variable's initializer is required to already be a compile-time
/// constant (there is no load-time code to run it), so this never needs a
/// live `Builder` — it folds the typed initializer directly via the same
/// constant-folding helper `GenerateFunction` lowering uses for promoted
/// aggregate constants.
pub fn lower_static_variable(ctx: &mut CompilerContext, scheduler: &mut Scheduler, builtins: &Builtins, shared: &mut LowerShared, variable: &TypedStaticVariable) -> StaticVariableStatic {
    let lower = FnLower::new(ctx, scheduler, builtins, shared, variable.range);
    let ir_ty = lower.ir_ty(variable.ty);
    let initial_value = variable.initializer.as_ref().map(|init| {
        let const_id = init.value.as_const().expect("a static variable initializer is always a compile-time constant by the time GenerateStaticVariable runs");
        let value = lower.ctx.consts.get(const_id).clone();
        lower.const_to_ir_constant(variable.ty, &value)
    });
    StaticVariableStatic { ty: ir_ty, is_external: false, external_libraries: variable.external_libraries.clone(), initial_value }
}
