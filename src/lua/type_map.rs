//! Type conversion registry.
//!
//! [`Marshal`] maps a host type to its script representation: a runtime tag,
//! a non-destructive check of the top of the stack, a push, and a construct
//! that reads the top value back. [`MarshalMulti`] extends this to fixed-arity
//! tuples for argument lists and return values.

use super::context::Context;
use super::table::{Table, Value};
use super::types::{Boolean, HostFunction, Number, Opaque, String, ValueTag};
use crate::fatal::fatal_assert;
use crate::{Error, Result};

/// A host type that can cross the script boundary.
pub trait Marshal: Sized {
    /// Runtime tag of values of this type.
    const TAG: ValueTag;

    /// Whether the top of the stack can be read as this type. Never mutates
    /// the stack.
    fn check(ctx: &Context<'_>) -> bool;

    /// Push `value` onto the stack.
    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()>;

    /// Read the top of the stack.
    ///
    /// Does not pop, except for types whose construction consumes the slot
    /// (tables). Callers compare the stack depth before and after to decide
    /// whether to pop.
    fn construct(ctx: &mut Context<'_>) -> Result<Self>;

    /// Wrap into table storage.
    fn into_value(self) -> Value;

    /// Borrow out of table storage, `None` if the stored tag differs.
    fn from_value(value: &Value) -> Option<&Self>;

    fn from_value_mut(value: &mut Value) -> Option<&mut Self>;
}

fn mismatch(expected: ValueTag, ctx: &Context<'_>) -> Error {
    let found = match ctx.type_of_top() {
        Some(ValueTag::String) if ctx.to_string().is_none() => "non-UTF-8 string",
        _ => ctx.describe_top(),
    };
    Error::TypeMismatch(format!("expected {expected}, found {found}"))
}

impl Marshal for Number {
    const TAG: ValueTag = ValueTag::Number;

    fn check(ctx: &Context<'_>) -> bool {
        ctx.to_number().is_some()
    }

    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()> {
        ctx.push_number(*value);
        Ok(())
    }

    fn construct(ctx: &mut Context<'_>) -> Result<Self> {
        ctx.to_number().ok_or_else(|| mismatch(Self::TAG, ctx))
    }

    fn into_value(self) -> Value {
        Value::Number(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }
}

impl Marshal for String {
    const TAG: ValueTag = ValueTag::String;

    /// Strings that are valid UTF-8, and numbers.
    fn check(ctx: &Context<'_>) -> bool {
        ctx.to_string().is_some()
    }

    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()> {
        ctx.push_string(value)
    }

    fn construct(ctx: &mut Context<'_>) -> Result<Self> {
        ctx.to_string().ok_or_else(|| mismatch(Self::TAG, ctx))
    }

    fn into_value(self) -> Value {
        Value::String(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Marshal for Boolean {
    const TAG: ValueTag = ValueTag::Boolean;

    fn check(ctx: &Context<'_>) -> bool {
        ctx.type_of_top() == Some(ValueTag::Boolean)
    }

    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()> {
        ctx.push_boolean(*value);
        Ok(())
    }

    fn construct(ctx: &mut Context<'_>) -> Result<Self> {
        Ok(ctx.to_boolean())
    }

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl Marshal for HostFunction {
    const TAG: ValueTag = ValueTag::Function;

    /// True only for functions that wrap a host function.
    fn check(ctx: &Context<'_>) -> bool {
        ctx.to_host_function().is_some()
    }

    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()> {
        ctx.push_function(*value)
    }

    fn construct(ctx: &mut Context<'_>) -> Result<Self> {
        ctx.to_host_function().ok_or_else(|| {
            Error::TypeMismatch(format!(
                "expected host function, found {}",
                match ctx.type_of_top() {
                    Some(ValueTag::Function) => "script function",
                    _ => ctx.describe_top(),
                }
            ))
        })
    }

    fn into_value(self) -> Value {
        Value::Function(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }
}

impl Marshal for Table {
    const TAG: ValueTag = ValueTag::Table;

    fn check(ctx: &Context<'_>) -> bool {
        ctx.type_of_top() == Some(ValueTag::Table)
    }

    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()> {
        value.to_stack(ctx)
    }

    /// Drains the table, popping it.
    fn construct(ctx: &mut Context<'_>) -> Result<Self> {
        Table::from_context(ctx)
    }

    fn into_value(self) -> Value {
        Value::Table(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }
}

impl Marshal for Opaque {
    const TAG: ValueTag = ValueTag::Opaque;

    fn check(ctx: &Context<'_>) -> bool {
        ctx.to_opaque().is_some()
    }

    fn push(ctx: &mut Context<'_>, value: &Self) -> Result<()> {
        ctx.push_opaque(*value);
        Ok(())
    }

    fn construct(ctx: &mut Context<'_>) -> Result<Self> {
        ctx.to_opaque().ok_or_else(|| mismatch(Self::TAG, ctx))
    }

    fn into_value(self) -> Value {
        Value::Opaque(self)
    }

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Opaque(p) => Some(p),
            _ => None,
        }
    }

    fn from_value_mut(value: &mut Value) -> Option<&mut Self> {
        match value {
            Value::Opaque(p) => Some(p),
            _ => None,
        }
    }
}

/// How a failed check is treated while popping a run of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// Nil or a type mismatch is a programming error (host function arguments).
    Strict,
    /// A type mismatch is reported as [`Error::TypeMismatch`] (script return values).
    Checked,
}

/// Pop one value of type `T` from the top of the stack.
///
/// Pops only if construction did not already consume the slot.
pub(crate) fn pop_slot<T: Marshal>(ctx: &mut Context<'_>, mode: Extraction) -> Result<T> {
    match mode {
        Extraction::Strict => {
            fatal_assert!(!ctx.is_absent(), "argument is nil");
            fatal_assert!(
                T::check(ctx),
                "type mismatch: expected {}, found {}",
                T::TAG,
                ctx.describe_top()
            );
        }
        Extraction::Checked => {
            if !T::check(ctx) {
                return Err(mismatch(T::TAG, ctx));
            }
        }
    }

    let depth = ctx.top();
    let value = T::construct(ctx)?;
    if ctx.top() == depth {
        ctx.pop(1);
    }
    Ok(value)
}

/// A fixed-arity sequence of marshaled values.
///
/// Elements are pushed first to last, so the last element ends up on top.
/// Popping therefore runs last to first, and stops at the first slot that
/// fails to check, leaving the remaining slots on the stack.
pub trait MarshalMulti: Sized {
    const COUNT: usize;

    fn push_all(&self, ctx: &mut Context<'_>) -> Result<()>;

    fn pop_all(ctx: &mut Context<'_>, mode: Extraction) -> Result<Self>;
}

impl MarshalMulti for () {
    const COUNT: usize = 0;

    fn push_all(&self, _ctx: &mut Context<'_>) -> Result<()> {
        Ok(())
    }

    fn pop_all(_ctx: &mut Context<'_>, _mode: Extraction) -> Result<Self> {
        Ok(())
    }
}

macro_rules! impl_marshal_multi {
    ($count:expr; $($fwd:ident),+; $($rev:ident),+) => {
        impl<$($fwd: Marshal),+> MarshalMulti for ($($fwd,)+) {
            const COUNT: usize = $count;

            #[allow(non_snake_case)]
            fn push_all(&self, ctx: &mut Context<'_>) -> Result<()> {
                let ($($fwd,)+) = self;
                $( <$fwd as Marshal>::push(ctx, $fwd)?; )+
                Ok(())
            }

            #[allow(non_snake_case)]
            fn pop_all(ctx: &mut Context<'_>, mode: Extraction) -> Result<Self> {
                $( let $rev = pop_slot::<$rev>(ctx, mode)?; )+
                Ok(($($fwd,)+))
            }
        }
    };
}

impl_marshal_multi!(1; A; A);
impl_marshal_multi!(2; A, B; B, A);
impl_marshal_multi!(3; A, B, C; C, B, A);
impl_marshal_multi!(4; A, B, C, D; D, C, B, A);
impl_marshal_multi!(5; A, B, C, D, E; E, D, C, B, A);
impl_marshal_multi!(6; A, B, C, D, E, F; F, E, D, C, B, A);
impl_marshal_multi!(7; A, B, C, D, E, F, G; G, F, E, D, C, B, A);
impl_marshal_multi!(8; A, B, C, D, E, F, G, H; H, G, F, E, D, C, B, A);
