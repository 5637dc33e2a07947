//! Function call protocol between host and script.

use tracing::debug;

use super::context::Context;
use super::type_map::{pop_slot, Extraction, Marshal, MarshalMulti};
use super::types::{HostFunction, ValueTag};
use crate::fatal::fatal_assert;
use crate::{Error, Result};

impl<'lua> Context<'lua> {
    /// Extract the arguments of a host function call, in declared order.
    ///
    /// The stack must hold exactly as many values as `A` declares, none of
    /// them nil, each of the declared type. Anything else is a signature
    /// mismatch between script and host and is fatal.
    ///
    /// ```ignore
    /// fn add_two(ctx: &mut Context<'_>) -> Result<usize> {
    ///     let (x,) = ctx.args::<(Number,)>()?;
    ///     ctx.returns((x + 2.0,))
    /// }
    /// ```
    pub fn args<A: MarshalMulti>(&mut self) -> Result<A> {
        fatal_assert!(
            self.top() == A::COUNT,
            "host function takes {} arguments but was called with {}",
            A::COUNT,
            self.top()
        );
        A::pop_all(self, Extraction::Strict)
    }

    /// Push the return values of a host function and report their count.
    pub fn returns<R: MarshalMulti>(&mut self, values: R) -> Result<usize> {
        values.push_all(self)?;
        Ok(R::COUNT)
    }

    /// Read a global variable as `T`.
    ///
    /// The global's runtime tag must be exactly `T`'s. An unset global is a
    /// type mismatch too.
    pub fn get_global<T: Marshal>(&mut self, name: &str) -> Result<T> {
        self.balanced(|ctx| {
            ctx.push_global(name)?;
            if ctx.type_of_top() != Some(T::TAG) {
                let found = ctx.describe_top();
                ctx.pop(1);
                return Err(Error::TypeMismatch(format!(
                    "global \"{name}\" is {found}, expected {}",
                    T::TAG
                )));
            }

            let depth = ctx.top();
            let value = T::construct(ctx)?;
            if ctx.top() == depth {
                ctx.pop(1);
            }
            Ok(value)
        })
    }

    /// Assign a global variable.
    pub fn set_global<T: Marshal>(&mut self, name: &str, value: &T) -> Result<()> {
        self.balanced(|ctx| {
            T::push(ctx, value)?;
            ctx.pop_into_global(name)
        })
    }

    /// Call the global script function `name`.
    ///
    /// Arguments are pushed left to right. The results are checked against
    /// `R` and returned in declared order. Whatever the outcome, the stack is
    /// left at the depth it had before the call.
    pub fn run_function<A, R>(&mut self, name: &str, args: A) -> Result<R>
    where
        A: MarshalMulti,
        R: MarshalMulti,
    {
        let base = self.top();
        let result = self.balanced(|ctx| {
            ctx.push_global(name)?;
            if ctx.type_of_top() != Some(ValueTag::Function) {
                let found = ctx.describe_top();
                ctx.pop(1);
                return Err(Error::NotFunction(format!("global \"{name}\" is {found}")));
            }

            args.push_all(ctx)?;
            ctx.pcall(A::COUNT, R::COUNT)
                .map_err(Error::FunctionError)?;
            R::pop_all(ctx, Extraction::Checked)
        });

        fatal_assert!(
            self.top() == base,
            "call to {} left the stack at {}, expected {}",
            name,
            self.top(),
            base
        );
        result
    }

    /// Install `func` as `namespace.name`, creating the namespace table if needed.
    pub fn register_function(
        &mut self,
        namespace: &str,
        name: &str,
        func: HostFunction,
    ) -> Result<()> {
        self.balanced(|ctx| {
            ctx.push_global(namespace)?;
            if ctx.type_of_top() != Some(ValueTag::Table) {
                ctx.pop(1);
                ctx.new_table()?;
                ctx.pop_into_global(namespace)?;
                ctx.push_global(namespace)?;
            }
            if ctx.type_of_top() != Some(ValueTag::Table) {
                ctx.pop(1);
                return Err(Error::VariableDoesntExist(format!(
                    "namespace \"{namespace}\" could not be created"
                )));
            }

            ctx.push_string(name)?;
            ctx.push_function(func)?;
            ctx.set_table()?;
            ctx.pop(1);
            debug!("Registered host function {}.{}", namespace, name);
            Ok(())
        })
    }

    /// Pop one value of type `T` the way argument extraction does.
    pub fn pop_arg<T: Marshal>(&mut self) -> Result<T> {
        pop_slot(self, Extraction::Strict)
    }
}
