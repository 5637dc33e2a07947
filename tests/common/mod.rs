//! Test helpers for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;

use sl_lua::{Context, Number, Result, Runtime, Table};

/// Path to a file under `tests/fixtures`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Load `tests/fixtures/test_a.lua`.
pub fn load_test_a() -> Runtime {
    Runtime::load(fixture("test_a.lua")).unwrap()
}

/// `Global.CppAddTwo(x)`
pub fn cpp_add_two(ctx: &mut Context<'_>) -> Result<usize> {
    let (x,) = ctx.args::<(Number,)>()?;
    ctx.returns((x + 2.0,))
}

/// `object:addToValue(amount)`, returns the updated object.
pub fn add_to_value(ctx: &mut Context<'_>) -> Result<usize> {
    let (mut object, amount) = ctx.args::<(Table, Number)>()?;
    *object.get_mut::<Number>("value") += amount;
    ctx.returns((object,))
}
