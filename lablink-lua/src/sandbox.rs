//! Lua sandbox creation
//!
//! Downloaded programs run in a restricted Lua state that prevents access to
//! filesystem I/O, network access, process execution and dynamic code
//! loading. Capability modules (`brick`, `log`) are registered by the caller
//! after creating the sandbox.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};

/// Create a restricted Lua sandbox
///
/// This sandbox includes only basic Lua functionality (tables, strings,
/// math, coroutines) and does NOT include any I/O capabilities or the
/// ability to load external code.
///
/// # Security
/// This sandbox prevents:
/// - Network access
/// - File system access
/// - Process execution
/// - Loading code via `require`, `dofile`, `loadfile` or `load`
///
/// # Example
/// ```no_run
/// use lablink_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// lua.load("result = 6 * 7").exec()?;
/// let result: i64 = lua.globals().get("result")?;
/// assert_eq!(result, 42);
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // Only allow: TABLE, STRING, MATH, COROUTINE
    // Explicitly exclude: IO, OS, PACKAGE, DEBUG
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        LuaOptions::default(),
    )?;

    let globals = lua.globals();
    for name in ["require", "dofile", "loadfile", "load"] {
        globals.set(name, mlua::Nil)?;
    }

    Ok(lua)
}
