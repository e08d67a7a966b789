//! Cooperative cancellation of a running program

use mlua::Lua;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Error message raised inside Lua when a program is cancelled
pub const CANCELLED: &str = "program cancelled by operator";

// Re-raises the cancellation after every protected call so a program
// cannot swallow it. Runs once per sandbox, before user code.
const GUARD_PROTECTED_CALLS: &str = r#"
local check = ...
local pack, unpack = table.pack, table.unpack
local pcall_, xpcall_, resume_ = pcall, xpcall, coroutine.resume

local function finish(results)
    check()
    return unpack(results, 1, results.n)
end

pcall = function(...) return finish(pack(pcall_(...))) end
xpcall = function(...) return finish(pack(xpcall_(...))) end
coroutine.resume = function(...) return finish(pack(resume_(...))) end
"#;

/// Shared flag telling a running program to stop at its next safe point
///
/// Safe points are the instruction hook installed by the executor and every
/// blocking `brick` call. Raising the signal is sticky for the lifetime of
/// one run; a new run gets a new signal.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    raised: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation
    ///
    /// Returns `true` only for the call that actually raised the signal.
    pub fn raise(&self) -> bool {
        !self.raised.swap(true, Ordering::SeqCst)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Error to return from Lua callbacks once the signal is raised
    pub fn check(&self) -> mlua::Result<()> {
        if self.is_raised() {
            Err(mlua::Error::RuntimeError(CANCELLED.to_string()))
        } else {
            Ok(())
        }
    }

    /// Makes cancellation uncatchable inside `lua`
    ///
    /// `pcall`, `xpcall` and `coroutine.resume` are replaced with versions
    /// that raise [`CANCELLED`] on return once the signal is raised.
    pub fn guard(&self, lua: &Lua) -> mlua::Result<()> {
        let signal = self.clone();
        let check = lua.create_function(move |_, ()| signal.check())?;

        lua.load(GUARD_PROTECTED_CALLS)
            .set_name("=guard")
            .call::<()>(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_once() {
        let signal = AbortSignal::new();
        let shared = signal.clone();
        assert!(!signal.is_raised());
        assert!(signal.check().is_ok());

        assert!(shared.raise());
        assert!(!shared.raise());
        assert!(signal.is_raised());
        assert!(signal.check().is_err());
    }

    fn guarded(signal: &AbortSignal) -> Lua {
        let lua = crate::sandbox::create_sandbox().unwrap();
        signal.guard(&lua).unwrap();
        lua
    }

    #[test]
    fn test_guarded_calls_behave_normally() {
        let lua = guarded(&AbortSignal::new());

        let (ok, value): (bool, i64) = lua
            .load("return pcall(function(a, b) return a + b end, 2, 3)")
            .eval()
            .unwrap();
        assert!(ok);
        assert_eq!(value, 5);

        let (ok, message): (bool, String) = lua
            .load("return xpcall(function() error('boom', 0) end, function(e) return 'handled ' .. e end)")
            .eval()
            .unwrap();
        assert!(!ok);
        assert_eq!(message, "handled boom");

        let (ok, value): (bool, i64) = lua
            .load("local co = coroutine.create(function(x) return x * 2 end) return coroutine.resume(co, 21)")
            .eval()
            .unwrap();
        assert!(ok);
        assert_eq!(value, 42);
    }

    #[test]
    fn test_cancellation_escapes_protected_calls() {
        let signal = AbortSignal::new();
        let lua = guarded(&signal);
        let raise = {
            let signal = signal.clone();
            lua.create_function(move |_, ()| {
                signal.raise();
                signal.check()
            })
            .unwrap()
        };
        lua.globals().set("cancel", raise).unwrap();

        for program in [
            "pcall(cancel) done = true",
            "xpcall(cancel, function(e) return e end) done = true",
            "coroutine.resume(coroutine.create(cancel)) done = true",
            "pcall(pcall, cancel) done = true",
        ] {
            let err = lua.load(program).exec().unwrap_err();
            assert!(err.to_string().contains(CANCELLED), "{}: {}", program, err);
            let done: Option<bool> = lua.globals().get("done").unwrap();
            assert!(done.is_none(), "{} kept running", program);
        }
    }
}
