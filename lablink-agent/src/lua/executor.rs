//! Lua executor
//!
//! Runs one downloaded program to completion in a fresh sandbox:
//! - Creating the sandbox and registering the `brick` and `log` modules
//! - Installing the cancellation hook and the memory cap
//! - Compiling, running and reading back the `result` slot

use anyhow::{Context, Result};
use lablink_core::domain::execution::ExecutionResult;
use lablink_core::hal::Hal;
use lablink_lua::{AbortSignal, BrickModule, LogModule, ModuleRegistry, create_sandbox};
use mlua::{HookTriggers, Lua, Value, VmState};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::lua::sinks::TracingLogSink;

/// Instructions between two cancellation checks
const HOOK_INSTRUCTIONS: u32 = 1000;

/// Global a program writes its exit value to
const RESULT_SLOT: &str = "result";

/// Default cap on the memory a program may allocate
pub const DEFAULT_MEMORY_LIMIT: usize = 16 * 1024 * 1024;

/// Lua executor
///
/// Blocking; callers run it on a worker thread.
pub struct LuaExecutor {
    hal: Arc<dyn Hal>,
    memory_limit: usize,
}

impl LuaExecutor {
    pub fn new(hal: Arc<dyn Hal>) -> Self {
        Self {
            hal,
            memory_limit: DEFAULT_MEMORY_LIMIT,
        }
    }

    /// Caps the Lua heap of each run at `bytes`
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    /// Executes `source` and classifies the outcome
    ///
    /// Never fails: compile, runtime and out-of-memory errors become
    /// [`ExecutionResult::Fault`]. Once `signal` is raised the run is a
    /// [`ExecutionResult::SoftCancel`], whatever the program did with the error.
    pub fn run(&self, name: &str, source: &str, signal: &AbortSignal) -> ExecutionResult {
        let outcome = self.try_run(name, source, signal);
        if signal.is_raised() {
            info!("program {} cancelled", name);
            return ExecutionResult::SoftCancel;
        }

        match outcome {
            Ok(value) => {
                info!("execution finished: result = {}", value);
                ExecutionResult::Success(value)
            }
            Err(e) => {
                error!("program {} failed: {:#}", name, e);
                ExecutionResult::Fault
            }
        }
    }

    fn try_run(&self, name: &str, source: &str, signal: &AbortSignal) -> Result<i32> {
        let lua = self.create_sandbox(signal)?;

        let program = lua
            .load(source)
            .set_name(name)
            .into_function()
            .context("Failed to compile program")?;

        lua.globals().set(RESULT_SLOT, 0)?;

        debug!("running program {}", name);
        program
            .call::<()>(())
            .context("Program execution failed")?;

        let value: Value = lua.globals().get(RESULT_SLOT)?;
        result_value(value)
    }

    /// Creates and configures a sandbox for one run
    fn create_sandbox(&self, signal: &AbortSignal) -> Result<Lua> {
        let lua = create_sandbox().context("Failed to create base sandbox")?;
        lua.set_memory_limit(self.memory_limit)
            .context("Failed to set memory limit")?;

        let mut registry = ModuleRegistry::new();
        registry.register(BrickModule::new(self.hal.clone(), signal.clone()));
        registry.register(LogModule::new(TracingLogSink::new()));
        registry
            .register_all(&lua)
            .context("Failed to register modules")?;
        signal
            .guard(&lua)
            .context("Failed to guard protected calls")?;

        let hook_signal = signal.clone();
        lua.set_hook(
            HookTriggers::new().every_nth_instruction(HOOK_INSTRUCTIONS),
            move |_lua, _debug| {
                hook_signal.check()?;
                Ok(VmState::Continue)
            },
        )?;

        Ok(lua)
    }
}

fn result_value(value: Value) -> Result<i32> {
    match value {
        Value::Nil => Ok(0),
        Value::Integer(i) => i32::try_from(i).context("result out of range"),
        Value::Number(n) if n.fract() == 0.0 && n >= i32::MIN as f64 && n <= i32::MAX as f64 => {
            Ok(n as i32)
        }
        other => anyhow::bail!("result must be an integer, got {}", other.type_name()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lablink_core::hal::{LedColor, SimulatedHal};
    use std::time::{Duration, Instant};

    fn executor() -> (LuaExecutor, Arc<SimulatedHal>) {
        let hal = Arc::new(SimulatedHal::new());
        (LuaExecutor::new(hal.clone()), hal)
    }

    #[test]
    fn test_result_slot() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();

        assert_eq!(
            executor.run("prog.lua", "result = 42", &signal),
            ExecutionResult::Success(42)
        );
        assert_eq!(
            executor.run("prog.lua", "local x = 1", &signal),
            ExecutionResult::Success(0)
        );
        assert_eq!(
            executor.run("prog.lua", "result = 6.0", &signal),
            ExecutionResult::Success(6)
        );
    }

    #[test]
    fn test_program_uses_capabilities() {
        let (executor, hal) = executor();
        let outcome = executor.run(
            "prog.lua",
            r#"
            brick.draw_text("hi", 0, 0)
            brick.led_on("orange")
            log.info("running")
            result = 3
        "#,
            &AbortSignal::new(),
        );

        assert_eq!(outcome, ExecutionResult::Success(3));
        assert_eq!(hal.display(), vec!["hi".to_string()]);
        assert_eq!(hal.led(), Some(LedColor::Orange));
    }

    #[test]
    fn test_faults() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();

        // syntax error
        assert_eq!(
            executor.run("prog.lua", "result = = 1", &signal),
            ExecutionResult::Fault
        );
        // runtime error
        assert_eq!(
            executor.run("prog.lua", "error('boom')", &signal),
            ExecutionResult::Fault
        );
        // sandbox violation
        assert_eq!(
            executor.run("prog.lua", "os.execute('true')", &signal),
            ExecutionResult::Fault
        );
        // non-integer result
        assert_eq!(
            executor.run("prog.lua", "result = 'done'", &signal),
            ExecutionResult::Fault
        );
        assert_eq!(
            executor.run("prog.lua", "result = 1.5", &signal),
            ExecutionResult::Fault
        );
    }

    #[test]
    fn test_busy_loop_is_cancelled() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();

        let raiser = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            raiser.raise();
        });

        let started = Instant::now();
        let outcome = executor.run("prog.lua", "while true do end", &signal);
        handle.join().unwrap();

        assert_eq!(outcome, ExecutionResult::SoftCancel);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    fn raise_after(signal: &AbortSignal, delay: Duration) -> std::thread::JoinHandle<()> {
        let raiser = signal.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            raiser.raise();
        })
    }

    #[test]
    fn test_protected_busy_loop_is_cancelled() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();
        let handle = raise_after(&signal, Duration::from_millis(100));

        let started = Instant::now();
        let outcome = executor.run(
            "prog.lua",
            "pcall(function() while true do end end) result = 1",
            &signal,
        );
        handle.join().unwrap();

        assert_eq!(outcome, ExecutionResult::SoftCancel);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_retrying_loop_is_cancelled() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();
        let handle = raise_after(&signal, Duration::from_millis(100));

        let started = Instant::now();
        let outcome = executor.run(
            "prog.lua",
            "while true do pcall(function() while true do end end) end",
            &signal,
        );
        handle.join().unwrap();

        assert_eq!(outcome, ExecutionResult::SoftCancel);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_protected_wait_is_cancelled() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();
        let handle = raise_after(&signal, Duration::from_millis(100));

        let outcome = executor.run(
            "prog.lua",
            "local ok, err = pcall(brick.wait, 60000) result = 5",
            &signal,
        );
        handle.join().unwrap();

        assert_eq!(outcome, ExecutionResult::SoftCancel);
    }

    #[test]
    fn test_allocation_bomb_is_a_fault() {
        let hal = Arc::new(SimulatedHal::new());
        let executor = LuaExecutor::new(hal).with_memory_limit(4 * 1024 * 1024);

        let outcome = executor.run(
            "prog.lua",
            r#"
            local hoard = {}
            while true do
                hoard[#hoard + 1] = string.rep("x", 1000000) .. #hoard
            end
        "#,
            &AbortSignal::new(),
        );
        assert_eq!(outcome, ExecutionResult::Fault);
    }

    #[test]
    fn test_wait_is_cancelled() {
        let (executor, _) = executor();
        let signal = AbortSignal::new();

        let raiser = signal.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            raiser.raise();
        });

        let outcome = executor.run("prog.lua", "brick.wait(60000) result = 5", &signal);
        handle.join().unwrap();

        assert_eq!(outcome, ExecutionResult::SoftCancel);
    }
}
