use mlua::prelude::*;

/// Trait for Lablink Lua modules.
///
/// Each module exposes one capability to downloaded programs. Modules must
/// have a unique identifier and register their functions into the Lua
/// global scope under that identifier.
///
/// # Example
///
/// ```rust
/// use lablink_lua::LabModule;
/// use mlua::prelude::*;
///
/// struct ClockModule;
///
/// impl LabModule for ClockModule {
///     fn id(&self) -> &'static str {
///         "clock"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("ticks", lua.create_function(|_, ()| Ok(0))?)?;
///         lua.globals().set(self.id(), table)?;
///         Ok(())
///     }
/// }
/// ```
pub trait LabModule: Send + Sync {
    /// Returns the unique identifier for this module.
    ///
    /// This identifier is used as the global variable name in Lua. For
    /// example, if `id()` returns `"brick"`, programs call
    /// `brick.function_name()`.
    ///
    /// # Requirements
    /// - Must be a valid Lua identifier (alphanumeric + underscore, no leading digit)
    /// - Must be unique across all modules
    fn id(&self) -> &'static str;

    /// Registers this module's functions and values into the Lua context.
    ///
    /// # Errors
    /// Returns `LuaError` if registration fails
    fn register(&self, lua: &Lua) -> LuaResult<()>;
}

/// Registry for managing Lablink modules
///
/// The executor builds one registry per run and loads it into a fresh
/// sandbox.
pub struct ModuleRegistry {
    modules: Vec<Box<dyn LabModule>>,
}

impl ModuleRegistry {
    /// Creates a new empty module registry
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Registers a module
    ///
    /// # Panics
    /// Panics if a module with the same ID is already registered
    pub fn register<M: LabModule + 'static>(&mut self, module: M) {
        let id = module.id();
        if self.modules.iter().any(|m| m.id() == id) {
            panic!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
    }

    /// Gets a module by its ID
    pub fn get(&self, id: &str) -> Option<&dyn LabModule> {
        self.modules
            .iter()
            .find(|m| m.id() == id)
            .map(|m| m.as_ref())
    }

    /// Registers all modules into a Lua context
    ///
    /// # Errors
    /// Returns the first error encountered during registration
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestModule;

    impl LabModule for TestModule {
        fn id(&self) -> &'static str {
            "test"
        }

        fn register(&self, lua: &Lua) -> LuaResult<()> {
            let table = lua.create_table()?;
            table.set("value", 42)?;
            lua.globals().set(self.id(), table)?;
            Ok(())
        }
    }

    #[test]
    fn test_module_registration() {
        let mut registry = ModuleRegistry::new();
        registry.register(TestModule);

        assert!(registry.get("test").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_duplicate_registration() {
        let mut registry = ModuleRegistry::new();
        registry.register(TestModule);
        registry.register(TestModule);
    }

    #[test]
    fn test_register_all() {
        let mut registry = ModuleRegistry::new();
        registry.register(TestModule);

        let lua = Lua::new();
        registry.register_all(&lua).unwrap();
        let value: i32 = lua.load("return test.value").eval().unwrap();
        assert_eq!(value, 42);
    }
}
