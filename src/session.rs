//! Compilation session.
//!
//! All state one compilation run accumulates lives here: the node factory,
//! the macro registry, the hook cache and the operator table. Nothing is
//! global, so independent sessions can run side by side in one process.

use crate::ast::{BinaryOp, NodeFactory};
use crate::config::EngineConfig;
use crate::errors::Result;
use crate::lowering::OperatorTable;
use crate::macros::std::std_module;
use crate::macros::{HookCache, MacroLoader, MacroRegistry, ModuleSource, ModuleTable};

#[derive(Debug)]
pub struct CompilationSession {
    pub config: EngineConfig,
    pub factory: NodeFactory,
    pub registry: MacroRegistry,
    pub hooks: HookCache,
    pub operators: OperatorTable,
}

impl CompilationSession {
    /// Creates a session that loads macro implementations from `source`.
    ///
    /// Fails when the configured operator table names an unknown operator.
    pub fn new(config: EngineConfig, source: impl ModuleSource + 'static) -> Result<Self> {
        let operators = OperatorTable::from_config(&config.operators)?;
        Ok(Self {
            config,
            factory: NodeFactory::new(),
            registry: MacroRegistry::new(),
            hooks: HookCache::new(MacroLoader::new(source)),
            operators,
        })
    }

    /// Creates a session whose only implementations are the standard macros.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use kiln::config::EngineConfig;
    /// use kiln::session::CompilationSession;
    ///
    /// let mut session = CompilationSession::with_std(EngineConfig::default()).unwrap();
    /// let out = session
    ///     .compile_source("a.kn", "macro function stringify() {}\nconst s = stringify!(a + 1);")
    ///     .unwrap();
    /// assert!(out.ends_with("const s = \"a + 1\";\n"));
    /// ```
    pub fn with_std(config: EngineConfig) -> Result<Self> {
        Self::new(config, ModuleTable::new().with_fallback(std_module()))
    }

    /// Lowers `op` to a call of `callee` in every file compiled afterwards.
    pub fn register_operator(&mut self, op: BinaryOp, callee: impl Into<String>) {
        self.operators.register(op, callee);
    }

    /// Forgets every declaration, binding and cached hook.
    ///
    /// Node ids keep counting up, so trees parsed before the reset can never
    /// collide with trees parsed after it.
    pub fn reset(&mut self) {
        self.registry.reset();
        self.hooks.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::KilnError;
    use std::collections::BTreeMap;

    #[test]
    fn operators_come_from_config() {
        let mut operators = BTreeMap::new();
        operators.insert("*".to_string(), "Mat.mul".to_string());
        let config = EngineConfig {
            operators,
            ..EngineConfig::default()
        };
        let session = CompilationSession::with_std(config).unwrap();
        assert_eq!(session.operators.get(BinaryOp::Mul), Some("Mat.mul"));
    }

    #[test]
    fn bad_operator_config_fails_session() {
        let mut operators = BTreeMap::new();
        operators.insert("=>".to_string(), "X".to_string());
        let config = EngineConfig {
            operators,
            ..EngineConfig::default()
        };
        assert!(matches!(
            CompilationSession::with_std(config),
            Err(KilnError::Config { .. })
        ));
    }
}
