mod choice;
mod config;
mod emit;
mod environment;
pub mod eval;
mod generator;
mod obfuscate;
mod permute;
mod script;
mod symbol;
mod syntax;

pub use crate::choice::WeightedTable;
pub use crate::config::{ConfigError, GoalKind, ObfuscationConfig, ScriptConfig};
pub use crate::emit::{ensure_eol, Emit};
pub use crate::environment::Environment;
pub use crate::generator::{Generator, PredicateForm, ScalarType, ValueForm, RNG};
pub use crate::obfuscate::Transform;
pub use crate::permute::{assign_ranks, next_arrangement, Enumeration, Region};
pub use crate::script::{Script, Variant};
pub use crate::symbol::{Symbol, SymbolTable};
pub use crate::syntax::{NodeId, Syntax, SyntaxKind, SyntaxTree};

/// Primary program for `seed`
pub fn generate_with_config(config: &ScriptConfig, seed: u64) -> Result<String, ConfigError> {
    let mut gen = Generator::new(config.obfuscation, seed)?;
    let script = Script::build(&mut gen, config);
    Ok(script.emit())
}

pub fn generate(seed: u64) -> Result<String, ConfigError> {
    generate_with_config(&ScriptConfig::default(), seed)
}
