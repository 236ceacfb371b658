pub mod builtin;
pub mod config;
pub mod context;
pub mod detect;
pub mod error;
pub mod io;
pub mod llm;
pub mod lock;
pub mod machine;
pub mod markdown;
pub mod materialize;
pub mod paths;
pub mod plan;
pub mod registry;
pub mod resolver;
pub mod rule;
pub mod session;
pub mod stack;
pub mod types;

pub use error::{ErrorKind, PhaseError, Result};
