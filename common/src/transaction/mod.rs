mod args;
mod compiled;
mod error;
mod instruction;
mod message;

pub use args::*;
pub use compiled::*;
pub use error::{CompileError, RejectionKind};
pub use instruction::*;
pub use message::*;
