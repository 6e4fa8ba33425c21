// Allow some clippy lints for wire layouts
#![allow(clippy::too_many_arguments)]
#![allow(clippy::upper_case_acronyms)]

pub mod account;
pub mod config;
pub mod crypto;
pub mod derive;
pub mod program;
pub mod time;
pub mod transaction;
