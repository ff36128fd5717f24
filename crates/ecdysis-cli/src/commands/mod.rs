// crates/ecdysis-cli/src/commands/mod.rs
//
// Command module declarations for the Ecdysis CLI.

pub mod status;
pub mod upgrade;
