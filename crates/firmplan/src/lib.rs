//! Command-line helpers over `firmplan-autogen`.
pub mod tools;
