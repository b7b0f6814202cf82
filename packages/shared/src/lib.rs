//! Utilities shared by the Tobira relay server and client binaries.

pub mod logger;
pub mod time;
