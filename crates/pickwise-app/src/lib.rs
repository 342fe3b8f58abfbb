// Library root: the command loop and its helpers, shared by the binary and
// the integration tests.

pub mod app;
pub mod command;
pub mod import;
