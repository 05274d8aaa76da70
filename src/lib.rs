pub use hotshell_logger as log;
pub use hotshell_memory as memory;
