/// Native module contains implementations of core traits that talk to the
/// host directly: the `isolate` binary and the language scripts on disk.
pub mod isolate;
pub mod languages;
