//! The driver's non-main pieces, split out of the binary so integration
//! tests can exercise the prelude and the REPL line-handling logic
//! directly (mirrors the teacher's compiler crate, which is both a
//! library and a binary over the same sources).

pub mod prelude;
pub mod repl;
