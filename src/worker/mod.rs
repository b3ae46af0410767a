//! Worker process supervision: spawning, NDJSON framing, stdout reading, and
//! exit monitoring. The bridge actor composes these pieces and owns the
//! resulting pipes exclusively.

pub mod codec;
pub mod reader;
pub mod spawner;

pub use codec::{LineCodec, MAX_LINE_BYTES};
pub use reader::{run_reader, ReaderSignal};
pub use spawner::{monitor_exit, resolve_executable, spawn_worker, ExitNotice, WorkerConnection};
