/// Host harness for rcutil: logging setup and a paced tick loop that drives
/// an [`rcutil_scripting_host::EventDispatcher`].
pub mod logging;
pub mod tick_loop;

pub use logging::init_logging;
pub use tick_loop::{run_tick_loop, TickLoopConfig};
