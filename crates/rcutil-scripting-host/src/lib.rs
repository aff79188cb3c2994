/// Host-side dispatch of events and timers to rcutil scripts
///
/// Scripts are external processes reached through a [`Transport`]. They
/// register callbacks for fixed lifecycle events or for timers they schedule,
/// and the host tick loop drives delivery through
/// [`EventDispatcher::on_gametick_start`] and [`EventDispatcher::on_gametick_end`].
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod script;
pub mod timer;
pub mod transport;

pub use config::{ConfigLoadError, RcutilConfig, ScriptConfig, TimerConfig};
pub use dispatcher::{no_args, EventDispatcher};
pub use error::{ProtocolError, TransportError};
pub use registry::ScriptRegistry;
pub use script::{Script, ScriptHandle};
pub use timer::{Tick, Timer, TimerKind, TimerScheduler};
pub use transport::{LoggingTransport, RequestIds, RpcRequest, RpcResponse, Transport};

pub use rcutil_events::{Event, FixedEvent, TickPhase, TimerId};
