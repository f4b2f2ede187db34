//! TCP Relay
//!
//! Accepts connections on one local address and relays each to one remote address.
//! Outbound traffic can be inspected and rewritten with regular expressions, and the
//! remote side can be spoken to over TLS so the patterns see cleartext.

pub mod config;
pub mod counters;
pub mod dispatcher;
pub mod logger;
pub mod pattern;
pub mod relay;
pub mod stream;
pub mod tls;

// Re-export commonly used types and functions
pub use config::{CONFIG_FILE, Config, ConfigError, Link, Settings, load_config};
pub use counters::Counters;
pub use dispatcher::{Accept, DispatchError, Dispatcher, ResolvedLink, run};
pub use logger::{Logger, init_tracing};
pub use pattern::{Matcher, REPLACE_DELIMITER, Replacer, compile_matcher, compile_replacer};
pub use relay::{BUFFER_SIZE, Relay};
pub use stream::RemoteStream;
pub use tls::TlsTarget;
