mod endpoint;
mod fake_backend;
mod session;
mod tcp_backend;

pub use self::endpoint::{DEFAULT_PORT, Endpoint};
pub use self::fake_backend::{FakeCounters, FakeSwitch, Fault, FaultKind, FaultStage};
pub use self::session::{DeviceSession, SessionConnector, SwitchLayout, SwitchProperties};
pub use self::tcp_backend::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, TcpConnector};
