pub mod config;
pub mod conn;
pub mod dial;
pub mod error;
pub mod proto;

pub use config::{Config, DialerConfig};
pub use conn::{Connection, Network};
pub use dial::{Dial, Dialer, DirectDialer, HttpProxyDialer, Socks5ProxyDialer, Strategy, Target};
pub use error::DialError;
