pub mod browser;
pub mod http;
pub mod proxy;

pub use browser::{ChromeLauncher, Driver, DriverOptions};
pub use http::HttpClient;
pub use proxy::{ProxyPool, ProxySelection};
