//! The injected registry transport capability and its implementations.

pub mod auth;
pub mod fake;
pub mod http;
pub mod transport;

pub use auth::{EnvTokenProvider, TokenProvider};
pub use fake::FakeTransport;
pub use http::HttpTransport;
pub use transport::{ByteStream, ManifestHead, RegistryTransport, UploadSession};
