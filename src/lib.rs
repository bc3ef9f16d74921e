pub mod classify;
pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod profiles;
pub mod retry;
pub mod router;
pub mod sanitize;
pub mod selector;
pub mod server;
pub mod transport;
pub mod translate;
pub mod validate;

pub use classify::{classify, BackendError};
pub use config::GatewayConfig;
pub use error::{GatewayError, Result, ToolError};
pub use gateway::Gateway;
pub use logging::SharedLogger;
pub use server::{build_router, AppState};
pub use transport::{BackendTarget, HttpTransport, Transport, TransportError};
pub use translate::BackendKind;
