pub mod config;
pub mod errors;
pub mod export;
pub mod gateway;
pub mod session;
pub mod ticker;
pub mod upload;
pub mod video;

pub use config::{GatewayConfig, SessionConfig};
pub use errors::{friendly_error_message, FailureKind, SessionFailure};
pub use export::{export_gallery, ExportReport};
pub use gateway::{DryrunGateway, GenerationGateway, HttpGateway};
pub use session::{Outcome, SessionState, TryOnSession};
pub use upload::UploadFile;
pub use video::{VideoHandle, VideoVault};
