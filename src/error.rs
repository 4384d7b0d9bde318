// error.rs - player error taxonomy

use thiserror::Error;

/// Errors surfaced by the player core.
///
/// GPU and context failures are logged on the render thread and never cross it;
/// host-facing calls return the argument and lookup variants.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlayerError {
    #[error("Shader compile failed: {0}")]
    ShaderCompile(String),
    #[error("Shader link failed: {0}")]
    ShaderLink(String),
    #[error("Graphics context init failed: {0}")]
    ContextInit(String),
    #[error("Video source not connected")]
    VideoSourceNotConnected,
    #[error("Video source disconnected")]
    VideoSourceDisconnected,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Surface {0} not found")]
    SurfaceNotFound(u64),
    #[error("Present failed: {0}")]
    Present(String),
}

impl PlayerError {
    /// Numeric code reported to hosts that speak integer status codes.
    pub fn code(&self) -> i32 {
        match self {
            PlayerError::InvalidArgument(_) => -6001,
            PlayerError::SurfaceNotFound(_) => -6002,
            PlayerError::ContextInit(_) => -6003,
            PlayerError::ShaderCompile(_) => -6004,
            PlayerError::ShaderLink(_) => -6005,
            PlayerError::VideoSourceNotConnected => -6006,
            PlayerError::VideoSourceDisconnected => -6007,
            PlayerError::Present(_) => -6008,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
