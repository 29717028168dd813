/// Errors surfaced by the control layer.
///
/// Per-tick failures inside the loops are logged and recovered from, so the
/// only thing that escapes is a loop configuration the loops cannot run with.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Loop configuration is unusable.
    #[error("invalid loop config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ControlError>;
