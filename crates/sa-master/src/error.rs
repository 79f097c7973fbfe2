use sa_audio::AudioError;
use sa_ir::{ConfigError, SlotKind};
use thiserror::Error;

/// Errors surfaced by the controller.
#[derive(Error, Debug)]
pub enum MasterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("invalid trial plan: {0}")]
    Plan(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("unknown asset `{0}`")]
    UnknownAsset(String),

    #[error("asset `{0}` is already loaded")]
    DuplicateAsset(String),

    #[error("assets cannot change once a session is configured")]
    AssetsFrozen,

    #[error("no session configured")]
    NotConfigured,

    #[error("a session is already configured")]
    AlreadyConfigured,

    #[error("offline rendering needs a session from configure_offline")]
    NotOffline,

    #[error("more {kind} cues than slots ({capacity})")]
    TooManyCues { kind: SlotKind, capacity: usize },
}
