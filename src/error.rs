use thiserror::Error;

/// Errores de dominio del bot de música.
///
/// Los errores por track (resolución o reproducción) nunca detienen la
/// sesión: se reportan al canal de texto y la cola avanza al siguiente.
#[derive(Debug, Error)]
pub enum MusicError {
    #[error("URL inválida: {0}")]
    InvalidUrl(String),

    #[error("no se pudo resolver la fuente: {0}")]
    Resolution(String),

    #[error("no se pudo reproducir {0}")]
    Playback(String),

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("no hay conexión de voz activa")]
    NotConnected,
}
