pub mod youtube;

use anyhow::Result;
use serenity::model::id::UserId;
use songbird::input::{Input, YoutubeDl};
use tracing::{info, warn};

use crate::{audio::queue::Track, error::MusicError};

pub use youtube::YouTubeClient;

/// Resuelve URLs a tracks reproducibles.
///
/// Delega en un servicio externo (YouTube vía yt-dlp o Data API v3), así que
/// toda resolución es falible y puede tardar: nunca se asume instantánea.
pub struct Resolver {
    youtube: YouTubeClient,
    web: reqwest::Client,
}

impl Resolver {
    pub fn new(web: reqwest::Client, youtube_api_key: Option<String>) -> Self {
        Self {
            youtube: YouTubeClient::new(web.clone(), youtube_api_key),
            web,
        }
    }

    /// Resuelve una URL a un `Track` con su metadata.
    pub async fn resolve(&self, url: &str, requested_by: UserId) -> Result<Track, MusicError> {
        if !YouTubeClient::is_youtube_url(url) {
            return Err(MusicError::InvalidUrl(url.to_string()));
        }

        let metadata = self
            .youtube
            .get_info(url)
            .await
            .map_err(|e| MusicError::Resolution(format!("{e:#}")))?;

        info!("🎬 Resuelto: {} ({})", metadata.title, url);

        Ok(Track {
            title: metadata.title,
            url: metadata.webpage_url,
            requested_by,
            uploader: metadata.uploader,
            duration: metadata.duration,
        })
    }

    /// Crea el input de songbird para un track. El input es lazy: los fallos
    /// de descarga o transcodificación aparecen recién al reproducir, como
    /// eventos de error del driver.
    pub fn playable_input(&self, track: &Track) -> Input {
        YoutubeDl::new(self.web.clone(), track.url.clone()).into()
    }

    /// Verifica que los ejecutables externos estén disponibles.
    ///
    /// Ninguna ausencia es fatal para el arranque: sin ellos cada intento de
    /// reproducción falla y se reporta por track.
    pub async fn verify_dependencies(&self) -> Result<()> {
        let ytdlp_check = tokio::process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await;

        match ytdlp_check {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
            }
            _ => {
                anyhow::bail!("yt-dlp no encontrado. Instala con: pip install yt-dlp");
            }
        }

        let ffmpeg_check = tokio::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await;

        match ffmpeg_check {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg disponible");
            }
            _ => {
                warn!("⚠️ ffmpeg no encontrado. Instala con: sudo apt install ffmpeg");
            }
        }

        Ok(())
    }
}
