use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

/// Metadata de un video, lista para volverse un `Track`.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: String,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
    pub webpage_url: String,
}

/// Cliente para interactuar con YouTube.
///
/// La metadata sale de la Data API v3 cuando hay API key configurada y de
/// `yt-dlp --dump-json` en caso contrario (también como fallback si la API
/// falla). El audio en sí siempre lo trae yt-dlp vía songbird.
pub struct YouTubeClient {
    web: reqwest::Client,
    api_key: Option<String>,
    rate_limiter: Semaphore,
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    duration: Option<f64>,
    uploader: Option<String>,
    webpage_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VideoListResponse {
    items: Vec<VideoItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    snippet: VideoSnippet,
    content_details: ContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    title: String,
    channel_title: String,
}

#[derive(Debug, Deserialize)]
struct ContentDetails {
    duration: String,
}

impl YouTubeClient {
    pub fn new(web: reqwest::Client, api_key: Option<String>) -> Self {
        Self {
            web,
            api_key,
            // Limitar requests concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Obtiene la metadata de una URL de video.
    pub async fn get_info(&self, url: &str) -> Result<TrackMetadata> {
        let _permit = self.rate_limiter.acquire().await?;

        if self.api_key.is_some() {
            match self.api_info(url).await {
                Ok(metadata) => return Ok(metadata),
                Err(e) => warn!("⚠️ YouTube API falló, usando yt-dlp: {e:#}"),
            }
        }

        self.ytdlp_info(url).await
    }

    /// Metadata vía `yt-dlp --dump-json`
    async fn ytdlp_info(&self, url: &str) -> Result<TrackMetadata> {
        debug!("📊 Obteniendo info de: {}", url);

        let output = tokio::process::Command::new("yt-dlp")
            .args(["--no-playlist", "--dump-json", "--no-warnings", url])
            .output()
            .await
            .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info: YtDlpInfo =
            serde_json::from_str(&stdout).context("Error al parsear respuesta de yt-dlp")?;

        Ok(TrackMetadata {
            title: info.title,
            uploader: info.uploader,
            duration: info.duration.map(Duration::from_secs_f64),
            webpage_url: info.webpage_url.unwrap_or_else(|| url.to_string()),
        })
    }

    /// Metadata vía YouTube Data API v3 (requiere API key)
    async fn api_info(&self, url: &str) -> Result<TrackMetadata> {
        let key = self.api_key.as_deref().context("Sin API key")?;
        let video_id = Self::extract_video_id(url)?;

        debug!("📊 Consultando Data API v3 para: {}", video_id);

        let response = self
            .web
            .get("https://www.googleapis.com/youtube/v3/videos")
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", video_id.as_str()),
                ("key", key),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("YouTube API error: {}", response.status());
        }

        let api_response: VideoListResponse = response.json().await?;

        let video = api_response
            .items
            .into_iter()
            .next()
            .context("Video no encontrado")?;

        Ok(TrackMetadata {
            title: video.snippet.title,
            uploader: Some(video.snippet.channel_title),
            duration: Self::parse_iso8601_duration(&video.content_details.duration).ok(),
            webpage_url: format!("https://www.youtube.com/watch?v={video_id}"),
        })
    }

    /// Verifica si la URL apunta a YouTube
    pub fn is_youtube_url(url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        matches!(
            parsed.host_str(),
            Some(
                "youtube.com"
                    | "www.youtube.com"
                    | "m.youtube.com"
                    | "music.youtube.com"
                    | "youtu.be"
                    | "www.youtu.be"
            )
        )
    }

    /// Extrae el video ID de una URL de YouTube
    pub(crate) fn extract_video_id(url: &str) -> Result<String> {
        let parsed = Url::parse(url).context("URL inválida")?;

        let video_id = match parsed.host_str() {
            Some("youtu.be" | "www.youtu.be") => parsed
                .path_segments()
                .and_then(|mut segments| segments.next())
                .filter(|segment| !segment.is_empty())
                .map(str::to_owned),
            _ => parsed
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
        };

        video_id.with_context(|| format!("No se pudo extraer video ID de la URL: {url}"))
    }

    /// Parsea duración ISO 8601 (PT1H2M3S)
    fn parse_iso8601_duration(duration: &str) -> Result<Duration> {
        let mut hours: u64 = 0;
        let mut minutes: u64 = 0;
        let mut seconds: u64 = 0;

        let mut current_num = String::new();

        for ch in duration.chars() {
            match ch {
                'P' | 'T' => continue,
                'H' => {
                    hours = current_num.parse().unwrap_or(0);
                    current_num.clear();
                }
                'M' => {
                    minutes = current_num.parse().unwrap_or(0);
                    current_num.clear();
                }
                'S' => {
                    seconds = current_num.parse().unwrap_or(0);
                    current_num.clear();
                }
                _ if ch.is_ascii_digit() => {
                    current_num.push(ch);
                }
                _ => continue,
            }
        }

        Ok(Duration::from_secs(hours * 3600 + minutes * 60 + seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_youtube_url_detection() {
        assert!(YouTubeClient::is_youtube_url(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url(
            "https://youtu.be/dQw4w9WgXcQ"
        ));
        assert!(YouTubeClient::is_youtube_url(
            "https://music.youtube.com/watch?v=test"
        ));
        assert!(!YouTubeClient::is_youtube_url("https://example.com/video"));
        assert!(!YouTubeClient::is_youtube_url("no es una url"));
        // El host tiene que ser exactamente YouTube, no un lookalike
        assert!(!YouTubeClient::is_youtube_url(
            "https://youtube.com.evil.example/watch?v=x"
        ));
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            YouTubeClient::extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
                .unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            YouTubeClient::extract_video_id("https://youtu.be/dQw4w9WgXcQ?t=42").unwrap(),
            "dQw4w9WgXcQ"
        );
        assert_eq!(
            YouTubeClient::extract_video_id(
                "https://www.youtube.com/watch?v=abc123&list=PLx"
            )
            .unwrap(),
            "abc123"
        );
        assert!(YouTubeClient::extract_video_id("https://www.youtube.com/feed").is_err());
    }

    #[test]
    fn test_iso8601_duration_parsing() {
        let parse = YouTubeClient::parse_iso8601_duration;

        assert_eq!(parse("PT45S").unwrap(), Duration::from_secs(45));
        assert_eq!(parse("PT3M14S").unwrap(), Duration::from_secs(194));
        assert_eq!(parse("PT1H2M3S").unwrap(), Duration::from_secs(3723));
        assert_eq!(parse("PT2H").unwrap(), Duration::from_secs(7200));
    }
}
