use anyhow::Result;
use dashmap::DashMap;
use serenity::{http::Http, model::id::{ChannelId, GuildId}};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{error, info};

use crate::{
    audio::session::{SessionHandle, VoiceSession},
    config::Config,
    presence::PresenceReporter,
    sources::Resolver,
};

/// Registro explícito de sesiones de voz, una por guild. Es dueño del mapa
/// guild → sesión y lo inyecta el handler del bot; nunca es estado ambiente.
pub struct AudioPlayer {
    sessions: Arc<DashMap<GuildId, SessionHandle>>,
    resolver: Arc<Resolver>,
    presence: PresenceReporter,
    config: Arc<Config>,
}

impl AudioPlayer {
    pub fn new(resolver: Arc<Resolver>, presence: PresenceReporter, config: Arc<Config>) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            resolver,
            presence,
            config,
        }
    }

    /// Obtiene la sesión activa de una guild, si existe.
    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    /// Conecta al canal de voz y levanta la tarea de control de la guild.
    pub async fn connect(
        &self,
        manager: Arc<Songbird>,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        http: Arc<Http>,
    ) -> Result<SessionHandle> {
        if let Some(existing) = self.get(guild_id) {
            return Ok(existing);
        }

        let call = match manager.join(guild_id, voice_channel).await {
            Ok(call) => call,
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                return Err(anyhow::anyhow!("Error al conectar al canal de voz"));
            }
        };

        let (handle, session) = VoiceSession::new(
            guild_id,
            voice_channel,
            text_channel,
            call,
            manager,
            http,
            self.resolver.clone(),
            self.presence.clone(),
            self.sessions.clone(),
            &self.config,
        );

        self.sessions.insert(guild_id, handle.clone());
        tokio::spawn(session.run());

        info!(
            "🔊 Conectado al canal de voz {} en guild {}",
            voice_channel, guild_id
        );

        Ok(handle)
    }

    /// Reenvía una desconexión externa a la sesión de la guild, si sigue viva.
    pub fn handle_external_disconnect(&self, guild_id: GuildId) {
        if let Some(session) = self.get(guild_id) {
            session.connection_lost();
        }
    }
}
