//! # Bot Module
//!
//! Handler principal de eventos de Discord.
//!
//! [`RitmoBot`] implementa el [`EventHandler`] de serenity y conecta las
//! piezas: los mensajes entrantes pasan por [`commands::Command::parse`] y
//! se despachan contra el [`AudioPlayer`] (registro de sesiones por guild),
//! el [`Resolver`] y el [`PresenceReporter`]. Todo el estado va inyectado en
//! el handler; no hay globals.

use serenity::{
    all::{Context, EventHandler, Message, Ready, VoiceState},
    async_trait,
};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

pub mod commands;

use crate::{
    audio::player::AudioPlayer, config::Config, presence::PresenceReporter, sources::Resolver,
};
use commands::Command;

pub struct RitmoBot {
    /// Configuración cargada del entorno
    pub config: Arc<Config>,
    /// Registro de sesiones de voz por guild
    pub player: AudioPlayer,
    /// Resolutor de URLs a tracks
    pub resolver: Arc<Resolver>,
    /// Estado compartido de presencia
    pub presence: PresenceReporter,
}

impl RitmoBot {
    pub fn new(config: Config, web: reqwest::Client) -> Self {
        let config = Arc::new(config);
        let resolver = Arc::new(Resolver::new(web, config.youtube_api_key.clone()));
        let presence = PresenceReporter::new();
        let player = AudioPlayer::new(resolver.clone(), presence.clone(), config.clone());

        Self {
            config,
            player,
            resolver,
            presence,
        }
    }
}

#[async_trait]
impl EventHandler for RitmoBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        // Refrescar la presencia a intervalos fijos
        self.presence
            .spawn_refresher(ctx, Duration::from_secs(self.config.presence_refresh));

        // Verificar dependencias externas sin bloquear el arranque
        let resolver = self.resolver.clone();
        tokio::spawn(async move {
            if let Err(e) = resolver.verify_dependencies().await {
                warn!("⚠️ Dependencias externas incompletas: {e:#}");
            }
        });
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(command) = Command::parse(&self.config.command_prefix, &msg.content) else {
            return;
        };

        info!(
            "📝 Comando {} usado por {}",
            command.name(),
            msg.author.name
        );

        if let Err(e) = commands::handle(self, &ctx, &msg, command).await {
            error!("Error manejando comando: {:?}", e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado externamente
        let current_user_id = ctx.cache.current_user().id;

        if new.user_id == current_user_id && old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                info!("🔌 Bot desconectado en guild {}", guild_id);
                self.player.handle_external_disconnect(guild_id);
            }
        }
    }
}
