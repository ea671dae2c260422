use anyhow::Result;
use serenity::{
    builder::EditMessage,
    model::{
        channel::Message,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Instant;
use tracing::{error, warn};

use crate::bot::RitmoBot;

/// Respuesta estática de `!author`.
const AUTHOR_REPLY: &str = "Author: <@!533093302031876096>";

/// Umbral a partir del cual la latencia se considera alta (ms).
const HIGH_LATENCY_MS: u128 = 100;

/// Comandos reconocidos. Enumeración cerrada: el dispatch es un `match`
/// exhaustivo, así que un comando nuevo sin manejar no compila.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play { url: Option<String> },
    Skip,
    Leave,
    Ping,
    Author,
}

impl Command {
    /// Parsea el contenido de un mensaje. Todo lo que no sea un comando
    /// conocido devuelve `None` y se ignora sin respuesta. El prefijo es
    /// sensible a mayúsculas y tiene que ir pegado al nombre del comando.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let rest = content.strip_prefix(prefix)?;
        if rest.starts_with(char::is_whitespace) {
            return None;
        }

        let mut parts = rest.split_whitespace();

        let command = match parts.next()? {
            "play" => Self::Play {
                url: parts.next().map(str::to_owned),
            },
            "skip" => Self::Skip,
            "leave" => Self::Leave,
            "ping" => Self::Ping,
            "author" | "autor" => Self::Author,
            _ => return None,
        };

        Some(command)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Play { .. } => "play",
            Self::Skip => "skip",
            Self::Leave => "leave",
            Self::Ping => "ping",
            Self::Author => "author",
        }
    }
}

/// Despacha un comando ya parseado.
pub async fn handle(bot: &RitmoBot, ctx: &Context, msg: &Message, command: Command) -> Result<()> {
    match command {
        Command::Play { url } => handle_play(bot, ctx, msg, url).await,
        Command::Skip => handle_skip(bot, ctx, msg).await,
        Command::Leave => handle_leave(bot, ctx, msg).await,
        Command::Ping => handle_ping(ctx, msg).await,
        Command::Author => handle_author(ctx, msg).await,
    }
}

async fn handle_play(
    bot: &RitmoBot,
    ctx: &Context,
    msg: &Message,
    url: Option<String>,
) -> Result<()> {
    let Some(guild_id) = msg.guild_id else {
        msg.channel_id
            .say(&ctx.http, "❌ Este comando solo funciona en un servidor")
            .await?;
        return Ok(());
    };

    let Some(url) = url else {
        msg.channel_id
            .say(
                &ctx.http,
                format!("❌ Falta la URL. Uso: {}play <url>", bot.config.command_prefix),
            )
            .await?;
        return Ok(());
    };

    let Some(user_channel) = user_voice_channel(ctx, guild_id, msg.author.id) else {
        msg.channel_id
            .say(&ctx.http, "❌ Debes estar en un canal de voz")
            .await?;
        return Ok(());
    };

    if let Some(session) = bot.player.get(guild_id) {
        if session.channel_id() != user_channel {
            msg.channel_id
                .say(&ctx.http, "❌ Ya estoy conectado a otro canal de voz")
                .await?;
            return Ok(());
        }
    }

    // Resolver primero: si la URL no sirve no hace falta conectarse
    let track = match bot.resolver.resolve(&url, msg.author.id).await {
        Ok(track) => track,
        Err(e) => {
            warn!("⚠️ Resolución fallida para {}: {}", url, e);
            msg.channel_id
                .say(&ctx.http, format!("❌ No se pudo reproducir la URL: {e}"))
                .await?;
            return Ok(());
        }
    };

    let session = match bot.player.get(guild_id) {
        Some(session) => session,
        None => {
            let manager = songbird::get(ctx)
                .await
                .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

            match bot
                .player
                .connect(manager, guild_id, user_channel, msg.channel_id, ctx.http.clone())
                .await
            {
                Ok(session) => session,
                Err(e) => {
                    error!("Error al conectar en guild {}: {:?}", guild_id, e);
                    msg.channel_id
                        .say(&ctx.http, "❌ No me pude conectar al canal de voz")
                        .await?;
                    return Ok(());
                }
            }
        }
    };

    match session.enqueue(track.clone(), msg.channel_id).await {
        Ok(()) => {
            msg.channel_id
                .say(
                    &ctx.http,
                    format!("➕ Agregado a la cola: **{}**", track.title),
                )
                .await?;
        }
        Err(e) => {
            msg.channel_id.say(&ctx.http, format!("❌ {e}")).await?;
        }
    }

    Ok(())
}

async fn handle_skip(bot: &RitmoBot, ctx: &Context, msg: &Message) -> Result<()> {
    let skipped = match msg.guild_id.and_then(|guild_id| bot.player.get(guild_id)) {
        Some(session) => session.skip().await.unwrap_or(false),
        None => false,
    };

    if skipped {
        msg.channel_id.say(&ctx.http, "⏭️ Canción saltada").await?;
    } else {
        msg.channel_id
            .say(&ctx.http, "❌ No hay nada reproduciéndose")
            .await?;
    }

    Ok(())
}

async fn handle_leave(bot: &RitmoBot, ctx: &Context, msg: &Message) -> Result<()> {
    match msg.guild_id.and_then(|guild_id| bot.player.get(guild_id)) {
        Some(session) => {
            let _ = session.disconnect().await;
            msg.channel_id.say(&ctx.http, "👋 Desconectado").await?;
        }
        None => {
            msg.channel_id
                .say(&ctx.http, "🤷 No estoy conectado a ningún canal de voz")
                .await?;
        }
    }

    Ok(())
}

/// Mide la ida y vuelta real contra la API de Discord, así siempre hay un
/// valor que reportar aunque el bot no esté en ningún canal de voz.
async fn handle_ping(ctx: &Context, msg: &Message) -> Result<()> {
    let started = Instant::now();
    let mut reply = msg.channel_id.say(&ctx.http, "🏓 Pong...").await?;
    let latency_ms = started.elapsed().as_millis();

    reply
        .edit(
            &ctx.http,
            EditMessage::new().content(format!("🏓 Latencia actual: {latency_ms} ms")),
        )
        .await?;

    if latency_ms > HIGH_LATENCY_MS {
        warn!("⚠️ Latencia alta: {} ms", latency_ms);
        msg.channel_id
            .say(&ctx.http, "⚠️ La latencia es muy alta")
            .await?;
    }

    Ok(())
}

async fn handle_author(ctx: &Context, msg: &Message) -> Result<()> {
    msg.channel_id.say(&ctx.http, AUTHOR_REPLY).await?;
    Ok(())
}

// Funciones auxiliares

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;

    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_known_commands() {
        assert_eq!(
            Command::parse("!", "!play https://youtu.be/abc"),
            Some(Command::Play {
                url: Some("https://youtu.be/abc".to_string())
            })
        );
        assert_eq!(Command::parse("!", "!skip"), Some(Command::Skip));
        assert_eq!(Command::parse("!", "!leave"), Some(Command::Leave));
        assert_eq!(Command::parse("!", "!ping"), Some(Command::Ping));
        assert_eq!(Command::parse("!", "!author"), Some(Command::Author));
    }

    #[test]
    fn test_parse_autor_alias() {
        assert_eq!(Command::parse("!", "!autor"), Some(Command::Author));
    }

    #[test]
    fn test_parse_play_without_url() {
        // Se reconoce igual: el handler responde el error de uso
        assert_eq!(
            Command::parse("!", "!play"),
            Some(Command::Play { url: None })
        );
    }

    #[test]
    fn test_parse_play_takes_first_argument() {
        assert_eq!(
            Command::parse("!", "!play https://youtu.be/abc basura extra"),
            Some(Command::Play {
                url: Some("https://youtu.be/abc".to_string())
            })
        );
    }

    #[test]
    fn test_unknown_input_is_ignored() {
        assert_eq!(Command::parse("!", "hola"), None);
        assert_eq!(Command::parse("!", "!baila"), None);
        assert_eq!(Command::parse("!", "!skipme"), None);
        assert_eq!(Command::parse("!", "!"), None);
        assert_eq!(Command::parse("!", ""), None);
    }

    #[test]
    fn test_parse_is_case_sensitive() {
        assert_eq!(Command::parse("!", "!PLAY https://youtu.be/abc"), None);
        assert_eq!(Command::parse("!", "!Skip"), None);
    }

    #[test]
    fn test_prefix_must_touch_command() {
        assert_eq!(Command::parse("!", "! play https://youtu.be/abc"), None);
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(Command::parse("$", "$ping"), Some(Command::Ping));
        assert_eq!(Command::parse("$", "!ping"), None);
    }
}
