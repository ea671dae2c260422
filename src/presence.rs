use parking_lot::RwLock;
use serenity::{gateway::ActivityData, prelude::Context};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Estado compartido de "ahora escuchando" para la presencia del bot.
///
/// Las sesiones escriben el título en curso y una tarea de fondo lo refleja
/// en la actividad de Discord a intervalos fijos. La presencia es una sola
/// por conexión: si suenan varias guilds a la vez gana la última que escribió.
#[derive(Clone, Default)]
pub struct PresenceReporter {
    now_playing: Arc<RwLock<Option<String>>>,
}

impl PresenceReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra el track en curso
    pub fn set(&self, title: &str) {
        *self.now_playing.write() = Some(title.to_string());
    }

    /// Limpia la presencia (nada sonando)
    pub fn clear(&self) {
        *self.now_playing.write() = None;
    }

    pub fn current(&self) -> Option<String> {
        self.now_playing.read().clone()
    }

    /// Lanza la tarea que refresca la actividad del bot periódicamente.
    pub fn spawn_refresher(&self, ctx: Context, every: Duration) {
        let state = self.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;

                match state.current() {
                    Some(title) => {
                        debug!("🎧 Presencia: escuchando {}", title);
                        ctx.set_activity(Some(ActivityData::listening(title)));
                    }
                    None => ctx.set_activity(None),
                }
            }
        });
    }
}
