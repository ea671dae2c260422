//! Sesión de voz por guild.
//!
//! Cada guild conectada tiene una única tarea de control que es dueña de la
//! cola, del `Call` de songbird y del track en curso. Todos los estímulos
//! (comandos del usuario y notificaciones de fin de track del driver) entran
//! por el mismo canal mpsc, así un `!skip` nunca corre en paralelo con una
//! terminación natural para la misma guild. Guilds distintas son tareas
//! independientes.

use serenity::{
    async_trait,
    http::Http,
    model::id::{ChannelId, GuildId},
};
use songbird::{
    tracks::TrackHandle, Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::{
    audio::queue::{GuildQueue, Track},
    config::Config,
    error::MusicError,
    presence::PresenceReporter,
    sources::Resolver,
};

/// Estímulos que procesa la tarea de control de una sesión.
pub enum SessionEvent {
    Enqueue {
        track: Track,
        channel: ChannelId,
        reply: oneshot::Sender<Result<(), MusicError>>,
    },
    Skip {
        reply: oneshot::Sender<bool>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    /// El bot fue desconectado externamente (expulsado, canal borrado).
    ConnectionLost,
    /// Un track terminó de forma natural o fue detenido.
    Ended { serial: u64 },
    /// El driver reportó un error en el track en curso.
    Faulted { serial: u64 },
}

/// Resultado de encolar un track en la máquina de estados.
#[derive(Debug)]
pub(crate) enum EnqueueOutcome {
    /// La sesión estaba idle: el track arranca de inmediato.
    Started(Track),
    /// Quedó en cola en la posición indicada (1 = siguiente).
    Queued(usize),
    Rejected(MusicError),
}

/// Máquina de estados de reproducción: `idle ⇄ playing` más la cola FIFO.
/// Pura (sin I/O) para poder probarla sin driver de audio.
pub(crate) struct PlaybackState {
    queue: GuildQueue,
    playing: bool,
}

impl PlaybackState {
    pub(crate) fn new(max_queue_size: usize) -> Self {
        Self {
            queue: GuildQueue::new(max_queue_size),
            playing: false,
        }
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.playing
    }

    /// Encola un track; si no hay nada sonando lo saca de inmediato.
    pub(crate) fn on_enqueue(&mut self, track: Track) -> EnqueueOutcome {
        if let Err(e) = self.queue.push(track) {
            return EnqueueOutcome::Rejected(e);
        }

        if !self.playing {
            if let Some(track) = self.queue.next() {
                self.playing = true;
                return EnqueueOutcome::Started(track);
            }
        }

        EnqueueOutcome::Queued(self.queue.len())
    }

    /// El track en curso terminó: devuelve el siguiente o pasa a idle.
    /// Un fin espurio estando idle no cambia nada.
    pub(crate) fn on_ended(&mut self) -> Option<Track> {
        if !self.playing {
            return None;
        }

        match self.queue.next() {
            Some(track) => Some(track),
            None => {
                self.playing = false;
                None
            }
        }
    }

    /// Desconexión: vacía la cola y vuelve a idle.
    pub(crate) fn on_disconnect(&mut self) {
        self.queue.clear();
        self.playing = false;
    }

    /// Track en curso, si hay.
    pub(crate) fn current(&self) -> Option<&Track> {
        self.queue.current()
    }
}

/// Handle clonable hacia la tarea de control de una guild.
#[derive(Clone)]
pub struct SessionHandle {
    channel_id: ChannelId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    /// Canal de voz al que está atada la sesión.
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub async fn enqueue(&self, track: Track, channel: ChannelId) -> Result<(), MusicError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Enqueue {
                track,
                channel,
                reply,
            })
            .map_err(|_| MusicError::NotConnected)?;
        rx.await.map_err(|_| MusicError::NotConnected)?
    }

    /// Detiene el track en curso. Devuelve `false` si no había nada sonando.
    pub async fn skip(&self) -> Result<bool, MusicError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Skip { reply })
            .map_err(|_| MusicError::NotConnected)?;
        rx.await.map_err(|_| MusicError::NotConnected)
    }

    /// Desconecta la sesión y espera a que termine la limpieza.
    pub async fn disconnect(&self) -> Result<(), MusicError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionEvent::Disconnect { reply })
            .map_err(|_| MusicError::NotConnected)?;
        rx.await.map_err(|_| MusicError::NotConnected)
    }

    /// Notifica una desconexión externa. No espera respuesta: la sesión
    /// puede estar ya en plena limpieza.
    pub fn connection_lost(&self) {
        let _ = self.tx.send(SessionEvent::ConnectionLost);
    }
}

/// Sesión de voz activa: estado más recursos, consumidos por `run`.
pub struct VoiceSession {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    manager: Arc<Songbird>,
    http: Arc<Http>,
    resolver: Arc<Resolver>,
    presence: PresenceReporter,
    sessions: Arc<dashmap::DashMap<GuildId, SessionHandle>>,
    state: PlaybackState,
    current: Option<TrackHandle>,
    /// Identifica el track en curso; eventos con serial viejo se descartan.
    serial: u64,
    text_channel: ChannelId,
    inactive_timeout: Duration,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl VoiceSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: ChannelId,
        call: Arc<Mutex<Call>>,
        manager: Arc<Songbird>,
        http: Arc<Http>,
        resolver: Arc<Resolver>,
        presence: PresenceReporter,
        sessions: Arc<dashmap::DashMap<GuildId, SessionHandle>>,
        config: &Config,
    ) -> (SessionHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = SessionHandle {
            channel_id: voice_channel,
            tx: tx.clone(),
        };

        let session = Self {
            guild_id,
            call,
            manager,
            http,
            resolver,
            presence,
            sessions,
            state: PlaybackState::new(config.max_queue_size),
            current: None,
            serial: 0,
            text_channel,
            inactive_timeout: Duration::from_secs(config.inactive_timeout),
            rx,
            tx,
        };

        (handle, session)
    }

    /// Loop de control de la sesión. Termina al desconectar.
    pub async fn run(mut self) {
        info!("🎧 Sesión de voz iniciada en guild {}", self.guild_id);

        loop {
            let event = if self.state.is_playing() {
                self.rx.recv().await
            } else {
                // Idle: además de eventos, corre el timer de inactividad
                tokio::select! {
                    event = self.rx.recv() => event,
                    _ = tokio::time::sleep(self.inactive_timeout) => {
                        info!("💤 Desconectado por inactividad en guild {}", self.guild_id);
                        self.announce("💤 Desconectado por inactividad").await;
                        self.leave_voice().await;
                        break;
                    }
                }
            };

            let Some(event) = event else {
                break;
            };

            match event {
                SessionEvent::Enqueue {
                    track,
                    channel,
                    reply,
                } => {
                    self.text_channel = channel;
                    match self.state.on_enqueue(track) {
                        EnqueueOutcome::Started(track) => {
                            let _ = reply.send(Ok(()));
                            self.start(track).await;
                        }
                        EnqueueOutcome::Queued(position) => {
                            debug!("📋 En cola (posición {}) en guild {}", position, self.guild_id);
                            let _ = reply.send(Ok(()));
                        }
                        EnqueueOutcome::Rejected(e) => {
                            let _ = reply.send(Err(e));
                        }
                    }
                }
                SessionEvent::Skip { reply } => {
                    if self.state.is_playing() {
                        // Detener el track dispara su evento End, y ese End
                        // es el que avanza la cola
                        if let Some(handle) = &self.current {
                            if let Err(e) = handle.stop() {
                                warn!("⚠️ No se pudo detener el track: {:?}", e);
                            }
                        }
                        let _ = reply.send(true);
                    } else {
                        let _ = reply.send(false);
                    }
                }
                SessionEvent::Ended { serial } if serial == self.serial => {
                    self.advance().await;
                }
                SessionEvent::Faulted { serial } if serial == self.serial => {
                    let title = self
                        .state
                        .current()
                        .map(|t| t.title.clone())
                        .unwrap_or_else(|| "el track".to_string());
                    let failure = MusicError::Playback(title);
                    error!("❌ {} en guild {}", failure, self.guild_id);
                    self.announce(&format!("❌ {failure}, saltando al siguiente"))
                        .await;
                    self.advance().await;
                }
                // Eventos de un track ya reemplazado
                SessionEvent::Ended { .. } | SessionEvent::Faulted { .. } => {}
                SessionEvent::Disconnect { reply } => {
                    self.leave_voice().await;
                    let _ = reply.send(());
                    break;
                }
                SessionEvent::ConnectionLost => {
                    warn!("🔌 Conexión de voz perdida en guild {}", self.guild_id);
                    break;
                }
            }
        }

        self.teardown();
    }

    /// Arranca la reproducción de un track en el `Call`.
    async fn start(&mut self, track: Track) {
        self.serial += 1;
        info!("🎵 Reproduciendo: {} en guild {}", track.title, self.guild_id);

        let input = self.resolver.playable_input(&track);

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };

        let end_notifier = TrackEndNotifier {
            tx: self.tx.clone(),
            serial: self.serial,
        };
        if let Err(e) = handle.add_event(Event::Track(TrackEvent::End), end_notifier) {
            error!("Error al registrar notificador de fin: {:?}", e);
        }

        let error_notifier = TrackErrorNotifier {
            tx: self.tx.clone(),
            serial: self.serial,
        };
        if let Err(e) = handle.add_event(Event::Track(TrackEvent::Error), error_notifier) {
            error!("Error al registrar notificador de errores: {:?}", e);
        }

        self.current = Some(handle);
        self.presence.set(&track.title);
        self.announce(&now_playing_line(&track)).await;
    }

    /// El track en curso terminó (o falló): sigue con la cola o queda idle.
    async fn advance(&mut self) {
        self.current = None;

        match self.state.on_ended() {
            Some(next) => self.start(next).await,
            None => {
                debug!("📭 Cola vacía en guild {}, pasando a idle", self.guild_id);
                self.presence.clear();
            }
        }
    }

    /// Sale del canal de voz vía songbird.
    async fn leave_voice(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("Error al salir del canal de voz: {:?}", e);
        }
    }

    fn teardown(mut self) {
        if let Some(handle) = self.current.take() {
            let _ = handle.stop();
        }
        self.state.on_disconnect();
        self.presence.clear();
        self.sessions.remove(&self.guild_id);
        info!("👋 Sesión de voz terminada en guild {}", self.guild_id);
    }

    async fn announce(&self, text: &str) {
        if let Err(e) = self.text_channel.say(&self.http, text).await {
            warn!("Error enviando mensaje: {:?}", e);
        }
    }
}

/// Arma el anuncio de "ahora suena" con la metadata disponible.
fn now_playing_line(track: &Track) -> String {
    let mut line = format!("▶️ Reproduciendo: **{}**", track.title);

    if let Some(uploader) = &track.uploader {
        line.push_str(&format!(" de {uploader}"));
    }

    if let Some(duration) = track.duration {
        line.push_str(&format!(" [{}]", format_duration(duration)));
    }

    line.push_str(&format!(" (pedida por <@{}>)", track.requested_by));

    line
}

/// Formatea una duración como `m:ss`
fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// Notifica al loop de control que el track terminó.
struct TrackEndNotifier {
    tx: mpsc::UnboundedSender<SessionEvent>,
    serial: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let _ = self.tx.send(SessionEvent::Ended {
            serial: self.serial,
        });
        None
    }
}

/// Notifica al loop de control que el track falló.
struct TrackErrorNotifier {
    tx: mpsc::UnboundedSender<SessionEvent>,
    serial: u64,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                error!("❌ Error en track: {:?}", state.playing);
            }
        }

        let _ = self.tx.send(SessionEvent::Faulted {
            serial: self.serial,
        });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            url: format!("https://www.youtube.com/watch?v={title}"),
            requested_by: UserId::new(7),
            uploader: None,
            duration: None,
        }
    }

    fn started_title(outcome: EnqueueOutcome) -> String {
        match outcome {
            EnqueueOutcome::Started(track) => track.title,
            other => panic!("se esperaba Started, fue {other:?}"),
        }
    }

    #[test]
    fn test_enqueue_while_idle_starts_immediately() {
        let mut state = PlaybackState::new(100);

        assert!(!state.is_playing());
        assert_eq!(started_title(state.on_enqueue(track("a"))), "a");
        assert!(state.is_playing());
    }

    #[test]
    fn test_enqueue_while_playing_queues_in_order() {
        let mut state = PlaybackState::new(100);

        state.on_enqueue(track("a"));
        assert!(matches!(state.on_enqueue(track("b")), EnqueueOutcome::Queued(1)));
        assert!(matches!(state.on_enqueue(track("c")), EnqueueOutcome::Queued(2)));

        // La reproducción sigue el orden de llegada
        assert_eq!(state.on_ended().unwrap().title, "b");
        assert_eq!(state.on_ended().unwrap().title, "c");
        assert_eq!(state.on_ended(), None);
        assert!(!state.is_playing());
    }

    #[test]
    fn test_ended_while_idle_is_noop() {
        let mut state = PlaybackState::new(100);

        assert_eq!(state.on_ended(), None);
        assert!(!state.is_playing());
    }

    #[test]
    fn test_failed_track_does_not_block_next() {
        let mut state = PlaybackState::new(100);

        state.on_enqueue(track("rota"));
        state.on_enqueue(track("buena"));

        // El track fallido se descarta igual que uno terminado
        assert_eq!(state.on_ended().unwrap().title, "buena");
        assert!(state.is_playing());
    }

    #[test]
    fn test_disconnect_clears_queue_and_allows_fresh_start() {
        let mut state = PlaybackState::new(100);

        state.on_enqueue(track("a"));
        state.on_enqueue(track("b"));
        state.on_disconnect();

        assert!(!state.is_playing());
        assert_eq!(state.on_ended(), None);

        // Un !play posterior arranca una cola nueva
        assert_eq!(started_title(state.on_enqueue(track("c"))), "c");
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(format_duration(Duration::from_secs(45)), "0:45");
        assert_eq!(format_duration(Duration::from_secs(194)), "3:14");
        assert_eq!(format_duration(Duration::from_secs(3723)), "62:03");
    }

    #[test]
    fn test_now_playing_line_with_metadata() {
        let mut full = track("Algo");
        full.uploader = Some("Alguien".to_string());
        full.duration = Some(Duration::from_secs(194));

        assert_eq!(
            now_playing_line(&full),
            "▶️ Reproduciendo: **Algo** de Alguien [3:14] (pedida por <@7>)"
        );

        // Sin metadata opcional, la línea queda corta
        assert_eq!(
            now_playing_line(&track("Algo")),
            "▶️ Reproduciendo: **Algo** (pedida por <@7>)"
        );
    }

    #[test]
    fn test_queue_full_rejected() {
        let mut state = PlaybackState::new(1);

        state.on_enqueue(track("a")); // arranca, no ocupa la cola
        state.on_enqueue(track("b")); // posición 1
        assert!(matches!(
            state.on_enqueue(track("c")),
            EnqueueOutcome::Rejected(MusicError::QueueFull(1))
        ));
    }

    // Escenario completo: A suena de inmediato; al terminar A sigue B;
    // un skip durante B (stop + End) arranca C; leave durante C vacía todo.
    #[test]
    fn test_play_skip_leave_scenario() {
        let mut state = PlaybackState::new(100);

        assert_eq!(started_title(state.on_enqueue(track("a"))), "a");
        state.on_enqueue(track("b"));
        state.on_enqueue(track("c"));

        assert_eq!(state.on_ended().unwrap().title, "b");

        // skip durante B: el runtime detiene el track y el End avanza
        assert!(state.is_playing());
        assert_eq!(state.on_ended().unwrap().title, "c");

        // leave durante C
        state.on_disconnect();
        assert!(!state.is_playing());
        assert_eq!(state.on_ended(), None);
    }
}
