use serenity::model::id::UserId;
use std::{collections::VecDeque, time::Duration};
use tracing::info;

use crate::error::MusicError;

/// Un track resuelto, listo para reproducir. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub url: String,
    pub requested_by: UserId,
    pub uploader: Option<String>,
    pub duration: Option<Duration>,
}

/// Cola de reproducción por guild. Estrictamente FIFO: sin reordenamiento,
/// sin deduplicación, sin prioridades.
#[derive(Debug)]
pub struct GuildQueue {
    items: VecDeque<Track>,
    current: Option<Track>,
    max_size: usize,
}

impl GuildQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            current: None,
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn push(&mut self, track: Track) -> Result<(), MusicError> {
        if self.items.len() >= self.max_size {
            return Err(MusicError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", track.title);
        self.items.push_back(track);

        Ok(())
    }

    /// Saca el primer track de la cola y lo deja como actual
    pub fn next(&mut self) -> Option<Track> {
        match self.items.pop_front() {
            Some(track) => {
                self.current = Some(track.clone());
                Some(track)
            }
            None => {
                self.current = None;
                None
            }
        }
    }

    /// Limpia la cola y el track actual
    pub fn clear(&mut self) {
        self.items.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    /// Obtiene el track actual sin sacarlo
    pub fn current(&self) -> Option<&Track> {
        self.current.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> Track {
        Track {
            title: title.to_string(),
            url: format!("https://www.youtube.com/watch?v={title}"),
            requested_by: UserId::new(1),
            uploader: None,
            duration: None,
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = GuildQueue::new(100);

        for title in ["a", "b", "c", "d"] {
            queue.push(track(title)).unwrap();
        }

        let order: Vec<String> = std::iter::from_fn(|| queue.next())
            .map(|t| t.title)
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_next_tracks_current() {
        let mut queue = GuildQueue::new(100);
        queue.push(track("a")).unwrap();
        queue.push(track("b")).unwrap();

        assert_eq!(queue.current(), None);

        queue.next();
        assert_eq!(queue.current().unwrap().title, "a");

        queue.next();
        assert_eq!(queue.current().unwrap().title, "b");

        // Cola agotada: ya no hay track actual
        assert_eq!(queue.next(), None);
        assert_eq!(queue.current(), None);
    }

    #[test]
    fn test_clear_empties_queue_and_current() {
        let mut queue = GuildQueue::new(100);
        queue.push(track("a")).unwrap();
        queue.push(track("b")).unwrap();
        queue.next();

        queue.clear();

        assert!(queue.is_empty());
        assert_eq!(queue.current(), None);
        assert_eq!(queue.next(), None);
    }

    #[test]
    fn test_push_respects_max_size() {
        let mut queue = GuildQueue::new(2);
        queue.push(track("a")).unwrap();
        queue.push(track("b")).unwrap();

        assert!(matches!(
            queue.push(track("c")),
            Err(MusicError::QueueFull(2))
        ));
        assert_eq!(queue.len(), 2);
    }
}
