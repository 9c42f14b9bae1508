use tokio::sync::mpsc;

use crate::ui::sprite::SpriteStore;

/// Result of background work, applied on the frame thread.
pub type Completion = Box<dyn FnOnce(&mut SpriteStore) + Send>;

/// Runs blocking work off the frame thread. Workers never see the sprite tree; they hand
/// back a [`Completion`] that the frame step applies.
pub struct WorkManager {
    completion_sender: mpsc::UnboundedSender<Completion>,
    completion_receiver: mpsc::UnboundedReceiver<Completion>,
    in_flight: usize,
}

impl WorkManager {
    pub fn new() -> Self {
        let (completion_sender, completion_receiver) = mpsc::unbounded_channel();
        Self {
            completion_sender,
            completion_receiver,
            in_flight: 0,
        }
    }

    /// Outside a tokio runtime the work runs inline and completes on the next apply.
    pub fn post<W, R, D>(&mut self, work: W, on_done: D)
    where
        W: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
        D: FnOnce(R, &mut SpriteStore) + Send + 'static
    {
        let sender = self.completion_sender.clone();
        let job = move || {
            let result = work();
            let completion: Completion = Box::new(move |store: &mut SpriteStore| on_done(result, store));
            if sender.send(completion).is_err() {
                log::debug!("Work finished after its manager was dropped");
            }
        };

        self.in_flight += 1;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            },
            Err(_) => {
                log::trace!("No runtime, running work inline");
                job();
            },
        }
    }

    /// Applies every completion that has arrived. Returns how many ran.
    pub fn apply_completions(&mut self, store: &mut SpriteStore) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completion_receiver.try_recv() {
            completion(store);
            applied += 1;
        }
        self.in_flight = self.in_flight.saturating_sub(applied);
        applied
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Default for WorkManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WorkManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkManager")
            .field("in_flight", &self.in_flight)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use glam::Vec3;

    use super::*;

    #[test]
    fn test_inline_without_runtime() {
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let mut work = WorkManager::new();

        work.post(|| 3.0_f32, move |value, store: &mut SpriteStore| {
            if let Some(sprite) = store.get_mut(root) {
                sprite.set_opacity(value / 10.0);
            }
        });
        assert_eq!(work.in_flight(), 1);
        assert_eq!(store.get(root).unwrap().opacity(), 1.0, "completions wait for the frame step");

        assert_eq!(work.apply_completions(&mut store), 1);
        assert_eq!(work.in_flight(), 0);
        assert!((store.get(root).unwrap().opacity() - 0.3).abs() < 1e-6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_background_completion_applies_on_frame_step() {
        let mut store = SpriteStore::new();
        let root = store.create_root(false);
        let mut work = WorkManager::new();

        work.post(
            || {
                std::thread::sleep(Duration::from_millis(10));
                Vec3::new(1.0, 2.0, 3.0)
            },
            move |position, store: &mut SpriteStore| {
                if let Some(sprite) = store.get_mut(root) {
                    sprite.set_position(position);
                }
            }
        );

        let mut applied = 0;
        for _ in 0..200 {
            applied += work.apply_completions(&mut store);
            if applied > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(applied, 1);
        assert_eq!(store.get(root).unwrap().position(), Vec3::new(1.0, 2.0, 3.0));
    }
}
