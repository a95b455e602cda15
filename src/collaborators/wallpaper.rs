//! Wallpaper resize notifications.

use std::sync::{Arc, Weak};

/// Notified when the wallpaper has been resized.
pub trait WallpaperResizerObserver: Send + Sync {
    /// Invoked after each resize.
    fn on_wallpaper_resized(&self);
}

/// Observers of one resizer. Holds weak references, so an observer that
/// is dropped stops being notified without unregistering.
#[derive(Default)]
pub struct WallpaperResizerObservers {
    observers: Vec<Weak<dyn WallpaperResizerObserver>>,
}

impl WallpaperResizerObservers {
    /// Empty observer list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `observer`.
    pub fn add_observer(&mut self, observer: &Arc<dyn WallpaperResizerObserver>) {
        self.observers.push(Arc::downgrade(observer));
    }

    /// Unregister `observer`.
    pub fn remove_observer(&mut self, observer: &Arc<dyn WallpaperResizerObserver>) {
        let target = Arc::downgrade(observer);
        self.observers.retain(|o| !o.ptr_eq(&target));
    }

    /// Notify every live observer and forget dropped ones.
    pub fn notify_resized(&mut self) {
        self.observers.retain(|o| match o.upgrade() {
            Some(observer) => {
                observer.on_wallpaper_resized();
                true
            }
            None => false,
        });
    }

    /// Number of registered observers, including ones not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl std::fmt::Debug for WallpaperResizerObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WallpaperResizerObservers")
            .field("len", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl WallpaperResizerObserver for Counter {
        fn on_wallpaper_resized(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_notify_and_remove() {
        let counter = Arc::new(Counter::default());
        let observer: Arc<dyn WallpaperResizerObserver> = counter.clone();
        let mut observers = WallpaperResizerObservers::new();

        observers.add_observer(&observer);
        observers.notify_resized();
        observers.notify_resized();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        observers.remove_observer(&observer);
        observers.notify_resized();
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
        assert!(observers.is_empty());
    }

    #[test]
    fn test_dropped_observer_is_pruned() {
        let mut observers = WallpaperResizerObservers::new();
        {
            let observer: Arc<dyn WallpaperResizerObserver> = Arc::new(Counter::default());
            observers.add_observer(&observer);
        }
        assert_eq!(observers.len(), 1);
        observers.notify_resized();
        assert!(observers.is_empty());
    }
}
