//! Interfaces to components outside the history store.

mod extension_loader;
mod wallpaper;

pub use extension_loader::{
    ExternalComponentLoader, LoadFinished, IN_APP_PAYMENTS_SUPPORT_APP_ID, WEBSTORE_UPDATE_URL,
};
pub use wallpaper::{WallpaperResizerObserver, WallpaperResizerObservers};
