pub mod config;
pub mod loader;
pub mod mangadex;
pub mod preloader;
pub mod progress;
