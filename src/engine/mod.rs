pub(crate) mod context;
pub(crate) mod dump;
pub(crate) mod image_manager;
pub(crate) mod render_engine;
pub(crate) mod settings;
