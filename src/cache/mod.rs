pub(crate) mod binder;
pub(crate) mod output;
pub(crate) mod texture;
