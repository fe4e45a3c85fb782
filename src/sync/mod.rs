pub(crate) mod cleanup;
pub(crate) mod flush;
pub(crate) mod tracer;
