mod attrs;
mod generate;

pub(crate) use generate::derive_model;
