// utils
pub mod error;
pub mod xml;

// webdav
pub mod decoder;
pub mod encoder;
pub mod types;

// properties the server stores without interpreting them
pub mod deaddecoder;
pub mod deadencoder;
pub mod deadtypes;

// conditional headers (If, If-Match, If-None-Match)
pub mod ifheader;

// final type
pub mod realization;
