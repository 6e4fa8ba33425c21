use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Account data is too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("Invalid discriminator for {name}")]
    InvalidDiscriminator { name: &'static str },

    #[error("Invalid {name} layout: {source}")]
    Decode {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not encode {name}: {source}")]
    Encode {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
