//! Base64 that does not need to be percent-encoded.
//!
//! Identical to standard base64 except that `-` replaces `+`, `_` replaces `/`, and `=` padding
//! is dropped. Decoding accepts input with or without padding.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    DecodeError, Engine,
};

const URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub fn encode(input: impl AsRef<[u8]>) -> String {
    URL_SAFE.encode(input)
}

pub fn decode(input: impl AsRef<[u8]>) -> Result<Vec<u8>, DecodeError> {
    URL_SAFE.decode(input)
}
