use super::error::{ClientError, ClientResult};

const MIN_ADDRESS_LEN: usize = 39;
const MAX_ADDRESS_LEN: usize = 45;

/// Structural check for a bech32-style account address.
///
/// True iff the address starts with `prefix`, is 39 to 45 characters long and
/// everything after the prefix is lower-case ASCII alphanumeric. The embedded
/// bech32 checksum is NOT verified, so a charset-conforming string with a bad
/// checksum passes; the node rejects it on use. An empty prefix matches any
/// address; `Config::validate` keeps one out of configuration.
pub fn is_valid_address(address: &str, prefix: &str) -> bool {
    if !address.starts_with(prefix) {
        return false;
    }
    if address.len() < MIN_ADDRESS_LEN || address.len() > MAX_ADDRESS_LEN {
        return false;
    }
    let suffix = &address[prefix.len()..];
    !suffix.is_empty()
        && suffix
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
}

/// Same as [`is_valid_address`] but as a `Result` for `?` at call sites.
pub fn validate_address(address: &str, prefix: &str) -> ClientResult<()> {
    if is_valid_address(address, prefix) {
        Ok(())
    } else {
        Err(ClientError::InvalidAddress(format!(
            "'{}' is not a valid {} address",
            address, prefix
        )))
    }
}
