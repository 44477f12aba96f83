//! Request signature (`vcode`)
//!
//! The gateway recomputes this value from the amount, merchant id and order id
//! it receives, so any change to those fields in transit is detected.

use secrecy::{ExposeSecret, SecretString};

/// Compute the `vcode` for a redirect request.
///
/// MD5 over `amount ∥ merchant_id ∥ order_id ∥ vkey`, hex encoded in lowercase.
/// `amount` must already be formatted the way it is sent (two fractional digits).
pub fn vcode(amount: &str, merchant_id: &str, order_id: &str, vkey: &SecretString) -> String {
    let mut message =
        String::with_capacity(amount.len() + merchant_id.len() + order_id.len() + 32);
    message.push_str(amount);
    message.push_str(merchant_id);
    message.push_str(order_id);
    message.push_str(vkey.expose_secret());

    hex::encode(md5::compute(message.as_bytes()).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(value: &str) -> SecretString {
        SecretString::new(value.to_string())
    }

    #[test]
    fn test_vcode_matches_known_digest() {
        // md5("abcdefghijklmnopqrstuvwxyz")
        assert_eq!(
            vcode("abcdef", "ghijkl", "mnopqr", &key("stuvwxyz")),
            "c3fcd3d76192e4007dfb496cca67e13b"
        );
    }

    #[test]
    fn test_vcode_is_lowercase_hex() {
        let digest = vcode("100.00", "molpay_merchant", "1042", &key("vkey"));
        assert_eq!(digest.len(), 32);
        assert!(digest
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    }

    #[test]
    fn test_vcode_uses_no_delimiter() {
        // Only the concatenation matters, not where the boundaries fall.
        assert_eq!(
            vcode("10.00", "m1", "23", &key("k")),
            vcode("10.00m", "1", "23", &key("k"))
        );
    }
}
