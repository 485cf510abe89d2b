//! Password transforms for the salted authentication schemes.

use crate::error::{PgError, PgResult};

/// MD5 scheme: `"md5" + hex(MD5(hex(MD5(password + user)) + salt))`.
pub(crate) fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let inner = hex::encode(md5::compute(format!("{}{}", password, user)).0);

    let mut salted = Vec::with_capacity(inner.len() + salt.len());
    salted.extend_from_slice(inner.as_bytes());
    salted.extend_from_slice(salt);

    format!("md5{}", hex::encode(md5::compute(salted).0))
}

/// Legacy crypt scheme, transforming the password with DES `crypt(3)`
/// seeded by the two server-sent salt characters. Best effort: pre-7.2
/// servers only, and the salt must be printable ASCII.
pub(crate) fn crypt_password(password: &str, salt: &[u8; 2]) -> PgResult<String> {
    let salt = std::str::from_utf8(salt)
        .map_err(|_| PgError::Authentication("crypt salt is not valid ascii".to_owned()))?;
    pwhash::unix_crypt::hash_with(salt, password)
        .map_err(|e| PgError::Authentication(format!("crypt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_password_fixed_vector() {
        assert_eq!(
            "md52dc46741432a13a201acbd8ab9682f39",
            md5_password("yura", "secret", &[1, 2, 3, 4])
        );
    }

    #[test]
    fn test_md5_password_second_vector() {
        assert_eq!(
            "md521fe459d77d3e3ea9c9fcd5c11030d30",
            md5_password("zmjiang", "themanwhochangedchina", &[20, 247, 107, 249])
        );
    }

    #[test]
    fn test_crypt_password() {
        let hashed = crypt_password("secret", b"ab").unwrap();
        assert_eq!("abNANd1rDfiNc", hashed);
    }

    #[test]
    fn test_crypt_password_rejects_non_ascii_salt() {
        assert!(crypt_password("secret", &[0xff, 0xfe]).is_err());
    }
}
