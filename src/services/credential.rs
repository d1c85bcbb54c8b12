//! 请求认证
//!
//! 使用 Argon2id 校验客户端提交的 `auth` 字段

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::debug;

use crate::errors::{AnalyzerError, Result};

/// 凭据校验 trait
///
/// 只回答"是否匹配"，不暴露失败原因
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, secret: &str, hash: &str) -> bool;
}

/// Argon2 PHC 格式哈希校验
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Verifier;

impl CredentialVerifier for Argon2Verifier {
    fn verify(&self, secret: &str, hash: &str) -> bool {
        let parsed = match PasswordHash::new(hash) {
            Ok(p) => p,
            Err(e) => {
                debug!("Configured auth hash is not a valid PHC string: {}", e);
                return false;
            }
        };

        Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok()
    }
}

/// 生成 Argon2id 哈希（`hash-password` 命令使用）
pub fn hash_secret(secret: &str) -> Result<String> {
    if secret.is_empty() {
        return Err(AnalyzerError::validation("secret cannot be empty"));
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AnalyzerError::validation(format!("Password hash error: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_secret("s3cret").expect("hash should succeed");
        assert!(hash.starts_with("$argon2id$"));

        let verifier = Argon2Verifier;
        assert!(verifier.verify("s3cret", &hash));
        assert!(!verifier.verify("wrong", &hash));
    }

    #[test]
    fn test_garbage_hash_never_matches() {
        assert!(!Argon2Verifier.verify("s3cret", "plaintext"));
        assert!(!Argon2Verifier.verify("", ""));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(hash_secret("").is_err());
    }
}
