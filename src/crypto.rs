//! # 凭据保险库
//!
//! 服务商 API 密钥的落库加密。每次加密生成新的随机盐与 IV，使用 PBKDF2-HMAC-SHA512
//! 从长期密钥派生本次的 AES-256-GCM 密钥。
//!
//! 密文布局（hex 编码后存储）：
//!
//! ```text
//! salt(64) || iv(16) || tag(16) || ciphertext
//! ```

use aes_gcm::{
    AesGcm,
    aead::{AeadInPlace, KeyInit, OsRng, consts::U16, generic_array::GenericArray},
    aes::Aes256,
};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha512;

use crate::error::{HubError, Result};

/// 16 字节 IV 的 AES-256-GCM
type VaultCipher = AesGcm<Aes256, U16>;

pub const SALT_LEN: usize = 64;
pub const IV_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const PBKDF2_ITERATIONS: u32 = 100_000;

const HEADER_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

/// 凭据保险库
pub struct CredentialVault {
    secret: SecretString,
    iterations: u32,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// 使用长期密钥创建保险库
    pub fn new(secret: impl Into<String>) -> Result<Self> {
        Self::with_iterations(secret, PBKDF2_ITERATIONS)
    }

    /// 指定派生迭代次数。测试中用较小的值加速，生产始终使用默认值
    pub fn with_iterations(secret: impl Into<String>, iterations: u32) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(HubError::config("凭据加密密钥不能为空"));
        }
        if iterations == 0 {
            return Err(HubError::config("密钥派生迭代次数必须大于0"));
        }
        Ok(Self {
            secret: SecretString::from(secret),
            iterations,
        })
    }

    /// 加密明文，返回 hex 编码的密文
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let cipher = self.cipher_for(&salt);
        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&iv), b"", &mut buffer)
            .map_err(|e| {
                HubError::internal_with_source(
                    "凭据加密失败",
                    anyhow::anyhow!("AES-GCM encryption failed: {e}"),
                )
            })?;

        let mut blob = Vec::with_capacity(HEADER_LEN + buffer.len());
        blob.extend_from_slice(&salt);
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&tag);
        blob.extend_from_slice(&buffer);
        Ok(hex::encode(blob))
    }

    /// 解密密文。任何结构错误或认证标签不匹配都返回同一个 `HubError::Decryption`
    pub fn decrypt(&self, blob: &str) -> Result<String> {
        let bytes = hex::decode(blob.trim()).map_err(|_| HubError::Decryption)?;
        if bytes.len() < HEADER_LEN {
            return Err(HubError::Decryption);
        }

        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (iv, rest) = rest.split_at(IV_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);

        let cipher = self.cipher_for(salt);
        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(iv),
                b"",
                &mut buffer,
                GenericArray::from_slice(tag),
            )
            .map_err(|_| HubError::Decryption)?;

        String::from_utf8(buffer).map_err(|_| HubError::Decryption)
    }

    fn cipher_for(&self, salt: &[u8]) -> VaultCipher {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha512>(
            self.secret.expose_secret().as_bytes(),
            salt,
            self.iterations,
            &mut key,
        );
        VaultCipher::new(GenericArray::from_slice(&key))
    }
}
