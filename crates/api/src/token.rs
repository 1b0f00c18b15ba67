//! # 会话令牌编解码
//!
//! 无状态的签名令牌：`base32(json(payload)) + "z" + base32(hmac_sha256(secret, 编码段))`。
//! base32 采用 `0-9a-v` 字母表且不填充，`z` 不在字母表内，因此可以无歧义地作为分隔符。

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";
const DELIMITER: char = 'z';

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to serialize token payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Invalid signing key")]
    Key,
}

/// # Summary
/// 将字节序列编码为 base32 (`0-9a-v`，无填充)。
///
/// # Logic
/// 按大端位序每 5 位输出一个字符，末尾不足 5 位时低位补零。
pub fn base32_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: usize = 0;
    let mut bits = 0;
    for &byte in bytes {
        buffer = (buffer << 8) | usize::from(byte);
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(char::from(ALPHABET[(buffer >> bits) & 0x1f]));
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(char::from(ALPHABET[(buffer << (5 - bits)) & 0x1f]));
    }
    out
}

/// # Summary
/// 解码 base32 字符串，大小写不敏感。
///
/// # Logic
/// 1. 长度对 8 取余只能是 0/2/4/5/7，其余长度不可能由编码产生。
/// 2. 每累积满 8 位输出一个字节，末尾不足 8 位的填充位丢弃。
///
/// # Returns
/// * `None` - 输入为空、长度非法或含有字母表以外的字符。
pub fn base32_decode(input: &str) -> Option<Vec<u8>> {
    if input.is_empty() || !matches!(input.len() % 8, 0 | 2 | 4 | 5 | 7) {
        return None;
    }

    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: usize = 0;
    let mut bits = 0;
    for c in input.bytes() {
        let value = match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'v' => c - b'a' + 10,
            b'A'..=b'V' => c - b'A' + 10,
            _ => return None,
        };
        buffer = (buffer << 5) | usize::from(value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push(u8::try_from((buffer >> bits) & 0xff).ok()?);
            buffer &= (1 << bits) - 1;
        }
    }
    Some(out)
}

fn signer(secret: &[u8]) -> Result<HmacSha256, TokenError> {
    HmacSha256::new_from_slice(secret).map_err(|_| TokenError::Key)
}

/// # Summary
/// 签发令牌。
///
/// # Arguments
/// * `payload` - 任意可序列化为 JSON 的载荷。
/// * `secret` - HMAC 密钥。
pub fn encode<T: Serialize>(payload: &T, secret: &[u8]) -> Result<String, TokenError> {
    let encoded = base32_encode(&serde_json::to_vec(payload)?);
    let mut mac = signer(secret)?;
    mac.update(encoded.as_bytes());
    let signature = base32_encode(&mac.finalize().into_bytes());
    Ok(format!("{}{}{}", encoded, DELIMITER, signature))
}

/// # Summary
/// 校验令牌并取回载荷。
///
/// # Logic
/// 1. 以第一个 `z` 拆分为编码段与签名段，签名段只接受规范的小写编码。
/// 2. 对编码段重新计算 HMAC，与签名段做常量时间比较。
/// 3. 解码编码段并反序列化。
///
/// # Returns
/// * `None` - 格式错误、签名不符或载荷无法解析，从不 panic。
pub fn verify<T: DeserializeOwned>(token: &str, secret: &[u8]) -> Option<T> {
    let (encoded, segment) = token.split_once(DELIMITER)?;
    let signature = base32_decode(segment)?;
    // 签名段必须是规范编码：小写且尾部填充位为 0
    if base32_encode(&signature) != segment {
        return None;
    }

    let mut mac = signer(secret).ok()?;
    mac.update(encoded.as_bytes());
    mac.verify_slice(&signature).ok()?;

    let content = base32_decode(encoded)?;
    serde_json::from_slice(&content).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Claims {
        iat: i64,
        exp: i64,
    }

    const SECRET: &[u8] = &[0x01, 0x23, 0x45, 0x67];

    #[test]
    fn test_base32_known_vectors() {
        // base32hex 小写、无填充
        assert_eq!(base32_encode(b""), "");
        assert_eq!(base32_encode(b"f"), "co");
        assert_eq!(base32_encode(b"fo"), "cpng");
        assert_eq!(base32_encode(b"foo"), "cpnmu");
        assert_eq!(base32_encode(b"foob"), "cpnmuog");
        assert_eq!(base32_encode(b"fooba"), "cpnmuoj1");
        assert_eq!(base32_encode(b"foobar"), "cpnmuoj1e8");
    }

    #[test]
    fn test_base32_decode_rules() {
        assert_eq!(base32_decode("cpnmuoj1e8").as_deref(), Some(&b"foobar"[..]));
        assert_eq!(base32_decode("CPNMUOJ1E8").as_deref(), Some(&b"foobar"[..]));
        // 长度对 8 取余为 1/3/6 不合法
        assert_eq!(base32_decode("c"), None);
        assert_eq!(base32_decode("cpn"), None);
        assert_eq!(base32_decode("cpnmuo"), None);
        // 字母表以外的字符
        assert_eq!(base32_decode("cw"), None);
        assert_eq!(base32_decode(""), None);
    }

    #[test]
    fn test_token_round_trip() {
        let claims = Claims { iat: 100, exp: 200 };
        let token = encode(&claims, SECRET).unwrap();

        let (body, sig) = token.split_once('z').unwrap();
        assert!(!body.contains('z') && !sig.contains('z'));
        assert_eq!(verify::<Claims>(&token, SECRET), Some(claims));

        let value = serde_json::json!({"nested": {"list": [1, 2, 3]}, "s": "text"});
        let token = encode(&value, SECRET).unwrap();
        assert_eq!(verify::<serde_json::Value>(&token, SECRET), Some(value));
    }

    #[test]
    fn test_tampered_tokens_are_rejected() {
        let token = encode(&Claims { iat: 1, exp: 2 }, SECRET).unwrap();

        assert_eq!(verify::<Claims>(&token, b"other secret"), None);

        let mut tampered = token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert_eq!(verify::<Claims>(&tampered, SECRET), None);

        let forged = encode(&Claims { iat: 1, exp: 9_999 }, SECRET).unwrap();
        let (forged_body, _) = forged.split_once('z').unwrap();
        let (_, sig) = token.split_once('z').unwrap();
        assert_eq!(verify::<Claims>(&format!("{}z{}", forged_body, sig), SECRET), None);

        assert_eq!(verify::<Claims>("no-delimiter", SECRET), None);
    }

    #[test]
    fn test_signature_segment_must_be_canonical() {
        let token = encode(&Claims { iat: 1, exp: 2 }, SECRET).unwrap();
        let (body, sig) = token.split_once('z').unwrap();

        let upper = format!("{}z{}", body, sig.to_uppercase());
        assert_ne!(upper, token);
        assert_eq!(verify::<Claims>(&upper, SECRET), None);
        assert_eq!(verify::<Claims>(&token, SECRET), Some(Claims { iat: 1, exp: 2 }));
        assert_eq!(verify::<Claims>("", SECRET), None);
    }
}
