//! NTLM scheme handler.
//!
//! NTLM is a stateful two-message handshake. On the initial challenge
//! (no server type-2 material) the handler emits a type-1 negotiation
//! message; once the server's type-2 message arrives in the challenge,
//! it computes an NTLMv2 type-3 authentication message from the
//! domain/workstation/credential (MS-NLMP).

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use md4::{Digest as _, Md4};
use md5::Md5;
use rand::RngCore;

use quay_core::error::AuthError;
use quay_core::{AuthChallenge, ChallengeContext, Result, SchemeHandler};

type HmacMd5 = Hmac<Md5>;

const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

const NEGOTIATE_UNICODE: u32 = 0x0000_0001;
const NEGOTIATE_OEM: u32 = 0x0000_0002;
const REQUEST_TARGET: u32 = 0x0000_0004;
const NEGOTIATE_NTLM: u32 = 0x0000_0200;
const OEM_DOMAIN_SUPPLIED: u32 = 0x0000_1000;
const OEM_WORKSTATION_SUPPLIED: u32 = 0x0000_2000;
const NEGOTIATE_ALWAYS_SIGN: u32 = 0x0000_8000;
const NEGOTIATE_EXTENDED_SESSIONSECURITY: u32 = 0x0008_0000;

/// Seconds between the Windows epoch (1601) and the Unix epoch (1970).
const FILETIME_EPOCH_OFFSET_SECS: u64 = 11_644_473_600;

/// Protocol position within the two-message handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No negotiation sent yet; the next response is a type-1 message.
    AwaitingChallenge,
    /// Type-1 sent; the next challenge should carry the server's type-2
    /// message.
    AwaitingVerification,
}

/// Stateful NTLM handshake handler.
pub struct NtlmHandler {
    username: String,
    password: String,
    domain: String,
    workstation: String,
    state: Mutex<HandshakeState>,
}

impl NtlmHandler {
    /// NTLM handler for the given credential and environment.
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: impl Into<String>,
        workstation: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: domain.into(),
            workstation: workstation.into(),
            state: Mutex::new(HandshakeState::AwaitingChallenge),
        }
    }

    /// Current handshake position.
    pub fn state(&self) -> HandshakeState {
        *self.state.lock().unwrap()
    }

    fn type1_message(&self) -> Vec<u8> {
        let domain = self.domain.to_ascii_uppercase().into_bytes();
        let workstation = self.workstation.to_ascii_uppercase().into_bytes();

        let mut flags = NEGOTIATE_UNICODE
            | NEGOTIATE_OEM
            | REQUEST_TARGET
            | NEGOTIATE_NTLM
            | NEGOTIATE_ALWAYS_SIGN
            | NEGOTIATE_EXTENDED_SESSIONSECURITY;
        if !domain.is_empty() {
            flags |= OEM_DOMAIN_SUPPLIED;
        }
        if !workstation.is_empty() {
            flags |= OEM_WORKSTATION_SUPPLIED;
        }

        let header_len = 32u32;
        let mut message = Vec::with_capacity(32 + domain.len() + workstation.len());
        message.extend_from_slice(SIGNATURE);
        message.extend_from_slice(&1u32.to_le_bytes());
        message.extend_from_slice(&flags.to_le_bytes());
        push_buffer_descriptor(&mut message, &domain, header_len + workstation.len() as u32);
        push_buffer_descriptor(&mut message, &workstation, header_len);
        message.extend_from_slice(&workstation);
        message.extend_from_slice(&domain);
        message
    }

    fn type3_message(&self, type2: &[u8]) -> Result<Vec<u8>> {
        if type2.len() < 32 || &type2[..8] != SIGNATURE {
            return Err(self.invalid("server message is not an NTLM type-2 message"));
        }
        let message_type = u32::from_le_bytes([type2[8], type2[9], type2[10], type2[11]]);
        if message_type != 2 {
            return Err(self.invalid(&format!(
                "expected type-2 message, got type {}",
                message_type
            )));
        }

        let server_challenge: [u8; 8] = type2[24..32]
            .try_into()
            .map_err(|_| self.invalid("truncated server challenge"))?;
        let target_info = read_buffer(type2, 40).unwrap_or_default();

        let mut client_nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut client_nonce);
        let timestamp = filetime_now();

        let ntlmv2_hash = ntlmv2_hash(&self.username, &self.password, &self.domain);
        let nt_response = ntlmv2_response(
            &ntlmv2_hash,
            &server_challenge,
            &client_nonce,
            timestamp,
            &target_info,
        );
        let lm_response = lmv2_response(&ntlmv2_hash, &server_challenge, &client_nonce);

        let domain = utf16le(&self.domain);
        let user = utf16le(&self.username);
        let workstation = utf16le(&self.workstation);

        let flags = NEGOTIATE_UNICODE
            | REQUEST_TARGET
            | NEGOTIATE_NTLM
            | NEGOTIATE_ALWAYS_SIGN
            | NEGOTIATE_EXTENDED_SESSIONSECURITY;

        // type-3 layout: signature, type, six security buffers
        // (lm, nt, domain, user, workstation, session key), flags, payload
        let header_len = 64u32;
        let mut offset = header_len;
        let mut message = Vec::new();
        message.extend_from_slice(SIGNATURE);
        message.extend_from_slice(&3u32.to_le_bytes());

        let mut payload = Vec::new();
        for field in [
            &lm_response[..],
            &nt_response[..],
            &domain[..],
            &user[..],
            &workstation[..],
            &[][..], // session key omitted
        ] {
            push_buffer_descriptor(&mut message, field, offset);
            payload.extend_from_slice(field);
            offset += field.len() as u32;
        }
        message.extend_from_slice(&flags.to_le_bytes());
        message.extend_from_slice(&payload);
        Ok(message)
    }

    fn invalid(&self, reason: &str) -> quay_core::Error {
        AuthError::ChallengeInvalid {
            scheme: "NTLM".to_string(),
            reason: reason.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl SchemeHandler for NtlmHandler {
    fn scheme(&self) -> &str {
        "ntlm"
    }

    async fn respond(&self, challenge: &AuthChallenge, _context: &ChallengeContext) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        match challenge.token68() {
            None => {
                *state = HandshakeState::AwaitingVerification;
                Ok(format!("NTLM {}", STANDARD.encode(self.type1_message())))
            }
            Some(token) => {
                let type2 = STANDARD
                    .decode(token)
                    .map_err(|e| self.invalid(&format!("undecodable type-2 message: {e}")))?;
                let message = self.type3_message(&type2)?;
                *state = HandshakeState::AwaitingChallenge;
                Ok(format!("NTLM {}", STANDARD.encode(message)))
            }
        }
    }
}

/// Append a security buffer descriptor (len, maxlen, offset).
fn push_buffer_descriptor(message: &mut Vec<u8>, data: &[u8], offset: u32) {
    let len = data.len() as u16;
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&len.to_le_bytes());
    message.extend_from_slice(&offset.to_le_bytes());
}

/// Read the payload referenced by the security buffer descriptor at
/// `descriptor_offset`.
fn read_buffer(message: &[u8], descriptor_offset: usize) -> Option<Vec<u8>> {
    if message.len() < descriptor_offset + 8 {
        return None;
    }
    let len = u16::from_le_bytes([message[descriptor_offset], message[descriptor_offset + 1]])
        as usize;
    let offset = u32::from_le_bytes([
        message[descriptor_offset + 4],
        message[descriptor_offset + 5],
        message[descriptor_offset + 6],
        message[descriptor_offset + 7],
    ]) as usize;
    message.get(offset..offset + len).map(<[u8]>::to_vec)
}

fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(u16::to_le_bytes).collect()
}

/// NTOWFv2: HMAC-MD5 over the uppercased user + domain, keyed with the
/// MD4 of the UTF-16LE password.
fn ntlmv2_hash(username: &str, password: &str, domain: &str) -> [u8; 16] {
    let nt_hash = Md4::digest(utf16le(password));
    let mut mac =
        HmacMd5::new_from_slice(nt_hash.as_slice()).expect("HMAC accepts any key length");
    mac.update(&utf16le(&format!(
        "{}{}",
        username.to_uppercase(),
        domain
    )));
    mac.finalize().into_bytes().into()
}

fn ntlmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_nonce: &[u8; 8],
    timestamp: u64,
    target_info: &[u8],
) -> Vec<u8> {
    // temp blob: version, timestamp, client nonce, target info
    let mut blob = Vec::with_capacity(28 + target_info.len() + 4);
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_nonce);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0x00; 4]);

    let mut mac = HmacMd5::new_from_slice(ntlmv2_hash).expect("HMAC accepts any key length");
    mac.update(server_challenge);
    mac.update(&blob);
    let proof = mac.finalize().into_bytes();

    let mut response = Vec::with_capacity(16 + blob.len());
    response.extend_from_slice(proof.as_slice());
    response.extend_from_slice(&blob);
    response
}

fn lmv2_response(
    ntlmv2_hash: &[u8; 16],
    server_challenge: &[u8; 8],
    client_nonce: &[u8; 8],
) -> Vec<u8> {
    let mut mac = HmacMd5::new_from_slice(ntlmv2_hash).expect("HMAC accepts any key length");
    mac.update(server_challenge);
    mac.update(client_nonce);
    let mut response = mac.finalize().into_bytes().as_slice().to_vec();
    response.extend_from_slice(client_nonce);
    response
}

fn filetime_now() -> u64 {
    let unix_secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    (unix_secs + FILETIME_EPOCH_OFFSET_SECS) * 10_000_000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> NtlmHandler {
        NtlmHandler::new("user", "SecREt01", "DOMAIN", "WORKSTATION")
    }

    fn context() -> ChallengeContext {
        ChallengeContext::new("GET", "/")
    }

    /// A minimal, well-formed type-2 message: signature, type, target
    /// name buffer (empty), flags, server challenge, no target info.
    fn type2_fixture() -> String {
        let mut message = Vec::new();
        message.extend_from_slice(SIGNATURE);
        message.extend_from_slice(&2u32.to_le_bytes());
        push_buffer_descriptor(&mut message, &[], 48);
        message.extend_from_slice(&NEGOTIATE_UNICODE.to_le_bytes());
        message.extend_from_slice(&[0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef]);
        message.extend_from_slice(&[0x00; 8]); // context
        push_buffer_descriptor(&mut message, &[], 48); // target info (empty)
        STANDARD.encode(message)
    }

    #[tokio::test]
    async fn initial_challenge_yields_type1() {
        let handler = handler();
        let challenge = AuthChallenge::new("NTLM");
        let value = handler.respond(&challenge, &context()).await.unwrap();
        let encoded = value.strip_prefix("NTLM ").unwrap();
        let message = STANDARD.decode(encoded).unwrap();
        assert_eq!(&message[..8], SIGNATURE);
        assert_eq!(
            u32::from_le_bytes([message[8], message[9], message[10], message[11]]),
            1
        );
        assert_eq!(handler.state(), HandshakeState::AwaitingVerification);
    }

    #[tokio::test]
    async fn type2_material_yields_type3() {
        let handler = handler();
        let bare = AuthChallenge::new("NTLM");
        handler.respond(&bare, &context()).await.unwrap();

        let challenges =
            AuthChallenge::parse_headers(&[format!("NTLM {}", type2_fixture())]);
        let value = handler.respond(&challenges[0], &context()).await.unwrap();
        let encoded = value.strip_prefix("NTLM ").unwrap();
        let message = STANDARD.decode(encoded).unwrap();
        assert_eq!(&message[..8], SIGNATURE);
        assert_eq!(
            u32::from_le_bytes([message[8], message[9], message[10], message[11]]),
            3
        );
        // handshake complete, ready for the next negotiation
        assert_eq!(handler.state(), HandshakeState::AwaitingChallenge);
    }

    #[tokio::test]
    async fn garbage_type2_is_invalid() {
        let handler = handler();
        let challenges = AuthChallenge::parse_headers(&["NTLM AAAA"]);
        let result = handler.respond(&challenges[0], &context()).await;
        assert!(matches!(
            result,
            Err(quay_core::Error::Auth(AuthError::ChallengeInvalid { .. }))
        ));
    }

    #[test]
    fn ntlmv2_hash_is_deterministic() {
        let a = ntlmv2_hash("user", "SecREt01", "DOMAIN");
        let b = ntlmv2_hash("user", "SecREt01", "DOMAIN");
        assert_eq!(a, b);
        let c = ntlmv2_hash("user", "different", "DOMAIN");
        assert_ne!(a, c);
    }

    #[test]
    fn lmv2_response_embeds_client_nonce() {
        let hash = ntlmv2_hash("user", "SecREt01", "DOMAIN");
        let challenge = [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef];
        let nonce = [0xff, 0xff, 0xff, 0x00, 0x11, 0x22, 0x33, 0x44];
        let response = lmv2_response(&hash, &challenge, &nonce);
        assert_eq!(response.len(), 24);
        assert_eq!(&response[16..], &nonce);
    }
}
