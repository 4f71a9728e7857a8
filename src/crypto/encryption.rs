//! Standard security handler, ISO 32000-1 §7.6.3 revisions 2-4 and the
//! revision 6 (AES-256) scheme from the PDF 2.0 supplement.
//!
//! Key derivation for revisions 2-4 is the MD5/RC4 cascade; revision 6
//! wraps a random file key in OE/UE via the hardened SHA-2 hash. Per-object
//! keys apply to revisions up to 4 only; revision 6 uses the file key
//! directly.

use super::{CryptoError, CryptoResult, Permissions};
use crate::error::{Error, Result};
use crate::types::{ObjectId, PdfDictionary, PdfName, PdfString, PdfValue};
use aes::cipher::block_padding::{NoPadding, Pkcs7};
use aes::cipher::{BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha384, Sha512};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const PASSWORD_PAD: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Appended to the per-object key input for AES crypt filters.
const AES_OBJECT_SALT: [u8; 4] = *b"sAlT";

/// Encryption flavor of a document. Maps one-to-one onto the V/R pairs the
/// standard handler writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMode {
    Rc4_40,
    Rc4_128,
    Aes128,
    Aes256,
}

impl EncryptionMode {
    pub fn v(self) -> i64 {
        match self {
            EncryptionMode::Rc4_40 => 1,
            EncryptionMode::Rc4_128 => 2,
            EncryptionMode::Aes128 => 4,
            EncryptionMode::Aes256 => 5,
        }
    }

    pub fn r(self) -> i64 {
        match self {
            EncryptionMode::Rc4_40 => 2,
            EncryptionMode::Rc4_128 => 3,
            EncryptionMode::Aes128 => 4,
            EncryptionMode::Aes256 => 6,
        }
    }

    /// Key length in bits, the `/Length` entry.
    pub fn length_bits(self) -> i64 {
        match self {
            EncryptionMode::Rc4_40 => 40,
            EncryptionMode::Rc4_128 | EncryptionMode::Aes128 => 128,
            EncryptionMode::Aes256 => 256,
        }
    }

    pub fn key_len(self) -> usize {
        (self.length_bits() / 8) as usize
    }

    pub fn uses_aes(self) -> bool {
        matches!(self, EncryptionMode::Aes128 | EncryptionMode::Aes256)
    }

    pub fn from_key_length(bits: u16, aes: bool) -> Result<Self> {
        match (bits, aes) {
            (40, false) => Ok(EncryptionMode::Rc4_40),
            (128, false) => Ok(EncryptionMode::Rc4_128),
            (128, true) => Ok(EncryptionMode::Aes128),
            (256, _) => Ok(EncryptionMode::Aes256),
            (other, _) => Err(Error::KeyLengthMismatch(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EncryptionMode::Rc4_40 => "RC4-40",
            EncryptionMode::Rc4_128 => "RC4-128",
            EncryptionMode::Aes128 => "AES-128",
            EncryptionMode::Aes256 => "AES-256",
        }
    }
}

/// Authenticated encryption state of a document: everything needed to
/// decrypt on read and re-encrypt on write.
#[derive(Debug, Clone)]
pub struct Encryption {
    pub mode: EncryptionMode,
    pub permissions: Permissions,
    pub encrypt_metadata: bool,
    /// Set when the owner password verified; required for permission and
    /// password changes.
    pub owner_authenticated: bool,
    /// File key length in bytes. Revision 3 allows anything from 5 to 16;
    /// the canonical modes pin it otherwise.
    key_len: usize,
    file_key: Vec<u8>,
    o: Vec<u8>,
    u: Vec<u8>,
    oe: Option<Vec<u8>>,
    ue: Option<Vec<u8>>,
    perms: Option<Vec<u8>>,
    id0: Vec<u8>,
}

impl Encryption {
    /// Build the handler from a parsed `/Encrypt` dictionary and
    /// authenticate with the supplied passwords. The user password is tried
    /// first, then the owner password; either grants the file key, owner
    /// success additionally unlocks permission changes.
    pub fn from_encrypt_dict(
        dict: &PdfDictionary,
        id0: &[u8],
        user_pw: &str,
        owner_pw: &str,
    ) -> Result<Encryption> {
        let filter = dict
            .get_name("Filter")
            .map(|n| n.without_slash().to_string())
            .unwrap_or_else(|| "Standard".to_string());
        if filter != "Standard" {
            return Err(Error::UnsupportedSecurityHandler(filter));
        }

        let v = dict.get_integer("V").unwrap_or(0);
        let r = dict.get_integer("R").unwrap_or(0);
        let length = dict.get_integer("Length").unwrap_or(40);
        let p = dict.get_integer("P").unwrap_or(-1);
        let o = string_bytes(dict, "O")?;
        let u = string_bytes(dict, "U")?;
        let encrypt_metadata = dict
            .get("EncryptMetadata")
            .and_then(|val| val.as_bool())
            .unwrap_or(true);

        let mode = match (v, r) {
            (1, 2) => EncryptionMode::Rc4_40,
            (2, 3) => EncryptionMode::Rc4_128,
            (4, 4) => match crypt_filter_method(dict).as_deref() {
                Some("AESV2") => EncryptionMode::Aes128,
                Some("V2") | None => EncryptionMode::Rc4_128,
                Some(other) => {
                    return Err(Error::UnsupportedSecurityHandler(format!(
                        "crypt filter {}",
                        other
                    )))
                }
            },
            (5, 6) => EncryptionMode::Aes256,
            (v, r) => {
                return Err(Error::UnsupportedSecurityHandler(format!(
                    "V {} R {}",
                    v, r
                )))
            }
        };

        let key_len = match mode {
            EncryptionMode::Aes256 => 32,
            EncryptionMode::Aes128 => 16,
            _ => ((length / 8).clamp(5, 16)) as usize,
        };

        let mut enc = Encryption {
            mode,
            permissions: Permissions::from_p(p),
            encrypt_metadata,
            owner_authenticated: false,
            key_len,
            file_key: Vec::new(),
            o,
            u,
            oe: dict.get_string("OE").map(|s| s.as_bytes().to_vec()),
            ue: dict.get_string("UE").map(|s| s.as_bytes().to_vec()),
            perms: dict.get_string("Perms").map(|s| s.as_bytes().to_vec()),
            id0: id0.to_vec(),
        };

        if mode == EncryptionMode::Aes256 {
            enc.authenticate_r6(user_pw, owner_pw, length)?;
        } else {
            enc.authenticate_r234(user_pw, owner_pw)?;
        }
        Ok(enc)
    }

    /// Derive a fresh encryption state for a document about to be
    /// encrypted. Passwords may be empty; the owner password falls back to
    /// the user password as the original does.
    pub fn new_for_writing(
        mode: EncryptionMode,
        permissions: Permissions,
        user_pw: &str,
        owner_pw: &str,
        id0: &[u8],
        encrypt_metadata: bool,
    ) -> CryptoResult<Encryption> {
        let owner_pw = if owner_pw.is_empty() { user_pw } else { owner_pw };

        if mode == EncryptionMode::Aes256 {
            return Encryption::new_r6(mode, permissions, user_pw, owner_pw, id0, encrypt_metadata);
        }

        let r = mode.r();
        let key_len = mode.key_len();
        let o = compute_o(owner_pw.as_bytes(), user_pw.as_bytes(), r, key_len);
        let file_key = derive_file_key_r234(
            &pad_password(user_pw.as_bytes()),
            &o,
            permissions,
            id0,
            r,
            key_len,
            encrypt_metadata,
        );
        let u = compute_u(&file_key, id0, r);

        Ok(Encryption {
            mode,
            permissions,
            encrypt_metadata,
            owner_authenticated: true,
            key_len,
            file_key,
            o,
            u,
            oe: None,
            ue: None,
            perms: None,
            id0: id0.to_vec(),
        })
    }

    fn new_r6(
        mode: EncryptionMode,
        permissions: Permissions,
        user_pw: &str,
        owner_pw: &str,
        id0: &[u8],
        encrypt_metadata: bool,
    ) -> CryptoResult<Encryption> {
        let mut rng = rand::rngs::OsRng;
        let mut file_key = vec![0u8; 32];
        rng.fill_bytes(&mut file_key);

        let mut salts = [0u8; 16];
        rng.fill_bytes(&mut salts);
        let (uvs, uks) = (&salts[..8], &salts[8..]);

        let user_pw = truncate_utf8(user_pw, 127);
        let owner_pw = truncate_utf8(owner_pw, 127);

        let mut u = hash_r6(user_pw.as_bytes(), uvs, &[]).to_vec();
        u.extend_from_slice(uvs);
        u.extend_from_slice(uks);
        let ue_key = hash_r6(user_pw.as_bytes(), uks, &[]);
        let ue = aes256_cbc_nopad_encrypt(&ue_key, &[0u8; 16], &file_key)?;

        let mut osalts = [0u8; 16];
        rng.fill_bytes(&mut osalts);
        let (ovs, oks) = (&osalts[..8], &osalts[8..]);

        let mut o = hash_r6(owner_pw.as_bytes(), ovs, &u).to_vec();
        o.extend_from_slice(ovs);
        o.extend_from_slice(oks);
        let oe_key = hash_r6(owner_pw.as_bytes(), oks, &u);
        let oe = aes256_cbc_nopad_encrypt(&oe_key, &[0u8; 16], &file_key)?;

        let perms = seal_perms(&file_key, permissions, encrypt_metadata)?;

        Ok(Encryption {
            mode,
            permissions,
            encrypt_metadata,
            owner_authenticated: true,
            key_len: 32,
            file_key,
            o,
            u,
            oe: Some(oe),
            ue: Some(ue),
            perms: Some(perms),
            id0: id0.to_vec(),
        })
    }

    fn authenticate_r234(&mut self, user_pw: &str, owner_pw: &str) -> Result<()> {
        // User password test (algorithm 6).
        if self.check_user_password(&pad_password(user_pw.as_bytes())) {
            // A matching owner password additionally unlocks re-permission.
            if self.check_owner_password(owner_pw) {
                self.owner_authenticated = true;
            }
            return Ok(());
        }

        // Owner password test (algorithm 7): recover the padded user
        // password from O and run the user test with it.
        for candidate in [owner_pw, user_pw] {
            if self.check_owner_password(candidate) {
                self.owner_authenticated = true;
                return Ok(());
            }
        }

        Err(Error::EncryptionAuthFailed)
    }

    fn check_user_password(&mut self, padded: &[u8; 32]) -> bool {
        let r = self.mode.r();
        let key = derive_file_key_r234(
            padded,
            &self.o,
            self.permissions,
            &self.id0,
            r,
            self.key_len,
            self.encrypt_metadata,
        );
        let expected = compute_u(&key, &self.id0, r);
        let matches = if r == 2 {
            self.u.len() >= 32 && expected[..32] == self.u[..32]
        } else {
            self.u.len() >= 16 && expected[..16] == self.u[..16]
        };
        if matches {
            self.file_key = key;
        }
        matches
    }

    fn check_owner_password(&mut self, owner_pw: &str) -> bool {
        if self.o.len() < 32 {
            return false;
        }
        let r = self.mode.r();
        let rc4_key = owner_rc4_key(owner_pw.as_bytes(), r, self.key_len);

        let mut recovered = self.o[..32].to_vec();
        if r == 2 {
            recovered = rc4(&rc4_key, &recovered);
        } else {
            for i in (0..=19u8).rev() {
                let step_key: Vec<u8> = rc4_key.iter().map(|b| b ^ i).collect();
                recovered = rc4(&step_key, &recovered);
            }
        }

        let mut padded = [0u8; 32];
        padded.copy_from_slice(&recovered[..32]);
        self.check_user_password(&padded)
    }

    fn authenticate_r6(&mut self, user_pw: &str, owner_pw: &str, _length: i64) -> Result<()> {
        if self.u.len() < 48 || self.o.len() < 48 {
            return Err(Error::EncryptionAuthFailed);
        }
        let user_pw = truncate_utf8(user_pw, 127);
        let owner_pw = truncate_utf8(owner_pw, 127);
        let u48 = self.u[..48].to_vec();

        // Owner check first: its hash covers U, so U must be intact anyway.
        let owner_hash = hash_r6(owner_pw.as_bytes(), &self.o[32..40], &u48);
        if owner_hash[..] == self.o[..32] {
            let ik = hash_r6(owner_pw.as_bytes(), &self.o[40..48], &u48);
            let oe = self.oe.as_ref().ok_or(Error::EncryptionAuthFailed)?;
            self.file_key = aes256_cbc_nopad_decrypt(&ik, &[0u8; 16], oe)
                .map_err(|_| Error::EncryptionAuthFailed)?;
            self.owner_authenticated = true;
            self.verify_perms()?;
            return Ok(());
        }

        for candidate in [user_pw.as_str(), owner_pw.as_str()] {
            let user_hash = hash_r6(candidate.as_bytes(), &self.u[32..40], &[]);
            if user_hash[..] == self.u[..32] {
                let ik = hash_r6(candidate.as_bytes(), &self.u[40..48], &[]);
                let ue = self.ue.as_ref().ok_or(Error::EncryptionAuthFailed)?;
                self.file_key = aes256_cbc_nopad_decrypt(&ik, &[0u8; 16], ue)
                    .map_err(|_| Error::EncryptionAuthFailed)?;
                self.verify_perms()?;
                return Ok(());
            }
        }

        Err(Error::EncryptionAuthFailed)
    }

    /// Decrypt and check the `/Perms` blob against the clear `/P` value.
    fn verify_perms(&mut self) -> Result<()> {
        let Some(perms) = self.perms.as_ref() else {
            return Ok(());
        };
        if perms.len() < 16 {
            return Err(Error::EncryptionAuthFailed);
        }
        let block = aes256_ecb_decrypt_block(&self.file_key, &perms[..16])
            .map_err(|_| Error::EncryptionAuthFailed)?;
        if &block[9..12] != b"adb" {
            return Err(Error::EncryptionAuthFailed);
        }
        let p = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        self.permissions = Permissions::from_p(p as i32 as i64);
        self.encrypt_metadata = block[8] == b'T';
        Ok(())
    }

    /// Synthesize the `/Encrypt` dictionary for writing.
    pub fn to_dict(&self) -> PdfDictionary {
        let mut dict = PdfDictionary::new();
        dict.insert("Filter", PdfValue::Name(PdfName::new("Standard")));
        dict.insert("V", PdfValue::Integer(self.mode.v()));
        dict.insert("R", PdfValue::Integer(self.mode.r()));
        dict.insert("Length", PdfValue::Integer((self.key_len * 8) as i64));
        dict.insert("P", PdfValue::Integer(self.permissions.as_p()));
        dict.insert(
            "O",
            PdfValue::String(PdfString::new_hex(self.o.clone())),
        );
        dict.insert(
            "U",
            PdfValue::String(PdfString::new_hex(self.u.clone())),
        );

        if self.mode.v() >= 4 {
            let mut cf = PdfDictionary::new();
            let mut stdcf = PdfDictionary::new();
            let cfm = match self.mode {
                EncryptionMode::Aes128 => "AESV2",
                EncryptionMode::Aes256 => "AESV3",
                _ => "V2",
            };
            stdcf.insert("Type", PdfValue::Name(PdfName::new("CryptFilter")));
            stdcf.insert("CFM", PdfValue::Name(PdfName::new(cfm)));
            stdcf.insert("AuthEvent", PdfValue::Name(PdfName::new("DocOpen")));
            stdcf.insert(
                "Length",
                PdfValue::Integer(if self.mode == EncryptionMode::Aes256 {
                    32
                } else {
                    16
                }),
            );
            cf.insert("StdCF", PdfValue::Dictionary(stdcf));
            dict.insert("CF", PdfValue::Dictionary(cf));
            dict.insert("StmF", PdfValue::Name(PdfName::new("StdCF")));
            dict.insert("StrF", PdfValue::Name(PdfName::new("StdCF")));
        }

        if self.mode == EncryptionMode::Aes256 {
            if let Some(oe) = &self.oe {
                dict.insert("OE", PdfValue::String(PdfString::new_hex(oe.clone())));
            }
            if let Some(ue) = &self.ue {
                dict.insert("UE", PdfValue::String(PdfString::new_hex(ue.clone())));
            }
            if let Some(perms) = &self.perms {
                dict.insert("Perms", PdfValue::String(PdfString::new_hex(perms.clone())));
            }
        }

        if !self.encrypt_metadata {
            dict.insert("EncryptMetadata", PdfValue::Boolean(false));
        }

        dict
    }

    /// Rewrite the permission flags. Requires prior owner authentication.
    pub fn set_permissions(&mut self, permissions: Permissions) -> Result<()> {
        if !self.owner_authenticated {
            return Err(Error::EncryptionAuthFailed);
        }
        self.permissions = permissions;
        if self.mode == EncryptionMode::Aes256 {
            self.perms = Some(
                seal_perms(&self.file_key, permissions, self.encrypt_metadata)
                    .map_err(Error::Crypto)?,
            );
        }
        Ok(())
    }

    /// The per-object key for `(n, g)`; revision 6 uses the file key
    /// directly.
    fn object_key(&self, id: ObjectId) -> Vec<u8> {
        if self.mode == EncryptionMode::Aes256 {
            return self.file_key.clone();
        }
        let mut input = self.file_key.clone();
        input.extend_from_slice(&id.number.to_le_bytes()[..3]);
        input.extend_from_slice(&id.generation.to_le_bytes()[..2]);
        if self.mode.uses_aes() {
            input.extend_from_slice(&AES_OBJECT_SALT);
        }
        let digest = md5_bytes(&input);
        let len = (self.file_key.len() + 5).min(16);
        digest[..len].to_vec()
    }

    pub fn decrypt_bytes(&self, id: ObjectId, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.object_key(id);
        if self.mode.uses_aes() {
            // Some producers leave empty strings unencrypted.
            if data.is_empty() {
                return Ok(Vec::new());
            }
            if data.len() < 16 {
                return Err(CryptoError::InvalidFormat(
                    "AES payload shorter than its IV".to_string(),
                ));
            }
            let (iv, ciphertext) = data.split_at(16);
            aes_cbc_decrypt(&key, iv, ciphertext)
        } else {
            Ok(rc4(&key, data))
        }
    }

    pub fn encrypt_bytes(&self, id: ObjectId, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let key = self.object_key(id);
        if self.mode.uses_aes() {
            let mut iv = [0u8; 16];
            rand::rngs::OsRng.fill_bytes(&mut iv);
            let mut out = iv.to_vec();
            out.extend_from_slice(&aes_cbc_encrypt(&key, &iv, data)?);
            Ok(out)
        } else {
            Ok(rc4(&key, data))
        }
    }

    /// Decrypt every string and stream payload reachable inside one
    /// indirect object. Metadata streams stay clear when the document says
    /// so; the caller never hands in the encryption dictionary itself.
    pub fn decrypt_value(&self, id: ObjectId, value: &mut PdfValue) -> CryptoResult<()> {
        self.apply_value(id, value, false)
    }

    /// Inverse of `decrypt_value`, used by the writer on cloned objects.
    pub fn encrypt_value(&self, id: ObjectId, value: &mut PdfValue) -> CryptoResult<()> {
        self.apply_value(id, value, true)
    }

    fn apply_value(&self, id: ObjectId, value: &mut PdfValue, encrypt: bool) -> CryptoResult<()> {
        match value {
            PdfValue::String(s) => {
                let out = if encrypt {
                    self.encrypt_bytes(id, s.as_bytes())?
                } else {
                    self.decrypt_bytes(id, s.as_bytes())?
                };
                s.set_bytes(out);
            }
            PdfValue::Array(arr) => {
                for elem in arr.iter_mut() {
                    self.apply_value(id, elem, encrypt)?;
                }
            }
            PdfValue::Dictionary(dict) => {
                for (_, v) in dict.iter_mut() {
                    self.apply_value(id, v, encrypt)?;
                }
            }
            PdfValue::Stream(stream) => {
                if self.skip_stream(&stream.dict) {
                    return Ok(());
                }
                let payload = match &stream.data {
                    crate::types::StreamData::Raw(b) => b.clone(),
                    crate::types::StreamData::Decoded(_) => {
                        // Encryption wraps wire bytes; decoded payloads are
                        // filtered first by the writer before this runs.
                        stream.data.bytes().to_vec()
                    }
                };
                let out = if encrypt {
                    self.encrypt_bytes(id, &payload)?
                } else {
                    self.decrypt_bytes(id, &payload)?
                };
                stream.data = crate::types::StreamData::Raw(out);
                for (_, v) in stream.dict.iter_mut() {
                    self.apply_value(id, v, encrypt)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn skip_stream(&self, dict: &PdfDictionary) -> bool {
        // XMP metadata is written in clear when EncryptMetadata is false.
        !self.encrypt_metadata
            && dict.is_type("Metadata")
            && dict
                .subtype_name()
                .map(|n| n == "XML")
                .unwrap_or(false)
    }
}

fn crypt_filter_method(dict: &PdfDictionary) -> Option<String> {
    let stmf = dict
        .get_name("StmF")
        .map(|n| n.without_slash().to_string())
        .unwrap_or_else(|| "Identity".to_string());
    let cf = dict.get_dict("CF")?;
    let filter = cf.get_dict(&stmf)?;
    filter
        .get_name("CFM")
        .map(|n| n.without_slash().to_string())
}

fn string_bytes(dict: &PdfDictionary, key: &str) -> Result<Vec<u8>> {
    dict.get_string(key)
        .map(|s| s.as_bytes().to_vec())
        .ok_or_else(|| Error::SchemaViolation {
            path: format!("Encrypt.{}", key),
            reason: "missing or not a string".to_string(),
        })
}

pub fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut padded = PASSWORD_PAD;
    let len = password.len().min(32);
    padded[..len].copy_from_slice(&password[..len]);
    padded
}

fn truncate_utf8(s: &str, max_bytes: usize) -> String {
    let mut end = s.len().min(max_bytes);
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

pub fn md5_bytes(data: &[u8]) -> [u8; 16] {
    md5::compute(data).0
}

/// RC4 stream cipher; encryption and decryption are the same operation.
pub fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s = [0u8; 256];
    for (i, item) in s.iter_mut().enumerate() {
        *item = i as u8;
    }

    let mut j = 0usize;
    for i in 0..256 {
        j = (j + s[i] as usize + key[i % key.len().max(1)] as usize) % 256;
        s.swap(i, j);
    }

    let mut result = Vec::with_capacity(data.len());
    let (mut i, mut j) = (0usize, 0usize);
    for &byte in data {
        i = (i + 1) % 256;
        j = (j + s[i] as usize) % 256;
        s.swap(i, j);
        let k = s[(s[i] as usize + s[j] as usize) % 256];
        result.push(byte ^ k);
    }
    result
}

/// Algorithm 2: file encryption key for revisions 2-4.
fn derive_file_key_r234(
    padded_user: &[u8; 32],
    o: &[u8],
    permissions: Permissions,
    id0: &[u8],
    r: i64,
    key_len: usize,
    encrypt_metadata: bool,
) -> Vec<u8> {
    let mut input = Vec::with_capacity(32 + o.len() + 4 + id0.len() + 4);
    input.extend_from_slice(padded_user);
    input.extend_from_slice(&o[..o.len().min(32)]);
    input.extend_from_slice(&(permissions.as_p() as i32).to_le_bytes());
    input.extend_from_slice(id0);
    if r >= 4 && !encrypt_metadata {
        input.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    let mut digest = md5_bytes(&input).to_vec();
    if r >= 3 {
        for _ in 0..50 {
            digest = md5_bytes(&digest[..key_len]).to_vec();
        }
    }
    digest.truncate(key_len);
    digest
}

/// The RC4 key used by the O-entry cascade (algorithm 3, steps a-d).
fn owner_rc4_key(owner_pw: &[u8], r: i64, key_len: usize) -> Vec<u8> {
    let mut digest = md5_bytes(&pad_password(owner_pw)).to_vec();
    if r >= 3 {
        for _ in 0..50 {
            digest = md5_bytes(&digest).to_vec();
        }
    }
    digest.truncate(if r == 2 { 5 } else { key_len });
    digest
}

/// Algorithm 3: the `/O` entry.
fn compute_o(owner_pw: &[u8], user_pw: &[u8], r: i64, key_len: usize) -> Vec<u8> {
    let key = owner_rc4_key(owner_pw, r, key_len);
    let mut data = pad_password(user_pw).to_vec();
    data = rc4(&key, &data);
    if r >= 3 {
        for i in 1..=19u8 {
            let step_key: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            data = rc4(&step_key, &data);
        }
    }
    data
}

/// Algorithms 4 and 5: the `/U` entry, 32 bytes.
fn compute_u(file_key: &[u8], id0: &[u8], r: i64) -> Vec<u8> {
    if r == 2 {
        return rc4(file_key, &PASSWORD_PAD);
    }
    let mut input = PASSWORD_PAD.to_vec();
    input.extend_from_slice(id0);
    let mut data = md5_bytes(&input).to_vec();
    data = rc4(file_key, &data);
    for i in 1..=19u8 {
        let step_key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
        data = rc4(&step_key, &data);
    }
    data.resize(32, 0);
    data
}

/// The revision 6 hardened hash (algorithm 2.B).
fn hash_r6(password: &[u8], salt: &[u8], udata: &[u8]) -> [u8; 32] {
    let mut k: Vec<u8> = {
        let mut h = Sha256::new();
        h.update(password);
        h.update(salt);
        h.update(udata);
        h.finalize().to_vec()
    };

    let mut round = 0usize;
    loop {
        let mut block = Vec::with_capacity((password.len() + k.len() + udata.len()) * 64);
        for _ in 0..64 {
            block.extend_from_slice(password);
            block.extend_from_slice(&k);
            block.extend_from_slice(udata);
        }

        let e = aes128_cbc_nopad_encrypt_infallible(&k[..16], &k[16..32], &block);
        let modulo = e[..16].iter().map(|&b| b as u32).sum::<u32>() % 3;
        k = match modulo {
            0 => Sha256::digest(&e).to_vec(),
            1 => Sha384::digest(&e).to_vec(),
            _ => Sha512::digest(&e).to_vec(),
        };

        round += 1;
        if round >= 64 && (*e.last().unwrap_or(&0) as usize) <= round - 32 {
            break;
        }
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&k[..32]);
    out
}

/// Build the encrypted `/Perms` blob for revision 6.
fn seal_perms(
    file_key: &[u8],
    permissions: Permissions,
    encrypt_metadata: bool,
) -> CryptoResult<Vec<u8>> {
    let mut block = [0u8; 16];
    block[..4].copy_from_slice(&(permissions.as_p() as i32).to_le_bytes());
    block[4..8].copy_from_slice(&[0xFF; 4]);
    block[8] = if encrypt_metadata { b'T' } else { b'F' };
    block[9..12].copy_from_slice(b"adb");
    rand::rngs::OsRng.fill_bytes(&mut block[12..16]);
    aes256_ecb_encrypt_block(file_key, &block)
}

fn aes_cbc_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    match key.len() {
        16 => Aes128CbcEnc::new_from_slices(key, iv)
            .map(|enc| enc.encrypt_padded_vec_mut::<Pkcs7>(data))
            .map_err(|e| CryptoError::InvalidKey(e.to_string())),
        32 => Aes256CbcEnc::new_from_slices(key, iv)
            .map(|enc| enc.encrypt_padded_vec_mut::<Pkcs7>(data))
            .map_err(|e| CryptoError::InvalidKey(e.to_string())),
        n => Err(CryptoError::InvalidKey(format!(
            "AES key must be 16 or 32 bytes, got {}",
            n
        ))),
    }
}

fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    match key.len() {
        16 => Aes128CbcDec::new_from_slices(key, iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|e| CryptoError::Cipher(e.to_string())),
        32 => Aes256CbcDec::new_from_slices(key, iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|e| CryptoError::Cipher(e.to_string())),
        n => Err(CryptoError::InvalidKey(format!(
            "AES key must be 16 or 32 bytes, got {}",
            n
        ))),
    }
}

fn aes128_cbc_nopad_encrypt_infallible(key: &[u8], iv: &[u8], data: &[u8]) -> Vec<u8> {
    // Callers guarantee key/iv lengths and block-aligned data.
    Aes128CbcEnc::new_from_slices(key, iv)
        .map(|enc| enc.encrypt_padded_vec_mut::<NoPadding>(data))
        .unwrap_or_default()
}

fn aes256_cbc_nopad_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    Aes256CbcEnc::new_from_slices(key, iv)
        .map(|enc| enc.encrypt_padded_vec_mut::<NoPadding>(data))
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

fn aes256_cbc_nopad_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> CryptoResult<Vec<u8>> {
    Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
        .decrypt_padded_vec_mut::<NoPadding>(data)
        .map_err(|e| CryptoError::Cipher(e.to_string()))
}

fn aes256_ecb_encrypt_block(key: &[u8], block: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = aes::Aes256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let mut b = aes::Block::clone_from_slice(&block[..16]);
    cipher.encrypt_block(&mut b);
    Ok(b.to_vec())
}

fn aes256_ecb_decrypt_block(key: &[u8], block: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = aes::Aes256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let mut b = aes::Block::clone_from_slice(&block[..16]);
    cipher.decrypt_block(&mut b);
    Ok(b.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{PERM_COPY, PERM_PRINT};

    #[test]
    fn rc4_known_vector() {
        // Wikipedia test vector: key "Key", plaintext "Plaintext".
        let ct = rc4(b"Key", b"Plaintext");
        assert_eq!(
            ct,
            vec![0xBB, 0xF3, 0x16, 0xE8, 0xD9, 0x40, 0xAF, 0x0A, 0xD3]
        );
        assert_eq!(rc4(b"Key", &ct), b"Plaintext");
    }

    #[test]
    fn password_padding_truncates_at_32() {
        let padded = pad_password(b"user");
        assert_eq!(&padded[..4], b"user");
        assert_eq!(&padded[4..], &PASSWORD_PAD[..28]);

        let long = vec![b'x'; 40];
        assert_eq!(pad_password(&long), [b'x'; 32]);
    }

    fn roundtrip_mode(mode: EncryptionMode) {
        let id0 = b"sixteen-byte-id!".to_vec();
        let mut perms = Permissions::none();
        perms.grant(PERM_PRINT);
        perms.grant(PERM_COPY);

        let writing =
            Encryption::new_for_writing(mode, perms, "u", "o", &id0, true).unwrap();
        let dict = writing.to_dict();

        // Authenticate as the user.
        let user = Encryption::from_encrypt_dict(&dict, &id0, "u", "").unwrap();
        assert_eq!(user.mode, mode);
        assert_eq!(user.file_key, writing.file_key);
        assert!(!user.owner_authenticated);
        assert!(user.permissions.allows(PERM_PRINT));
        assert!(user.permissions.allows(PERM_COPY));

        // Authenticate as the owner.
        let owner = Encryption::from_encrypt_dict(&dict, &id0, "", "o").unwrap();
        assert_eq!(owner.file_key, writing.file_key);
        assert!(owner.owner_authenticated);

        // Wrong password fails.
        let err = Encryption::from_encrypt_dict(&dict, &id0, "bad", "worse").unwrap_err();
        assert!(matches!(err, Error::EncryptionAuthFailed));

        // Payload roundtrip with per-object keys.
        let id = ObjectId::new(12, 0);
        let plaintext = b"stream payload bytes".to_vec();
        let ct = writing.encrypt_bytes(id, &plaintext).unwrap();
        assert_ne!(ct, plaintext);
        assert_eq!(user.decrypt_bytes(id, &ct).unwrap(), plaintext);
    }

    #[test]
    fn rc4_40_roundtrip() {
        roundtrip_mode(EncryptionMode::Rc4_40);
    }

    #[test]
    fn rc4_128_roundtrip() {
        roundtrip_mode(EncryptionMode::Rc4_128);
    }

    #[test]
    fn aes_128_roundtrip() {
        roundtrip_mode(EncryptionMode::Aes128);
    }

    #[test]
    fn aes_256_roundtrip() {
        roundtrip_mode(EncryptionMode::Aes256);
    }

    #[test]
    fn r6_perms_blob_is_verified() {
        let id0 = b"id".to_vec();
        let perms = Permissions::all();
        let enc =
            Encryption::new_for_writing(EncryptionMode::Aes256, perms, "u", "o", &id0, true)
                .unwrap();
        let mut dict = enc.to_dict();
        // Corrupt the Perms blob: authentication must fail.
        dict.insert(
            "Perms",
            PdfValue::String(PdfString::new_hex(vec![0u8; 16])),
        );
        let err = Encryption::from_encrypt_dict(&dict, &id0, "u", "").unwrap_err();
        assert!(matches!(err, Error::EncryptionAuthFailed));
    }

    #[test]
    fn owner_password_unlocks_permission_change() {
        let id0 = b"sixteen-byte-id!".to_vec();
        let enc = Encryption::new_for_writing(
            EncryptionMode::Aes128,
            Permissions::none(),
            "u",
            "o",
            &id0,
            true,
        )
        .unwrap();
        let dict = enc.to_dict();

        let mut user = Encryption::from_encrypt_dict(&dict, &id0, "u", "").unwrap();
        assert!(user.set_permissions(Permissions::all()).is_err());

        let mut owner = Encryption::from_encrypt_dict(&dict, &id0, "", "o").unwrap();
        assert!(owner.set_permissions(Permissions::all()).is_ok());
    }
}
