use crate::crypto::Permissions;

/// Strictness profile applied by the validator and, in relaxed form, by the
/// xref loader's repair path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Skip validation entirely.
    None,
    /// Accept common producer quirks; demote non-critical failures to
    /// warnings and enable xref repair by file scan.
    #[default]
    Relaxed,
    /// Enforce ISO 32000-1 to the letter.
    Strict,
}

impl ValidationMode {
    pub fn is_strict(self) -> bool {
        matches!(self, ValidationMode::Strict)
    }

    pub fn is_relaxed(self) -> bool {
        matches!(self, ValidationMode::Relaxed)
    }
}

/// Line terminator used for structural lines emitted by the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eol {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl Eol {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Eol::Lf => b"\n",
            Eol::Cr => b"\r",
            Eol::CrLf => b"\r\n",
        }
    }
}

/// Flat option record carried by every command into the core. There is no
/// global configuration; callers clone and adjust.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub validation_mode: ValidationMode,
    pub eol: Eol,

    /// Preserve compressed (object-stream) entries read from the input.
    /// The writer itself never packs objects into object streams.
    pub write_object_stream: bool,
    /// Emit a cross-reference stream instead of a classic table when the
    /// effective PDF version is 1.5 or later.
    pub write_xref_stream: bool,

    pub encrypt_using_aes: bool,
    /// 40, 128 or 256.
    pub encrypt_key_length: u16,
    /// Whether XMP metadata streams are encrypted along with everything
    /// else.
    pub encrypt_metadata: bool,
    pub permissions: Permissions,

    pub user_pw: String,
    pub owner_pw: String,
    pub user_pw_new: Option<String>,
    pub owner_pw_new: Option<String>,

    pub stats_file_name: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            validation_mode: ValidationMode::Relaxed,
            eol: Eol::Lf,
            write_object_stream: true,
            write_xref_stream: false,
            encrypt_using_aes: true,
            encrypt_key_length: 256,
            encrypt_metadata: true,
            permissions: Permissions::default(),
            user_pw: String::new(),
            owner_pw: String::new(),
            user_pw_new: None,
            owner_pw_new: None,
            stats_file_name: None,
        }
    }
}

impl Configuration {
    pub fn with_mode(mode: ValidationMode) -> Self {
        Configuration {
            validation_mode: mode,
            ..Default::default()
        }
    }

    pub fn validate_key_length(&self) -> crate::error::Result<()> {
        match self.encrypt_key_length {
            40 | 128 | 256 => Ok(()),
            n => Err(crate::error::Error::KeyLengthMismatch(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_is_relaxed() {
        let conf = Configuration::default();
        assert_eq!(conf.validation_mode, ValidationMode::Relaxed);
        assert_eq!(conf.eol, Eol::Lf);
        assert_eq!(conf.encrypt_key_length, 256);
        assert!(conf.validate_key_length().is_ok());
    }

    #[test]
    fn rejects_bad_key_length() {
        let conf = Configuration {
            encrypt_key_length: 64,
            ..Default::default()
        };
        assert!(conf.validate_key_length().is_err());
    }
}
