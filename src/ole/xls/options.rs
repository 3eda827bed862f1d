//! Options controlling how a workbook is opened

use serde::{Deserialize, Serialize};

/// Settings for [`open`](super::open)
///
/// # Examples
///
/// ```
/// use litchi_xls::ole::xls::OpenOptions;
///
/// let options = OpenOptions::new()
///     .password("secret")
///     .close_on_fail(false)
///     .fallback_codepage(1251);
/// assert_eq!(options.password.as_deref(), Some("secret"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenOptions {
    /// Tried after the built-in default password on encrypted workbooks
    pub password: Option<String>,
    /// Drop the reader when opening fails instead of handing it back
    pub close_on_fail: bool,
    /// Codepage for pre-BIFF8 byte strings when no CODEPAGE record exists
    pub fallback_codepage: u16,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            password: None,
            close_on_fail: true,
            fallback_codepage: 1252,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn close_on_fail(mut self, close: bool) -> Self {
        self.close_on_fail = close;
        self
    }

    pub fn fallback_codepage(mut self, codepage: u16) -> Self {
        self.fallback_codepage = codepage;
        self
    }
}
