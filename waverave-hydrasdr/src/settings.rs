//! Device settings reachable by key, and their descriptions.

/// The value type a setting takes.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgType {
    Bool,
}

/// Description of one setting, as offered to generic configuration front
/// ends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgInfo {
    /// Key used with [`write_setting`][crate::HydraSdr::write_setting].
    pub key: &'static str,
    /// Default value, as a string.
    pub value: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Value type.
    pub ty: ArgType,
}

/// A recognized setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Setting {
    /// DC power on the antenna connector.
    BiasTee,
    /// 12-bit sample packing on the USB link.
    BitPack,
}

impl Setting {
    /// Every setting, in the order they're described and applied at open.
    pub const ALL: [Setting; 2] = [Setting::BiasTee, Setting::BitPack];

    /// The setting key.
    pub fn key(self) -> &'static str {
        match self {
            Self::BiasTee => "biastee",
            Self::BitPack => "bitpack",
        }
    }

    /// Look up a setting by key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    /// Full description of this setting.
    pub fn info(self) -> ArgInfo {
        match self {
            Self::BiasTee => ArgInfo {
                key: self.key(),
                value: "false",
                name: "Bias tee",
                description: "Enable the 4.5v DC Bias tee to power a LNA via antenna connection.",
                ty: ArgType::Bool,
            },
            Self::BitPack => ArgInfo {
                key: self.key(),
                value: "false",
                name: "Bit Pack",
                description: "Enable packing 4 12-bit samples into 3 16-bit words for 25% less USB traffic.",
                ty: ArgType::Bool,
            },
        }
    }
}

/// Only the exact string `"true"` turns a boolean setting on.
pub(crate) fn parse_bool(value: &str) -> bool {
    value == "true"
}

pub(crate) fn format_bool(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_round_trip() {
        for s in Setting::ALL {
            assert_eq!(Setting::from_key(s.key()), Some(s));
            assert_eq!(s.info().key, s.key());
            assert_eq!(s.info().value, "false");
        }
        assert_eq!(Setting::from_key("unknown"), None);
    }

    #[test]
    fn bool_values() {
        assert!(parse_bool("true"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("1"));
        assert!(!parse_bool(""));
    }
}
