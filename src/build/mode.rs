//! Output mode (`-ptx`, `-cubin`, `-fatbin`) selection from compiler options.

use crate::error::ConfigError;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static MODE_FLAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^--?(ptx|cubin|fatbin)$").expect("static regex"));

/// The kind of artifact nvcc is asked to produce. Exactly one per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    Ptx,
    Cubin,
    Fatbin,
}

impl OutputMode {
    pub fn extension(self) -> &'static str {
        match self {
            OutputMode::Ptx => "ptx",
            OutputMode::Cubin => "cubin",
            OutputMode::Fatbin => "fatbin",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "ptx" => Some(OutputMode::Ptx),
            "cubin" => Some(OutputMode::Cubin),
            "fatbin" => Some(OutputMode::Fatbin),
            _ => None,
        }
    }

    /// Picks the output mode out of the compiler option tokens.
    ///
    /// A token counts only when it is the whole token (`-ptx`, or nvcc's
    /// long form `--ptx`); `-ptxas-options` or `-Xptx` do not. Zero matches
    /// and more than one match (even the same flag twice) are both errors.
    pub fn resolve<S: AsRef<str>>(options: &[S]) -> Result<Self, ConfigError> {
        let mut found: Vec<(String, OutputMode)> = Vec::new();
        for token in options {
            let token = token.as_ref();
            if let Some(caps) = MODE_FLAG.captures(token)
                && let Some(mode) = Self::from_name(&caps[1])
            {
                found.push((token.to_string(), mode));
            }
        }

        match found.len() {
            0 => Err(ConfigError::MissingOutputMode),
            1 => Ok(found[0].1),
            _ => Err(ConfigError::ConflictingOutputModes(
                found.into_iter().map(|(t, _)| t).collect(),
            )),
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::split_options;

    fn resolve(s: &str) -> Result<OutputMode, ConfigError> {
        OutputMode::resolve(&split_options(s))
    }

    #[test]
    fn test_single_flag_selects_mode() {
        assert_eq!(resolve("-ptx").unwrap(), OutputMode::Ptx);
        assert_eq!(resolve("-O3 -cubin -arch=sm_80").unwrap(), OutputMode::Cubin);
        assert_eq!(resolve("-arch=sm_90 -fatbin").unwrap(), OutputMode::Fatbin);
        assert_eq!(resolve("--ptx").unwrap(), OutputMode::Ptx);
    }

    #[test]
    fn test_extensions() {
        assert_eq!(OutputMode::Ptx.extension(), "ptx");
        assert_eq!(OutputMode::Cubin.extension(), "cubin");
        assert_eq!(OutputMode::Fatbin.extension(), "fatbin");
    }

    #[test]
    fn test_no_flag_is_rejected() {
        assert!(matches!(resolve(""), Err(ConfigError::MissingOutputMode)));
        assert!(matches!(resolve("-O3 -arch=sm_80"), Err(ConfigError::MissingOutputMode)));
    }

    #[test]
    fn test_embedded_names_do_not_count() {
        assert!(matches!(resolve("-ptxas-options=-v"), Err(ConfigError::MissingOutputMode)));
        assert!(matches!(resolve("-Xptx"), Err(ConfigError::MissingOutputMode)));
        assert!(matches!(resolve("ptx"), Err(ConfigError::MissingOutputMode)));
        assert!(matches!(resolve("---ptx"), Err(ConfigError::MissingOutputMode)));
        assert!(matches!(resolve("-PTX"), Err(ConfigError::MissingOutputMode)));
    }

    #[test]
    fn test_multiple_flags_are_rejected() {
        match resolve("-ptx -cubin") {
            Err(ConfigError::ConflictingOutputModes(tokens)) => {
                assert_eq!(tokens, vec!["-ptx", "-cubin"]);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        assert!(matches!(
            resolve("-fatbin -O2 -fatbin"),
            Err(ConfigError::ConflictingOutputModes(_))
        ));
        assert!(matches!(
            resolve("-ptx -cubin -fatbin"),
            Err(ConfigError::ConflictingOutputModes(_))
        ));
    }
}
