use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use atsrt_errors::{MapDiagnostic, Result, SimpleDiagnostic};
use error_snippet::{Label, NamedSource, WithSource};
use serde::Deserialize;

/// Name of the config file, which is looked up in the current working
/// directory when no path is given.
pub const CONFIG_FILE_NAME: &str = "memcheck.toml";

/// Upper bound for [`MemcheckConfig::threads`].
pub const MAX_THREADS: usize = 256;

/// Options for configuring which requests the probes send to the allocator.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MemcheckConfig {
    /// Block sizes used by the allocation and reallocation probes.
    pub sizes: Vec<ByteSize>,

    /// Upper bound for any single request. Sizes above it are skipped.
    pub max_size: ByteSize,

    /// Pairs of `[count, elem_size]` used by the zeroed allocation probe.
    pub zeroed: Vec<(usize, usize)>,

    /// How many times each probe repeats its requests.
    pub rounds: usize,

    /// Amount of worker threads spawned by the concurrent probe.
    pub threads: usize,

    /// Byte written into allocated blocks before reading them back.
    pub fill: u8,
}

impl Default for MemcheckConfig {
    fn default() -> Self {
        Self {
            sizes: [0, 1, 8, 24, 64, 256, 4096, 64 * 1024, 1024 * 1024]
                .into_iter()
                .map(ByteSize)
                .collect(),
            max_size: ByteSize(64 * 1024 * 1024),
            zeroed: vec![(1, 1), (16, 8), (128, 32), (1024, 1024)],
            rounds: 4,
            threads: 4,
            fill: 0xA5,
        }
    }
}

impl MemcheckConfig {
    /// Ensures the config can drive a meaningful run.
    ///
    /// # Errors
    ///
    /// Returns `Err` if `rounds` or `threads` is zero, if `threads` exceeds
    /// [`MAX_THREADS`], or if no probe size fits below `max_size`.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(SimpleDiagnostic::new("`rounds` must be at least 1").into());
        }

        if self.threads == 0 {
            return Err(SimpleDiagnostic::new("`threads` must be at least 1").into());
        }

        if self.threads > MAX_THREADS {
            return Err(SimpleDiagnostic::new(format!("`threads` must be at most {MAX_THREADS}"))
                .with_help(format!("`threads` is currently set to {}", self.threads))
                .into());
        }

        if self.probe_sizes().is_empty() {
            return Err(SimpleDiagnostic::new("no probe size fits within `max_size`")
                .with_help(format!("`max_size` is currently set to {}", self.max_size))
                .into());
        }

        Ok(())
    }

    /// Gets the sorted, deduplicated list of sizes at or below
    /// [`MemcheckConfig::max_size`].
    pub fn probe_sizes(&self) -> Vec<usize> {
        let mut sizes = self
            .sizes
            .iter()
            .map(|size| size.0)
            .filter(|size| *size <= self.max_size.0)
            .collect::<Vec<_>>();

        sizes.sort_unstable();
        sizes.dedup();
        sizes
    }

    /// Gets the `[count, elem_size]` pairs whose product fits at or below
    /// [`MemcheckConfig::max_size`].
    pub fn zeroed_pairs(&self) -> Vec<(usize, usize)> {
        self.zeroed
            .iter()
            .copied()
            .filter(|(count, elem_size)| count.checked_mul(*elem_size).is_some_and(|len| len <= self.max_size.0))
            .collect()
    }
}

/// A size in bytes, which can be written as a plain integer or as a string
/// with a unit suffix.
///
/// ```toml
/// max_size = 2048
/// max_size = "1024KB"
/// max_size = "1gb"
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteSize(pub usize);

impl Display for ByteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl FromStr for ByteSize {
    type Err = Box<dyn std::error::Error + Send + Sync>;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        size_from_string(s).map(ByteSize)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ByteSizeVisitor;

        impl serde::de::Visitor<'_> for ByteSizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("integer or string with a size unit")
            }

            fn visit_u64<E>(self, value: u64) -> std::result::Result<ByteSize, E>
            where
                E: serde::de::Error,
            {
                usize::try_from(value).map(ByteSize).map_err(E::custom)
            }

            fn visit_i64<E>(self, value: i64) -> std::result::Result<ByteSize, E>
            where
                E: serde::de::Error,
            {
                usize::try_from(value).map(ByteSize).map_err(E::custom)
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<ByteSize, E>
            where
                E: serde::de::Error,
            {
                ByteSize::from_str(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(ByteSizeVisitor)
    }
}

/// Attempts to convert the given string into a size.
///
/// The string can either be a unitless number (e.x. `8`, `1024`) or a number
/// with a byte-size unit (e.x. `4G`, `128MB`, etc.).
///
/// The unit is parsed case-insensitively and must be one of: `G`, `GB`, `M`,
/// `MB`, `K`, `KB`, `B`.
fn size_from_string(s: &str) -> std::result::Result<usize, Box<dyn std::error::Error + Send + Sync>> {
    let s = s.trim();

    if s.chars().last().is_some_and(|c| c.is_ascii_digit()) {
        return Ok(s.parse::<usize>()?);
    }

    let Some(unit_start) = s.find(|c: char| c.is_ascii_alphabetic()) else {
        return Err(Box::new(std::io::Error::other("invalid size: no unit found")));
    };

    let (value, unit) = s.split_at(unit_start);
    if value.is_empty() {
        return Err(Box::new(std::io::Error::other("invalid size: no number found")));
    }

    let size = value.trim_end().parse::<usize>()?;
    let multiplier: usize = match unit.to_ascii_lowercase().as_str() {
        "g" | "gb" => 1024 * 1024 * 1024,
        "m" | "mb" => 1024 * 1024,
        "k" | "kb" => 1024,
        "b" => 1,
        unit => return Err(Box::new(std::io::Error::other(format!("invalid unit {unit:?}")))),
    };

    size.checked_mul(multiplier)
        .ok_or_else(|| format!("size {s:?} does not fit in memory").into())
}

/// Reads the config file at the given path, or `memcheck.toml` in the current
/// working directory. Falls back to [`MemcheckConfig::default`] if neither is
/// present.
///
/// # Errors
///
/// Returns `Err` if the file cannot be read, cannot be parsed or holds
/// invalid options.
pub fn read_config_file(config_path: Option<PathBuf>) -> Result<MemcheckConfig> {
    let Some(config_path) = config_path.or_else(find_config_file) else {
        tracing::debug!("no config file found, using defaults");
        return Ok(MemcheckConfig::default());
    };

    let content = std::fs::read_to_string(&config_path)
        .map_cause(format!("could not read config file {}", config_path.display()))?;

    let config = parse_config(&content, &config_path)?;
    config.validate()?;

    tracing::info!(path = %config_path.display(), "loaded config");

    Ok(config)
}

/// Parses the given TOML content into a [`MemcheckConfig`].
///
/// # Errors
///
/// Returns `Err` if the content is not valid TOML or has unknown fields. The
/// diagnostic is labeled with the offending span of `content`.
pub fn parse_config(content: &str, path: &Path) -> Result<MemcheckConfig> {
    toml::from_str::<MemcheckConfig>(content).map_err(|err| {
        let source_label = Label::error(None, err.span().unwrap_or_default(), err.message());

        SimpleDiagnostic::new(format!("failed to parse config {}", path.display()))
            .with_label(source_label)
            .with_source(Arc::new(NamedSource::new(path.display().to_string(), content)))
            .into()
    })
}

fn find_config_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let candidate = cwd.join(CONFIG_FILE_NAME);

    candidate.exists().then_some(candidate)
}

#[cfg(test)]
mod tests {
    use atsrt_errors::Diagnostic;

    use super::*;

    fn parse(content: &str) -> Result<MemcheckConfig> {
        parse_config(content, Path::new("memcheck.toml"))
    }

    #[test]
    fn size_from_plain_number() {
        assert_eq!(size_from_string("8").unwrap(), 8);
        assert_eq!(size_from_string("1024").unwrap(), 1024);
    }

    #[test]
    fn size_from_units() {
        assert_eq!(size_from_string("12B").unwrap(), 12);
        assert_eq!(size_from_string("4k").unwrap(), 4 * 1024);
        assert_eq!(size_from_string("4KB").unwrap(), 4 * 1024);
        assert_eq!(size_from_string("128Mb").unwrap(), 128 * 1024 * 1024);
        assert_eq!(size_from_string("1g").unwrap(), 1024 * 1024 * 1024);
        assert_eq!(size_from_string("2 MB").unwrap(), 2 * 1024 * 1024);
    }

    #[test]
    fn size_rejects_bad_input() {
        assert!(size_from_string("MB").is_err());
        assert!(size_from_string("12TB").is_err());
        assert!(size_from_string("twelve").is_err());
        assert!(size_from_string(&format!("{}G", usize::MAX)).is_err());
    }

    #[test]
    fn empty_file_uses_defaults() {
        assert_eq!(parse("").unwrap(), MemcheckConfig::default());
    }

    #[test]
    fn parses_every_field() {
        let config = parse(
            r#"
            sizes = [16, "1KB", "2kb"]
            max_size = "1MB"
            zeroed = [[4, 4], [32, 2]]
            rounds = 2
            threads = 8
            fill = 0x5A
            "#,
        )
        .unwrap();

        assert_eq!(config.sizes, vec![ByteSize(16), ByteSize(1024), ByteSize(2048)]);
        assert_eq!(config.max_size, ByteSize(1024 * 1024));
        assert_eq!(config.zeroed, vec![(4, 4), (32, 2)]);
        assert_eq!(config.rounds, 2);
        assert_eq!(config.threads, 8);
        assert_eq!(config.fill, 0x5A);
    }

    #[test]
    fn parse_errors_point_into_the_file() {
        let content = "rounds = 2\nthreads = \"four\"\n";
        let err = parse(content).unwrap_err();

        let labels = err.labels().map(Iterator::collect::<Vec<_>>).unwrap_or_default();
        assert!(!labels.is_empty(), "no labels on {err:?}");
        assert!(labels[0].range().0.start >= "rounds = 2\n".len());
        assert!(labels[0].range().0.end <= content.len());

        let source = err.source_code().expect("parse error has no source attached");
        assert_eq!(source.name(), Some("memcheck.toml"));
        assert_eq!(*source.content(), content);
    }

    #[test]
    fn sample_config_matches_defaults() {
        let config = parse(include_str!("../memcheck.toml")).unwrap();

        assert_eq!(config, MemcheckConfig::default());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(parse("heap_size = 12").is_err());
    }

    #[test]
    fn rejects_negative_sizes() {
        assert!(parse("max_size = -1").is_err());
    }

    #[test]
    fn probe_sizes_are_bounded_and_sorted() {
        let config = MemcheckConfig {
            sizes: [4096, 8, 8, 1 << 30, 0].into_iter().map(ByteSize).collect(),
            max_size: ByteSize(1 << 20),
            ..MemcheckConfig::default()
        };

        assert_eq!(config.probe_sizes(), vec![0, 8, 4096]);
    }

    #[test]
    fn zeroed_pairs_drop_overflowing_products() {
        let config = MemcheckConfig {
            zeroed: vec![(2, 2), (usize::MAX, 2), (1 << 20, 1 << 20)],
            max_size: ByteSize(1 << 20),
            ..MemcheckConfig::default()
        };

        assert_eq!(config.zeroed_pairs(), vec![(2, 2)]);
    }

    #[test]
    fn validate_rejects_zero_rounds_and_threads() {
        let config = MemcheckConfig {
            rounds: 0,
            ..MemcheckConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MemcheckConfig {
            threads: 0,
            ..MemcheckConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MemcheckConfig {
            threads: MAX_THREADS + 1,
            ..MemcheckConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MemcheckConfig {
            threads: MAX_THREADS,
            ..MemcheckConfig::default()
        };
        assert!(config.validate().is_ok());

        assert!(MemcheckConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_size_set() {
        let config = MemcheckConfig {
            sizes: vec![ByteSize(4096)],
            max_size: ByteSize(16),
            ..MemcheckConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_is_reported() {
        let path = PathBuf::from("/nonexistent/atsrt/memcheck.toml");

        assert!(read_config_file(Some(path)).is_err());
    }
}
