/// Engine configuration, passed explicitly to every stage
use crate::error::ConfigError;

pub const DEFAULT_MIN_CONTIG_LENGTH: u64 = 1000;
pub const DEFAULT_MIN_BREADTH: f64 = 50.0;
pub const DEFAULT_MIN_MEDIAN_COVERAGE: f64 = 20.0;
pub const DEFAULT_MIN_MAPPING_QUALITY: u8 = 20;
pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_SORT_BUFFER_RECORDS: usize = 500_000;

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Contigs shorter than this are ignored entirely
    pub min_contig_length: u64,
    /// Minimum breadth, as a percentage of qualifying length
    pub min_breadth: f64,
    /// Minimum median depth; also the coverage every accepted sample is normalised to
    pub min_median_coverage: f64,
    pub min_mapping_quality: u8,
    /// Shared by every sample so reruns reproduce the same reads
    pub seed: u64,
    /// Upper bound on concurrently processed samples
    pub threads: usize,
    /// Retained records held per sample before a sorted run is spilled to disk
    pub sort_buffer_records: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            min_contig_length: DEFAULT_MIN_CONTIG_LENGTH,
            min_breadth: DEFAULT_MIN_BREADTH,
            min_median_coverage: DEFAULT_MIN_MEDIAN_COVERAGE,
            min_mapping_quality: DEFAULT_MIN_MAPPING_QUALITY,
            seed: DEFAULT_SEED,
            threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            sort_buffer_records: DEFAULT_SORT_BUFFER_RECORDS,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.min_breadth) {
            return Err(ConfigError::Breadth(self.min_breadth));
        }
        if !self.min_median_coverage.is_finite() || self.min_median_coverage <= 0.0 {
            return Err(ConfigError::MedianCoverage(self.min_median_coverage));
        }
        if self.threads == 0 {
            return Err(ConfigError::Threads);
        }
        if self.sort_buffer_records == 0 {
            return Err(ConfigError::SortBuffer);
        }
        Ok(())
    }
}

/// Parse a number that may have metric suffix (k/K=1000, m/M=1e6, g/G=1e9)
pub fn parse_metric_number(s: &str) -> Result<u64, String> {
    if s.is_empty() {
        return Err("Empty string".to_string());
    }

    let (num_part, suffix) = match s.chars().last() {
        Some(c) if c.is_ascii_alphabetic() => (&s[..s.len() - c.len_utf8()], Some(c)),
        _ => (s, None),
    };

    let base: f64 = num_part
        .parse()
        .map_err(|e| format!("Invalid number: {e}"))?;

    let multiplier = match suffix {
        Some('k') | Some('K') => 1000.0,
        Some('m') | Some('M') => 1_000_000.0,
        Some('g') | Some('G') => 1_000_000_000.0,
        Some(c) => {
            return Err(format!(
                "Unknown suffix '{c}'. Use k/K (1000), m/M (1e6), or g/G (1e9)"
            ))
        }
        None => 1.0,
    };

    let result = base * multiplier;

    if !(0.0..=u64::MAX as f64).contains(&result) {
        return Err(format!("Value {result} out of range"));
    }

    Ok(result as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.min_contig_length, 1000);
        assert_eq!(config.min_mapping_quality, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = EngineConfig {
            min_breadth: 120.0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Breadth(120.0)));

        config.min_breadth = f64::NAN;
        assert!(config.validate().is_err());

        config.min_breadth = 10.0;
        config.min_median_coverage = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::MedianCoverage(0.0)));

        config.min_median_coverage = 5.0;
        config.threads = 0;
        assert_eq!(config.validate(), Err(ConfigError::Threads));

        config.threads = 1;
        config.sort_buffer_records = 0;
        assert_eq!(config.validate(), Err(ConfigError::SortBuffer));
    }

    #[test]
    fn test_parse_metric_number() {
        assert_eq!(parse_metric_number("1000"), Ok(1000));
        assert_eq!(parse_metric_number("5k"), Ok(5000));
        assert_eq!(parse_metric_number("1.5M"), Ok(1_500_000));
        assert_eq!(parse_metric_number("2g"), Ok(2_000_000_000));
        assert!(parse_metric_number("3x").is_err());
        assert!(parse_metric_number("-1").is_err());
        assert!(parse_metric_number("").is_err());
    }
}
