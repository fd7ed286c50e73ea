//! Minimal reader for the Prometheus text exposition format
//!
//! Only what the memory watcher needs: `# TYPE` lines, sample names, labels
//! and values. Timestamps are ignored.

use beaconstats_core::SourceError;
use std::collections::HashMap;

/// Metric type declared by a `# TYPE` line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Untyped,
    Histogram,
    Summary,
}

impl MetricKind {
    fn parse(raw: &str) -> Self {
        match raw {
            "counter" => MetricKind::Counter,
            "gauge" => MetricKind::Gauge,
            "histogram" => MetricKind::Histogram,
            "summary" => MetricKind::Summary,
            _ => MetricKind::Untyped,
        }
    }

    /// Whether a sample of this family carries a plain scalar value
    fn is_scalar(self) -> bool {
        matches!(
            self,
            MetricKind::Counter | MetricKind::Gauge | MetricKind::Untyped
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Sample {
    fn has_labels(&self, wanted: &[(&str, &str)]) -> bool {
        wanted.iter().all(|(name, value)| {
            self.labels
                .iter()
                .any(|(n, v)| n == name && v == value)
        })
    }
}

#[derive(Debug, Clone)]
struct Family {
    kind: MetricKind,
    samples: Vec<Sample>,
}

/// Parsed scrape, keyed by family name
#[derive(Debug, Clone, Default)]
pub struct MetricFamilies {
    families: HashMap<String, Family>,
}

impl MetricFamilies {
    pub fn parse(text: &str) -> Result<Self, SourceError> {
        let mut families: HashMap<String, Family> = HashMap::new();
        let mut current: Option<String> = None;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                let mut parts = comment.split_whitespace();
                if parts.next() == Some("TYPE") {
                    if let (Some(name), Some(kind)) = (parts.next(), parts.next()) {
                        families
                            .entry(name.to_string())
                            .or_insert_with(|| Family {
                                kind: MetricKind::Untyped,
                                samples: Vec::new(),
                            })
                            .kind = MetricKind::parse(kind);
                        current = Some(name.to_string());
                    }
                }
                continue;
            }

            let sample = parse_sample(line).map_err(|reason| {
                SourceError::Parse(format!("metrics line {}: {}", index + 1, reason))
            })?;

            // Histogram and summary series (`_bucket`, `_sum`, ...) belong to
            // the family declared just before them.
            let family_name = match &current {
                Some(name) if sample.name.starts_with(name.as_str()) => name.clone(),
                _ => sample.name.clone(),
            };

            families
                .entry(family_name)
                .or_insert_with(|| Family {
                    kind: MetricKind::Untyped,
                    samples: Vec::new(),
                })
                .samples
                .push(sample);
        }

        Ok(Self { families })
    }

    /// Value of the first scalar sample in `family` carrying all `labels`
    pub fn first(&self, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
        let found = self.families.get(family)?;
        if !found.kind.is_scalar() {
            return None;
        }

        found
            .samples
            .iter()
            .filter(|s| s.name == family)
            .find(|s| s.has_labels(labels))
            .map(|s| s.value)
    }

    /// [`MetricFamilies::first`] without label filter, truncated to an integer
    pub fn first_i64(&self, family: &str) -> Option<i64> {
        self.first(family, &[]).map(|v| v as i64)
    }

    pub fn kind(&self, family: &str) -> Option<MetricKind> {
        self.families.get(family).map(|f| f.kind)
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

fn parse_sample(line: &str) -> Result<Sample, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or("missing value")?;
    let name = &line[..name_end];
    if name.is_empty() {
        return Err("missing metric name".to_string());
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if let Some(after) = rest.strip_prefix('{') {
        let (parsed, remainder) = parse_labels(after)?;
        labels = parsed;
        rest = remainder;
    }

    let raw = rest.split_whitespace().next().ok_or("missing value")?;
    let value = raw
        .parse::<f64>()
        .map_err(|e| format!("invalid value `{}`: {}", raw, e))?;

    Ok(Sample {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parse `name="value",...}` and return the labels plus the text after `}`
fn parse_labels(input: &str) -> Result<(Vec<(String, String)>, &str), String> {
    let mut labels = Vec::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or("label without value")?;
        let name = rest[..eq].trim().to_string();
        rest = rest[eq + 1..]
            .trim_start()
            .strip_prefix('"')
            .ok_or("unquoted label value")?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let end = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err("unterminated escape".to_string()),
                },
                Some((_, c)) => value.push(c),
                None => return Err("unterminated label value".to_string()),
            }
        };

        labels.push((name, value));
        rest = rest[end + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
        }
    }
}
