//! Prometheus text exposition rendering.
//!
//! [`format_metric`] renders one sample line and owns every sanitization rule:
//! metric names and label keys are forced into their character classes, label
//! values are truncated, escaped and stripped to printable ASCII, and values that
//! are not numbers become `0`. [`MetricBlock`] groups samples into families so
//! that the `# HELP` / `# TYPE` preamble is written once per name and all samples
//! of a name stay contiguous.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{self, Write as FmtWrite};
use tracing::warn;

use crate::error::ValidationError;

/// Label carrying the site name on every sample.
pub const SITE_LABEL: &str = "wordpress_site";

/// Maximum label value length in characters before truncation.
pub const MAX_LABEL_VALUE_CHARS: usize = 1000;

static INVALID_NAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_:]").expect("static regex"));
static INVALID_LABEL_KEY_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("static regex"));

/// Prometheus metric type written in the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sample value as handed over by a collector.
///
/// Host data sometimes arrives as text; `Raw` values are parsed at render time
/// and fall back to `0` when they are not numeric.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    Number(f64),
    Raw(String),
}

impl SampleValue {
    /// Returns the finite numeric value or a validation error.
    pub fn to_finite(&self, metric: &str) -> Result<f64, ValidationError> {
        let parsed = match self {
            SampleValue::Number(n) => Some(*n),
            SampleValue::Raw(s) => s.trim().parse::<f64>().ok(),
        };
        match parsed {
            Some(n) if n.is_finite() => Ok(n),
            _ => Err(ValidationError::NonNumericValue {
                metric: metric.to_string(),
                value: match self {
                    SampleValue::Number(n) => n.to_string(),
                    SampleValue::Raw(s) => s.clone(),
                },
            }),
        }
    }
}

macro_rules! sample_value_from {
    ($($t:ty),*) => {
        $(impl From<$t> for SampleValue {
            fn from(v: $t) -> Self {
                SampleValue::Number(v as f64)
            }
        })*
    };
}

sample_value_from!(f64, f32, i64, i32, u64, u32, usize);

impl From<&str> for SampleValue {
    fn from(v: &str) -> Self {
        SampleValue::Raw(v.to_string())
    }
}

impl From<String> for SampleValue {
    fn from(v: String) -> Self {
        SampleValue::Raw(v)
    }
}

/// Replaces every character outside `[a-zA-Z0-9_:]` with `_`.
pub fn sanitize_metric_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").into_owned()
}

/// Replaces every character outside `[a-zA-Z0-9_]` with `_`.
pub fn sanitize_label_key(key: &str) -> String {
    INVALID_LABEL_KEY_CHARS.replace_all(key, "_").into_owned()
}

/// Escapes a label value for use between double quotes.
///
/// Long values are cut to [`MAX_LABEL_VALUE_CHARS`] characters plus `...`.
/// Anything that is not printable ASCII after escaping is removed.
pub fn escape_label_value(value: &str) -> String {
    let char_count = value.chars().count();
    let truncated: String = if char_count > MAX_LABEL_VALUE_CHARS {
        warn!("{}", ValidationError::LabelTruncated(char_count));
        let mut cut: String = value.chars().take(MAX_LABEL_VALUE_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        value.to_string()
    };

    let mut escaped = String::with_capacity(truncated.len());
    for c in truncated.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            ' '..='~' => escaped.push(c),
            _ => {}
        }
    }
    escaped
}

/// Renders `value` the way the exposition format expects, substituting `0` for
/// anything that is not a finite number.
pub fn render_value(metric: &str, value: &SampleValue) -> String {
    match value.to_finite(metric) {
        Ok(n) => format_number(n),
        Err(e) => {
            warn!("{}", e);
            "0".to_string()
        }
    }
}

fn format_number(n: f64) -> String {
    if n == 0.0 {
        // Avoid "-0".
        "0".to_string()
    } else {
        n.to_string()
    }
}

/// Renders one sample line: `name{wordpress_site="site",k="v"} value\n`.
///
/// Returns an empty string when the name is empty after sanitization.
pub fn format_metric(
    name: &str,
    site: &str,
    labels: &[(&str, &str)],
    value: impl Into<SampleValue>,
) -> String {
    let metric_name = sanitize_metric_name(name);
    if metric_name.is_empty() {
        warn!("{}", ValidationError::EmptyMetricName(name.to_string()));
        return String::new();
    }

    let mut line = String::with_capacity(64 + labels.len() * 24);
    line.push_str(&metric_name);
    line.push('{');
    line.push_str(SITE_LABEL);
    line.push_str("=\"");
    line.push_str(&escape_label_value(site));
    line.push('"');

    for (key, label_value) in labels {
        let key = sanitize_label_key(key);
        if key.is_empty() {
            continue;
        }
        write!(line, ",{}=\"{}\"", key, escape_label_value(label_value)).ok();
    }

    let value = value.into();
    writeln!(line, "}} {}", render_value(&metric_name, &value)).ok();
    line
}

#[derive(Debug, Clone)]
struct Sample {
    labels: Vec<(String, String)>,
    value: SampleValue,
}

/// All samples sharing one metric name.
#[derive(Debug, Clone)]
pub struct MetricFamily {
    name: String,
    help: String,
    kind: MetricKind,
    samples: Vec<Sample>,
}

impl MetricFamily {
    /// Appends a sample. Label order is emission order.
    pub fn sample(&mut self, labels: &[(&str, &str)], value: impl Into<SampleValue>) -> &mut Self {
        self.samples.push(Sample {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value: value.into(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Ordered set of metric families produced by one collector.
#[derive(Debug, Clone, Default)]
pub struct MetricBlock {
    families: Vec<MetricFamily>,
}

impl MetricBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the family called `name`, creating it on first use.
    ///
    /// A later call with the same name reuses the existing family, so its samples
    /// are rendered together.
    pub fn family(&mut self, name: &str, help: &str, kind: MetricKind) -> &mut MetricFamily {
        if let Some(idx) = self.families.iter().position(|f| f.name == name) {
            return &mut self.families[idx];
        }
        self.families.push(MetricFamily {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            samples: Vec::new(),
        });
        let last = self.families.len() - 1;
        &mut self.families[last]
    }

    /// Moves every family of `other` into this block.
    pub fn extend(&mut self, other: MetricBlock) {
        for family in other.families {
            let target = self.family(&family.name, &family.help, family.kind);
            target.samples.extend(family.samples);
        }
    }

    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Total number of samples over all families.
    pub fn sample_count(&self) -> usize {
        self.families.iter().map(|f| f.samples.len()).sum()
    }

    /// Renders HELP/TYPE preambles and sample lines for every family.
    pub fn render(&self, site: &str) -> String {
        let mut out = String::new();
        for family in &self.families {
            let name = sanitize_metric_name(&family.name);
            if name.is_empty() {
                warn!("{}", ValidationError::EmptyMetricName(family.name.clone()));
                continue;
            }
            writeln!(out, "# HELP {} {}", name, help_text(&family.help)).ok();
            writeln!(out, "# TYPE {} {}", name, family.kind).ok();
            for sample in &family.samples {
                let labels: Vec<(&str, &str)> = sample
                    .labels
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str()))
                    .collect();
                out.push_str(&format_metric(&name, site, &labels, sample.value.clone()));
            }
        }
        out
    }
}

/// HELP text may not span lines and escapes backslashes.
fn help_text(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}
