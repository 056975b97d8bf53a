// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Prometheus text exposition for component snapshots.
//!
//! Separate from the `metrics` facade in [`crate::metrics`]: this renders a
//! component's current stats directly, so a host without a recorder can still
//! serve a scrape endpoint.

use std::fmt::Write as _;

/// Builds a Prometheus text-format block, one family at a time.
#[derive(Debug, Default)]
pub struct PromWriter {
    out: String,
}

impl PromWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge(&mut self, name: &str, help: &str, value: f64) -> &mut Self {
        self.header(name, help, "gauge");
        self.sample(name, &[], value);
        self
    }

    pub fn counter(&mut self, name: &str, help: &str, value: f64) -> &mut Self {
        self.header(name, help, "counter");
        self.sample(name, &[], value);
        self
    }

    /// One gauge family with a sample per value of `label`.
    pub fn gauge_vec(
        &mut self,
        name: &str,
        help: &str,
        label: &str,
        samples: &[(&str, f64)],
    ) -> &mut Self {
        self.header(name, help, "gauge");
        for &(value_label, value) in samples {
            self.sample(name, &[(label, value_label)], value);
        }
        self
    }

    pub fn counter_vec(
        &mut self,
        name: &str,
        help: &str,
        label: &str,
        samples: &[(&str, f64)],
    ) -> &mut Self {
        self.header(name, help, "counter");
        for &(value_label, value) in samples {
            self.sample(name, &[(label, value_label)], value);
        }
        self
    }

    #[must_use]
    pub fn finish(self) -> String {
        self.out
    }

    fn header(&mut self, name: &str, help: &str, kind: &str) {
        let _ = writeln!(self.out, "# HELP {name} {help}");
        let _ = writeln!(self.out, "# TYPE {name} {kind}");
    }

    fn sample(&mut self, name: &str, labels: &[(&str, &str)], value: f64) {
        self.out.push_str(name);
        if !labels.is_empty() {
            self.out.push('{');
            for (i, (k, v)) in labels.iter().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                let _ = write!(self.out, "{k}=\"{}\"", escape_label(v));
            }
            self.out.push('}');
        }
        let _ = writeln!(self.out, " {}", format_value(value));
    }
}

fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gauge_block() {
        let mut w = PromWriter::new();
        w.gauge("x_bytes", "Bytes in use", 42.0);
        assert_eq!(
            w.finish(),
            "# HELP x_bytes Bytes in use\n# TYPE x_bytes gauge\nx_bytes 42\n"
        );
    }

    #[test]
    fn test_labeled_samples_and_escaping() {
        let mut w = PromWriter::new();
        w.gauge_vec("entries", "Entries per tier", "tier", &[("hot", 1.0), ("a\"b", 0.5)]);
        let text = w.finish();
        assert!(text.contains("entries{tier=\"hot\"} 1\n"));
        assert!(text.contains("entries{tier=\"a\\\"b\"} 0.5\n"));
        assert_eq!(text.matches("# TYPE").count(), 1);
    }

    #[test]
    fn test_special_values() {
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(-1.5), "-1.5");
    }
}
