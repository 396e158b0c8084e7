//! Site version and interpreter configuration.

use super::{CollectContext, Collector};
use crate::error::CollectionError;
use crate::format::{MetricBlock, MetricKind};
use crate::host::RuntimeVersion;

/// Interpreter settings reported under `wordpress_php_info` and
/// `wordpress_config_info`.
pub const INI_KEYS: [&str; 6] = [
    "max_input_vars",
    "max_execution_time",
    "memory_limit",
    "max_input_time",
    "upload_max_filesize",
    "post_max_size",
];

/// Longest numeric prefix of `s` (optional sign, digits, one decimal point).
fn leading_number(s: &str) -> f64 {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }
    if !seen_digit {
        return 0.0;
    }
    s[..end].trim_end_matches('.').parse::<f64>().unwrap_or(0.0)
}

/// Converts shorthand size notation to bytes.
///
/// `"128M"` → 134217728, `"2g"` → 2147483648, `"512"` → 512, `"-1"` → -1.
/// Anything without a numeric prefix is 0.
pub fn convert_to_bytes(size: &str) -> f64 {
    let size = size.trim();
    let multiplier = match size.chars().last().map(|c| c.to_ascii_uppercase()) {
        Some('K') => 1024.0,
        Some('M') => 1024.0 * 1024.0,
        Some('G') => 1024.0 * 1024.0 * 1024.0,
        _ => return leading_number(size),
    };
    leading_number(&size[..size.len() - 1]) * multiplier
}

pub struct RuntimeCollector;

impl Collector for RuntimeCollector {
    fn name(&self) -> &'static str {
        "runtime"
    }

    fn collect(&self, ctx: &CollectContext<'_>) -> Result<MetricBlock, CollectionError> {
        let site = &ctx.host.site;
        let runtime = &ctx.host.runtime;
        let mut block = MetricBlock::new();

        let version = site
            .version()
            .map_err(|e| CollectionError::host(self.name(), e))?;
        let update_available = if site.core_update_available().unwrap_or(false) {
            "1"
        } else {
            "0"
        };
        block
            .family(
                "wordpress_version",
                "WordPress version information.",
                MetricKind::Gauge,
            )
            .sample(
                &[("version", version.as_str()), ("update_available", update_available)],
                1,
            );

        let php = RuntimeVersion::parse(
            &runtime
                .runtime_version()
                .map_err(|e| CollectionError::host(self.name(), e))?,
        );
        let (major, minor, release) = (
            php.major.to_string(),
            php.minor.to_string(),
            php.release.to_string(),
        );
        block
            .family(
                "wordpress_php_info",
                "PHP configuration information.",
                MetricKind::Gauge,
            )
            .sample(&[("type", "version"), ("label", php.version.as_str())], php.version_id())
            .sample(&[("type", "major_version"), ("label", major.as_str())], php.major)
            .sample(&[("type", "minor_version"), ("label", minor.as_str())], php.minor)
            .sample(&[("type", "release_version"), ("label", release.as_str())], php.release);

        block
            .family(
                "wordpress_php_version_info",
                "PHP version as readable string.",
                MetricKind::Gauge,
            )
            .sample(&[("php_version", php.version.as_str())], 1);

        for key in INI_KEYS {
            let raw = runtime.ini_get(key).unwrap_or_default();
            let bytes = convert_to_bytes(&raw);

            block
                .family(
                    "wordpress_php_info",
                    "PHP configuration information.",
                    MetricKind::Gauge,
                )
                .sample(&[("type", key), ("label", raw.as_str())], bytes);
            block
                .family(
                    "wordpress_config_info",
                    "WordPress and PHP configuration values.",
                    MetricKind::Gauge,
                )
                .sample(&[("config", key), ("value", raw.as_str())], bytes);

            let display = match key {
                "memory_limit" => Some((
                    "wordpress_memory_limit_info",
                    "Memory limit for table display.",
                    "memory_limit",
                )),
                "upload_max_filesize" => Some((
                    "wordpress_upload_max_info",
                    "Upload max filesize for table display.",
                    "upload_max",
                )),
                "post_max_size" => Some((
                    "wordpress_post_max_info",
                    "Post max size for table display.",
                    "post_max",
                )),
                "max_execution_time" => Some((
                    "wordpress_exec_time_info",
                    "Max execution time for table display.",
                    "exec_time",
                )),
                _ => None,
            };
            if let Some((metric, help, label)) = display {
                block
                    .family(metric, help, MetricKind::Gauge)
                    .sample(&[(label, raw.as_str())], 1);
            }
        }

        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::test_support::Fixture;
    use crate::host::SiteSnapshot;

    #[test]
    fn test_convert_to_bytes() {
        assert_eq!(convert_to_bytes("128M"), 134_217_728.0);
        assert_eq!(convert_to_bytes(" 64k "), 65_536.0);
        assert_eq!(convert_to_bytes("1G"), 1_073_741_824.0);
        assert_eq!(convert_to_bytes("1.5M"), 1_572_864.0);
        assert_eq!(convert_to_bytes("300"), 300.0);
        assert_eq!(convert_to_bytes("-1"), -1.0);
        assert_eq!(convert_to_bytes("unlimited"), 0.0);
        assert_eq!(convert_to_bytes(""), 0.0);
        assert_eq!(convert_to_bytes("M"), 0.0);
    }

    #[test]
    fn test_runtime_metrics() {
        let mut snapshot = SiteSnapshot::sample();
        snapshot.site.core_update_available = true;
        let text = Fixture::new(snapshot).render(&RuntimeCollector);

        assert!(text.contains(
            "wordpress_version{wordpress_site=\"site\",version=\"6.6.2\",update_available=\"1\"} 1\n"
        ));
        assert!(text.contains("wordpress_php_info{wordpress_site=\"site\",type=\"version\",label=\"8.2.12\"} 80212\n"));
        assert!(text.contains("wordpress_php_info{wordpress_site=\"site\",type=\"minor_version\",label=\"2\"} 2\n"));
        assert!(text.contains("wordpress_php_info{wordpress_site=\"site\",type=\"memory_limit\",label=\"256M\"} 268435456\n"));
        assert!(text.contains("wordpress_config_info{wordpress_site=\"site\",config=\"post_max_size\",value=\"64M\"} 67108864\n"));
        assert!(text.contains("wordpress_php_version_info{wordpress_site=\"site\",php_version=\"8.2.12\"} 1\n"));
        assert!(text.contains("wordpress_memory_limit_info{wordpress_site=\"site\",memory_limit=\"256M\"} 1\n"));
        assert!(text.contains("wordpress_exec_time_info{wordpress_site=\"site\",exec_time=\"30\"} 1\n"));
    }

    #[test]
    fn test_php_info_family_is_contiguous() {
        let text = Fixture::new(SiteSnapshot::sample()).render(&RuntimeCollector);
        let positions: Vec<usize> = text
            .lines()
            .enumerate()
            .filter(|(_, l)| l.starts_with("wordpress_php_info{"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(positions.len(), 4 + INI_KEYS.len());
        assert!(positions.windows(2).all(|w| w[1] == w[0] + 1));
        assert_eq!(text.matches("# TYPE wordpress_php_info gauge").count(), 1);
    }
}
