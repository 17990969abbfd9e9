use serde_json::{Map, Value};

use crate::{attributes::ConfigMap, cli::ReportMode, pipeline::RunReport};

pub fn build_report(report: &RunReport, mode: ReportMode) -> String {
    match mode {
        ReportMode::Summary => summary(report),
        ReportMode::Full => serde_json::to_string_pretty(report)
            .unwrap_or_else(|e| format!("<report unavailable: {e}>")),
    }
}

fn summary(report: &RunReport) -> String {
    let mut out = String::new();

    out.push_str(&format!("horizon-cookbook run ({})\n", report.platform));
    out.push_str("==========================\n");

    out.push_str(&format!(
        "packages: install={} memcache={} purge={}\n",
        report.packages.install.len(),
        report.packages.memcache.len(),
        report.packages.purge.len()
    ));
    for p in report
        .packages
        .install
        .iter()
        .chain(&report.packages.memcache)
    {
        out.push_str(&format!("  + {p}\n"));
    }
    for p in &report.packages.purge {
        out.push_str(&format!("  - {p}\n"));
    }

    out.push_str(&format!(
        "\nfiles: {}\n",
        report.directories.len() + report.written.len()
    ));
    for w in report.directories.iter().chain(&report.written) {
        out.push_str(&format!(
            "  {} {} {}:{} {} ({})\n",
            if w.changed { "~" } else { "=" },
            w.path.display(),
            w.owner,
            w.group,
            w.mode,
            w.name
        ));
    }
    for p in &report.fixed {
        out.push_str(&format!("  * {} (permissions)\n", p.display()));
    }
    for p in &report.removed {
        out.push_str(&format!("  x {}\n", p.display()));
    }

    if !report.jobs.is_empty() {
        out.push_str(&format!("\njobs: {}\n", report.jobs.join(", ")));
    }

    out.push_str(&format!(
        "\nsite: {} modules=[{}] listen=[{}]{}\n",
        report.site.enable.join(", "),
        report.site.modules.join(", "),
        report.site.listen.join(", "),
        if report.site_changed { " (changed)" } else { "" }
    ));

    out.push('\n');
    match report.service_action {
        Some(a) => out.push_str(&format!("service: {} {a}\n", report.service)),
        None => out.push_str(&format!("service: {} unchanged\n", report.service)),
    }

    out
}

/// The effective attributes with secret-like values replaced.
pub fn attribute_dump(cfg: &ConfigMap, redact: bool) -> Value {
    let mut root = cfg.as_map().clone();
    if redact {
        redact_map(&mut root);
    }
    Value::Object(root)
}

fn redact_map(map: &mut Map<String, Value>) {
    for (k, v) in map.iter_mut() {
        match v {
            Value::Object(inner) => redact_map(inner),
            Value::String(s) if !s.is_empty() && looks_sensitive_key(k) => {
                *s = "<redacted>".to_string();
            }
            _ => {}
        }
    }
}

fn looks_sensitive_key(k: &str) -> bool {
    let u = k.to_ascii_uppercase();
    u.contains("TOKEN")
        || u.contains("PASSWORD")
        || u.contains("PRIVATE")
        || u.ends_with("_CONTENT")
}
