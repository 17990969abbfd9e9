#![allow(dead_code)]

use horizon_cookbook::{
    AttributeResolver, ConfigMap, Overrides, PlatformFamily, RenderSecrets, Renderer,
    TemplateName,
};
use regex::Regex;

pub fn resolve(family: PlatformFamily, sets: &[&str]) -> ConfigMap {
    let mut overrides = Overrides::new();
    for s in sets {
        overrides.set(s).unwrap();
    }
    AttributeResolver::builtin()
        .unwrap()
        .resolve(family, &overrides)
        .unwrap()
}

pub fn render(name: TemplateName, cfg: &ConfigMap) -> String {
    let secrets = RenderSecrets {
        db_password: "db-pass".to_string(),
    };
    Renderer::new().unwrap().render(name, cfg, &secrets).unwrap()
}

pub fn vhost(family: PlatformFamily, sets: &[&str]) -> String {
    render(TemplateName::Vhost, &resolve(family, sets))
}

pub fn settings(family: PlatformFamily, sets: &[&str]) -> String {
    render(TemplateName::Settings, &resolve(family, sets))
}

/// Number of lines matching `pattern`.
pub fn count_lines(text: &str, pattern: &str) -> usize {
    let re = Regex::new(pattern).unwrap();
    text.lines().filter(|l| re.is_match(l)).count()
}

pub fn has_line(text: &str, pattern: &str) -> bool {
    count_lines(text, pattern) > 0
}
