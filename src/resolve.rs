use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// Expands `{dotted.key}` tokens in string attributes against the merged map.
///
/// `{{` and `}}` produce literal braces. Referenced strings are expanded
/// recursively; numbers and booleans are inserted in their plain form.
/// Values covered by the literal layer are never expanded, neither in place
/// nor when another value refers to them.
pub struct Resolver<'a> {
    root: &'a Map<String, Value>,
    literal: Option<&'a Map<String, Value>>,
}

impl<'a> Resolver<'a> {
    pub fn new(root: &'a Map<String, Value>) -> Self {
        Self {
            root,
            literal: None,
        }
    }

    /// Keeps every leaf of `layer` verbatim.
    pub fn with_literal(mut self, layer: &'a Map<String, Value>) -> Self {
        self.literal = Some(layer);
        self
    }

    /// Returns a copy of the whole map with every non-literal string expanded.
    pub fn expand_all(&self) -> Result<Map<String, Value>, ConfigurationError> {
        let mut out = Map::with_capacity(self.root.len());
        for (k, v) in self.root.iter() {
            let literal = self.literal.and_then(|l| l.get(k));
            out.insert(k.clone(), self.expand_value(k, v, literal)?);
        }
        Ok(out)
    }

    fn expand_value(
        &self,
        key: &str,
        v: &Value,
        literal: Option<&Value>,
    ) -> Result<Value, ConfigurationError> {
        let literal_table = match literal {
            None => None,
            Some(Value::Object(t)) => Some(t),
            Some(_) => return Ok(v.clone()),
        };

        Ok(match v {
            Value::String(s) => Value::String(self.resolve(key, s)?),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    out.push(self.expand_value(&format!("{key}[{i}]"), item, None)?);
                }
                Value::Array(out)
            }
            Value::Object(m) => {
                let mut out = Map::with_capacity(m.len());
                for (k, item) in m.iter() {
                    let lit = literal_table.and_then(|t| t.get(k));
                    out.insert(k.clone(), self.expand_value(&format!("{key}.{k}"), item, lit)?);
                }
                Value::Object(out)
            }
            other => other.clone(),
        })
    }

    fn is_literal(&self, path: &str) -> bool {
        self.literal
            .and_then(|l| lookup(l, path))
            .is_some_and(|v| !v.is_object())
    }

    /// Expands tokens in `input`; `key` names the attribute for error messages.
    pub fn resolve(&self, key: &str, input: &str) -> Result<String, ConfigurationError> {
        let mut stack = vec![key.to_string()];
        self.resolve_inner(key, input, &mut stack)
    }

    fn resolve_inner(
        &self,
        key: &str,
        input: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, ConfigurationError> {
        // Fast path
        if !input.contains('{') && !input.contains("}}") {
            return Ok(input.to_string());
        }

        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];

            if let Some(after) = tail.strip_prefix("{{") {
                out.push('{');
                rest = after;
                continue;
            }
            if let Some(after) = tail.strip_prefix("}}") {
                out.push('}');
                rest = after;
                continue;
            }
            if tail.starts_with('}') {
                out.push('}');
                rest = &tail[1..];
                continue;
            }

            let Some(end) = tail.find('}') else {
                return Err(ConfigurationError::UnclosedToken {
                    key: key.to_string(),
                    value: input.to_string(),
                });
            };

            let token = tail[1..end].trim();
            out.push_str(&self.token_value(key, token, stack)?);
            rest = &tail[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }

    fn token_value(
        &self,
        key: &str,
        token: &str,
        stack: &mut Vec<String>,
    ) -> Result<String, ConfigurationError> {
        let value = lookup(self.root, token).ok_or_else(|| ConfigurationError::UnknownToken {
            key: key.to_string(),
            token: token.to_string(),
        })?;

        match value {
            Value::String(s) if self.is_literal(token) => Ok(s.clone()),
            Value::String(s) => {
                if stack.iter().any(|k| k == token) {
                    let mut chain = stack.clone();
                    chain.push(token.to_string());
                    return Err(ConfigurationError::TokenCycle {
                        key: key.to_string(),
                        chain: chain.join(" -> "),
                    });
                }
                stack.push(token.to_string());
                let expanded = self.resolve_inner(token, s, stack);
                stack.pop();
                expanded
            }
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(ConfigurationError::NonScalarToken {
                key: key.to_string(),
                token: token.to_string(),
            }),
        }
    }
}

/// Dotted-path lookup (`ssl.dir`) into a nested map.
pub fn lookup<'v>(root: &'v Map<String, Value>, path: &str) -> Option<&'v Value> {
    let mut parts = path.split('.');
    let mut cur = root.get(parts.next()?)?;
    for part in parts {
        cur = cur.as_object()?.get(part)?;
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn expands_nested_tokens() {
        let root = map(json!({
            "dash_path": "/srv/dash",
            "wsgi_path": "{dash_path}/wsgi",
            "ssl": { "dir": "/etc/ssl", "cert_dir": "{ssl.dir}/certs" },
            "vhost": "{wsgi_path}:{http.port}",
            "http": { "port": 8080 },
        }));

        let out = Resolver::new(&root).expand_all().unwrap();
        assert_eq!(out["wsgi_path"], "/srv/dash/wsgi");
        assert_eq!(out["ssl"]["cert_dir"], "/etc/ssl/certs");
        assert_eq!(out["vhost"], "/srv/dash/wsgi:8080");
    }

    #[test]
    fn double_braces_are_literal() {
        let root = map(json!({ "a": "x" }));
        let r = Resolver::new(&root);
        assert_eq!(r.resolve("k", "%{{HTTP_HOST}}/{a}").unwrap(), "%{HTTP_HOST}/x");
    }

    #[test]
    fn unknown_and_unclosed_tokens_fail() {
        let root = map(json!({}));
        let r = Resolver::new(&root);
        assert!(matches!(
            r.resolve("k", "{nope}"),
            Err(ConfigurationError::UnknownToken { token, .. }) if token == "nope"
        ));
        assert!(matches!(
            r.resolve("k", "{open"),
            Err(ConfigurationError::UnclosedToken { .. })
        ));
    }

    #[test]
    fn cycles_are_detected() {
        let root = map(json!({ "a": "{b}", "b": "{a}" }));
        let err = Resolver::new(&root).expand_all().unwrap_err();
        assert!(matches!(err, ConfigurationError::TokenCycle { .. }));
    }

    #[test]
    fn literal_values_are_kept_and_inserted_verbatim() {
        let root = map(json!({
            "base": "/srv/{x}",
            "derived": "{base}/static",
            "site": { "secret": "ab}}cd{", "path": "{base}" },
        }));
        let literal = map(json!({ "base": "/srv/{x}", "site": { "secret": "ab}}cd{" } }));

        let out = Resolver::new(&root).with_literal(&literal).expand_all().unwrap();
        assert_eq!(out["base"], "/srv/{x}");
        assert_eq!(out["derived"], "/srv/{x}/static");
        assert_eq!(out["site"]["secret"], "ab}}cd{");
        assert_eq!(out["site"]["path"], "/srv/{x}");
    }

    #[test]
    fn lists_cannot_be_interpolated() {
        let root = map(json!({ "hosts": ["a"], "x": "{hosts}" }));
        let err = Resolver::new(&root).expand_all().unwrap_err();
        assert!(matches!(err, ConfigurationError::NonScalarToken { .. }));
    }
}
