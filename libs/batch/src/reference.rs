//! Response Template Resolver
//!
//! A Sub-Request naming an earlier Sub-Request in `reference` can use JSON-path tokens
//! (`$.resourceId`, `$.changes[0].id`) in its relative URL and body. Tokens are replaced with
//! values taken from the parent's response body before the request is routed.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{SubRequest, SubResponse};
use crate::url::split_query;

const TOKEN_PREFIX: &str = "$.";

/// Apply the parent's response to a Sub-Request.
///
/// `earlier` holds the Sub-Responses produced so far in this batch. Requests without a
/// reference are returned unchanged.
pub fn resolve(request: &SubRequest, earlier: &[SubResponse]) -> Result<SubRequest> {
    let Some(parent_id) = request.reference else {
        return Ok(request.clone());
    };

    let parent = earlier
        .iter()
        .find(|r| r.request_id == parent_id)
        .ok_or_else(|| {
            Error::MalformedRequest(format!(
                "Request {} references request {parent_id}, which does not precede it",
                request.request_id
            ))
        })?;

    if !parent.is_success() {
        return Err(Error::DependencyFailed { parent_id });
    }

    let mut parent_body = ParentBody::new(&parent.body);
    let mut resolved = request.clone();
    resolved.relative_url = substitute_url(&request.relative_url, &mut parent_body)?;
    resolved.body = substitute_body(&request.body, &mut parent_body)?;
    Ok(resolved)
}

/// Lazily parsed parent body; only requests that carry tokens need it to be JSON.
struct ParentBody<'a> {
    raw: &'a str,
    parsed: Option<Option<Value>>,
}

impl<'a> ParentBody<'a> {
    fn new(raw: &'a str) -> Self {
        Self { raw, parsed: None }
    }

    fn lookup(&mut self, token: &str) -> Result<Value> {
        let raw = self.raw;
        let root = self
            .parsed
            .get_or_insert_with(|| serde_json::from_str(raw).ok())
            .as_ref()
            .ok_or_else(|| Error::InvalidReference(token.to_string()))?;

        let path = token.strip_prefix(TOKEN_PREFIX).unwrap_or(token);
        evaluate(root, path)
            .cloned()
            .ok_or_else(|| Error::InvalidReference(token.to_string()))
    }
}

fn is_token(value: &str) -> bool {
    value.starts_with(TOKEN_PREFIX)
}

fn substitute_url(relative_url: &str, parent: &mut ParentBody<'_>) -> Result<String> {
    let (path, query) = split_query(relative_url);

    let segments = path
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            if is_token(&decoded) {
                let value = parent.lookup(&decoded)?;
                Ok(urlencoding::encode(&scalar_text(&value)).into_owned())
            } else {
                Ok(segment.to_string())
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let mut url = segments.join("/");

    if let Some(query) = query {
        let pairs = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, value)) => {
                    let decoded = urlencoding::decode(value)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| value.to_string());
                    if is_token(&decoded) {
                        let value = parent.lookup(&decoded)?;
                        Ok(format!(
                            "{key}={}",
                            urlencoding::encode(&scalar_text(&value))
                        ))
                    } else {
                        Ok(pair.to_string())
                    }
                }
                None => Ok(pair.to_string()),
            })
            .collect::<Result<Vec<_>>>()?;
        url.push('?');
        url.push_str(&pairs.join("&"));
    }

    Ok(url)
}

fn substitute_body(body: &str, parent: &mut ParentBody<'_>) -> Result<String> {
    if !body.contains(TOKEN_PREFIX) {
        return Ok(body.to_string());
    }
    let Ok(mut value) = serde_json::from_str::<Value>(body) else {
        return Ok(body.to_string());
    };
    substitute_value(&mut value, parent)?;
    Ok(value.to_string())
}

fn substitute_value(value: &mut Value, parent: &mut ParentBody<'_>) -> Result<()> {
    match value {
        Value::String(s) if is_token(s) => {
            *value = parent.lookup(s)?;
        }
        Value::Array(items) => {
            for item in items {
                substitute_value(item, parent)?;
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                substitute_value(item, parent)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Text form of a resolved value inside a URL: strings without quotes, everything else as JSON.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Evaluate a dotted path with optional `[n]` indexes: `a.b`, `a[0].b`, `[0].b`.
fn evaluate<'v>(root: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = root;
    for part in path.split('.') {
        let (name, mut indexes) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !name.is_empty() {
            current = current.get(name)?;
        } else if indexes.is_empty() {
            return None;
        }

        while !indexes.is_empty() {
            let inner = indexes.strip_prefix('[')?;
            let end = inner.find(']')?;
            let index: usize = inner[..end].trim().parse().ok()?;
            current = current.get(index)?;
            indexes = &inner[end + 1..];
        }
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parent(id: i64, body: Value) -> SubResponse {
        SubResponse::ok(id, body.to_string())
    }

    #[test]
    fn evaluates_dotted_and_indexed_paths() {
        let root = json!({"a": {"b": [1, {"c": "x"}]}, "list": [{"id": 3}]});
        assert_eq!(evaluate(&root, "a.b[1].c"), Some(&json!("x")));
        assert_eq!(evaluate(&root, "list[0].id"), Some(&json!(3)));
        assert_eq!(evaluate(&json!([{"id": 9}]), "[0].id"), Some(&json!(9)));
        assert_eq!(evaluate(&root, "a.missing"), None);
        assert_eq!(evaluate(&root, "list[4]"), None);
        assert_eq!(evaluate(&root, ""), None);
    }

    #[test]
    fn substitutes_url_segments_and_query_values() {
        let earlier = vec![parent(1, json!({"loanId": 42, "officer": "o b"}))];
        let request = SubRequest::new(2, "POST", "loans/$.loanId?command=assignloanofficer&to=$.officer")
            .with_reference(1);

        let resolved = resolve(&request, &earlier).unwrap();
        assert_eq!(
            resolved.relative_url,
            "loans/42?command=assignloanofficer&to=o%20b"
        );
    }

    #[test]
    fn substitutes_body_leaves_keeping_json_types() {
        let earlier = vec![parent(1, json!({"clientId": 7, "changes": {"name": "A"}}))];
        let request = SubRequest::new(2, "POST", "loans")
            .with_body(json!({"clientId": "$.clientId", "notes": ["$.changes.name"], "x": 1}).to_string())
            .with_reference(1);

        let resolved = resolve(&request, &earlier).unwrap();
        let body: Value = serde_json::from_str(&resolved.body).unwrap();
        assert_eq!(body, json!({"clientId": 7, "notes": ["A"], "x": 1}));
    }

    #[test]
    fn failed_parent_blocks_child() {
        let earlier = vec![SubResponse {
            request_id: 1,
            status_code: 404,
            headers: vec![],
            body: "{}".into(),
        }];
        let request = SubRequest::new(2, "GET", "loans/$.loanId").with_reference(1);
        assert_eq!(
            resolve(&request, &earlier),
            Err(Error::DependencyFailed { parent_id: 1 })
        );
    }

    #[test]
    fn reference_must_precede_child() {
        let request = SubRequest::new(2, "GET", "loans/1").with_reference(5);
        assert!(matches!(
            resolve(&request, &[]),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn unresolvable_token_is_invalid_reference() {
        let earlier = vec![parent(1, json!({"loanId": 42}))];
        let request = SubRequest::new(2, "GET", "loans/$.nope").with_reference(1);
        let err = resolve(&request, &earlier).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.response_body().contains("The referenced JSON path is invalid"));
    }

    #[test]
    fn non_json_parent_only_fails_when_tokens_are_used() {
        let earlier = vec![SubResponse::ok(1, "plain".into())];
        let plain = SubRequest::new(2, "GET", "loans/1").with_reference(1);
        assert!(resolve(&plain, &earlier).is_ok());

        let tokenized = SubRequest::new(3, "GET", "loans/$.id").with_reference(1);
        assert!(matches!(
            resolve(&tokenized, &earlier),
            Err(Error::InvalidReference(_))
        ));
    }

    #[test]
    fn tokens_without_reference_are_left_alone() {
        let request = SubRequest::new(2, "GET", "loans/$.loanId");
        assert_eq!(resolve(&request, &[]).unwrap(), request);
    }
}
