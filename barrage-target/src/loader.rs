use crate::{Headers, LoadError, Target, TargetList};
use bytes::Bytes;
use common_types::Protocol;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use log::{debug, trace};
use std::io::BufRead;
use url::Url;

/// Read targets out of a line separated source, skipping blank lines and `//` comments.
///
/// Loading stops at the first malformed line, there's no partial result.
pub fn load<R: BufRead>(
    source: R,
    protocol: Protocol,
    headers: &Headers,
) -> Result<TargetList, LoadError> {
    let lines = source.lines().collect::<Result<Vec<_>, _>>()?;
    parse_lines(lines.iter().map(String::as_str), protocol, headers)
}

pub fn parse_lines<'a, I>(
    lines: I,
    protocol: Protocol,
    headers: &Headers,
) -> Result<TargetList, LoadError>
where
    I: IntoIterator<Item = &'a str>,
{
    let lines = lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with("//"));
    let targets = match protocol {
        Protocol::Http => parse_http_targets(lines, headers)?,
        Protocol::Publish => parse_publish_targets(lines)?,
    };
    debug!("[parse_lines] - loaded {} {} targets", targets.len(), protocol);
    TargetList::new(targets)
}

/// `ACTION URI PAYLOAD`, the payload is everything after the URI and may contain spaces
fn parse_publish_targets<'a>(
    lines: impl Iterator<Item = (usize, &'a str)>,
) -> Result<Vec<Target>, LoadError> {
    let mut targets = vec![];
    for (line, content) in lines {
        let invalid_format = || LoadError::InvalidFormat {
            line,
            content: content.to_string(),
        };
        let (action, rest) = split_field(content).ok_or_else(invalid_format)?;
        let (uri, payload) = split_field(rest).ok_or_else(invalid_format)?;
        let url = Url::parse(uri).map_err(|source| LoadError::InvalidUrl {
            line,
            content: content.to_string(),
            source,
        })?;
        let target = Target::publish(action.to_string(), url, Bytes::from(payload.to_string()))
            .map_err(|reason| LoadError::InvalidDestination {
                line,
                content: content.to_string(),
                reason,
            })?;
        trace!("[parse_publish_targets] - {}", &target);
        targets.push(target);
    }
    Ok(targets)
}

/// A target begins with `METHOD URL`, the `Key: Value` lines following it are its headers.
fn parse_http_targets<'a>(
    lines: impl Iterator<Item = (usize, &'a str)>,
    global: &Headers,
) -> Result<Vec<Target>, LoadError> {
    let mut targets = vec![];
    let mut current: Option<(Method, Url, HeaderMap)> = None;
    for (line, content) in lines {
        let fields = content.split_whitespace().collect::<Vec<_>>();
        if is_method_token(fields[0]) {
            if fields.len() != 2 {
                return Err(LoadError::InvalidFormat {
                    line,
                    content: content.to_string(),
                });
            }
            let method = Method::from_bytes(fields[0].as_bytes()).map_err(|_| {
                LoadError::InvalidFormat {
                    line,
                    content: content.to_string(),
                }
            })?;
            let url = Url::parse(fields[1]).map_err(|source| LoadError::InvalidUrl {
                line,
                content: content.to_string(),
                source,
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(LoadError::InvalidDestination {
                    line,
                    content: content.to_string(),
                    reason: format!("unsupported scheme `{}`", url.scheme()),
                });
            }
            if let Some((method, url, headers)) = current.take() {
                targets.push(Target::http(method, url, headers, Bytes::new()));
            }
            current = Some((method, url, global.as_map().clone()));
            continue;
        }

        let headers = match current.as_mut() {
            Some((_, _, headers)) => headers,
            None => {
                return Err(LoadError::InvalidFormat {
                    line,
                    content: content.to_string(),
                })
            }
        };
        let (name, value) = parse_header_line(content).map_err(|source| {
            LoadError::InvalidHeader {
                line,
                content: content.to_string(),
                source,
            }
        })?;
        // a per target header replaces the global one
        headers.insert(name, value);
    }
    if let Some((method, url, headers)) = current.take() {
        targets.push(Target::http(method, url, headers, Bytes::new()));
    }
    Ok(targets)
}

/// Unlike header flags, header lines may carry `:` in the value, e.g. `Host: localhost:8080`
fn parse_header_line(content: &str) -> Result<(HeaderName, HeaderValue), crate::HeaderError> {
    let (key, value) = content
        .split_once(':')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, v)| !k.is_empty() && !v.is_empty())
        .ok_or_else(|| crate::HeaderError::Format(content.to_string()))?;
    let name = HeaderName::from_bytes(key.as_bytes())
        .map_err(|_| crate::HeaderError::Name(content.to_string()))?;
    let value =
        HeaderValue::from_str(value).map_err(|_| crate::HeaderError::Value(content.to_string()))?;
    Ok((name, value))
}

fn is_method_token(field: &str) -> bool {
    !field.is_empty() && field.bytes().all(|b| b.is_ascii_uppercase())
}

/// Split off the first whitespace delimited field, returning it and the rest of the line.
/// None if either part is empty.
fn split_field(content: &str) -> Option<(&str, &str)> {
    let (field, rest) = content.split_once(char::is_whitespace)?;
    let rest = rest.trim_start();
    if field.is_empty() || rest.is_empty() {
        None
    } else {
        Some((field, rest))
    }
}
