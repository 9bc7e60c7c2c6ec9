use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Header '{0}' has a wrong format")]
    Format(String),
    #[error("Header '{0}' has an invalid name")]
    Name(String),
    #[error("Header '{0}' has an invalid value")]
    Value(String),
}

/// Parse a `Key: Value` header flag.
///
/// The value is split on `:` and must have exactly two parts, neither of them empty after
/// trimming. `Host: localhost:8080` is therefore rejected, put such headers in the targets
/// file instead.
pub fn parse_header(value: &str) -> Result<(String, String), HeaderError> {
    let parts = value.split(':').collect::<Vec<_>>();
    if parts.len() != 2 {
        return Err(HeaderError::Format(value.to_string()));
    }
    let (key, val) = (parts[0].trim(), parts[1].trim());
    if key.is_empty() || val.is_empty() {
        return Err(HeaderError::Format(value.to_string()));
    }
    HeaderName::from_bytes(key.as_bytes()).map_err(|_| HeaderError::Name(value.to_string()))?;
    HeaderValue::from_str(val).map_err(|_| HeaderError::Value(value.to_string()))?;
    Ok((key.to_string(), val.to_string()))
}

/// Headers added to every request target, usually given with repeated `--header` flags
#[derive(Debug, Clone, Default)]
pub struct Headers(HeaderMap);

impl Headers {
    pub fn add(&mut self, value: &str) -> Result<(), HeaderError> {
        let (name, val) = parse_header(value)?;
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| HeaderError::Name(value.to_string()))?;
        let val = HeaderValue::from_str(&val).map_err(|_| HeaderError::Value(value.to_string()))?;
        self.0.append(name, val);
        Ok(())
    }

    /// Parse every flag on its own. A malformed flag doesn't stop the others from being
    /// parsed, all failures are returned together.
    pub fn from_flags<I, S>(flags: I) -> Result<Self, Vec<HeaderError>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut headers = Headers::default();
        let errors = flags
            .into_iter()
            .filter_map(|flag| headers.add(flag.as_ref()).err())
            .collect::<Vec<_>>();
        if errors.is_empty() {
            Ok(headers)
        } else {
            Err(errors)
        }
    }

    pub fn as_map(&self) -> &HeaderMap {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case("X-Test : 1", "X-Test", "1" ; "trims whitespace")]
    #[test_case("Authorization: Bearer 123", "Authorization", "Bearer 123" ; "value with space")]
    #[test_case("accept:*/*", "accept", "*/*" ; "no spaces")]
    fn valid_header(flag: &str, name: &str, value: &str) {
        let (n, v) = parse_header(flag).unwrap();
        assert_eq!(n, name);
        assert_eq!(v, value);
    }

    #[test_case("bad-header" ; "no colon")]
    #[test_case("Host: localhost:8080" ; "too many colons")]
    #[test_case(" : value" ; "empty key")]
    #[test_case("X-Empty:   " ; "empty value")]
    fn wrong_format(flag: &str) {
        assert_eq!(
            parse_header(flag),
            Err(HeaderError::Format(flag.to_string()))
        );
    }

    #[test]
    fn invalid_name() {
        assert!(matches!(
            parse_header("bad name: 1"),
            Err(HeaderError::Name(_))
        ));
    }

    #[test]
    fn from_flags_collects_every_error() {
        let result = Headers::from_flags(["X-A: 1", "bad-header", "X-B: 2", "also:bad:header"]);
        let errors = result.unwrap_err();
        assert_eq!(
            errors,
            vec![
                HeaderError::Format("bad-header".to_string()),
                HeaderError::Format("also:bad:header".to_string()),
            ]
        );
    }

    #[test]
    fn repeated_headers_are_appended() {
        let headers = Headers::from_flags(["X-A: 1", "X-A: 2", "X-B: 3"]).unwrap();
        let values = headers
            .as_map()
            .get_all("x-a")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(values, vec!["1", "2"]);
        assert_eq!(headers.as_map().len(), 3);
    }
}
