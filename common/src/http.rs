use url::Url;

use crate::error::{ConfigError, TransportError};

/// Blocking GET used by the weather and feed clients.
///
/// The host build backs this with `ureq`, the ESP build with `EspHttpConnection`.
pub trait HttpTransport {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for &mut T {
    fn get(&mut self, url: &str, headers: &[(&str, &str)]) -> Result<String, TransportError> {
        (**self).get(url, headers)
    }
}

/// Joins `base` and the query pairs, percent-encoding values.
pub fn build_url(base: &str, query: &[(&str, String)]) -> Result<String, ConfigError> {
    let url = Url::parse_with_params(base, query.iter().map(|(k, v)| (*k, v.as_str())))
        .map_err(|err| ConfigError::InvalidUrl {
            url: base.to_string(),
            reason: err.to_string(),
        })?;
    Ok(url.into())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_query_values() {
        let url = build_url(
            "https://api.example.com/onecall",
            &[
                ("lat", "49.8844".to_string()),
                ("exclude", "minutely,alerts".to_string()),
            ],
        )
        .unwrap();

        assert_eq!(
            url,
            "https://api.example.com/onecall?lat=49.8844&exclude=minutely%2Calerts"
        );
    }

    #[test]
    fn rejects_relative_base() {
        assert!(matches!(
            build_url("not a url", &[]),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
