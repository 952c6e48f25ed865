/// Classification of failed responses into expiry outcomes
use crate::http::ApiResponse;
use reqwest::header::WWW_AUTHENTICATE;
use reqwest::StatusCode;
use serde_json::Value;

/// What a response means for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Any non-401, or a 401 without the expiry marker
    NotAuthRelated,
    /// Expired access token that can be renewed and replayed
    RenewableExpiry,
    /// Expired access token on a request already replayed, or without a refresh token
    TerminalExpiry,
}

/// JSON fields that may carry the expiry marker
const MARKER_FIELDS: [&str; 5] = ["code", "error", "error_code", "message", "error_description"];

/// Recognises the "access token expired" signal
///
/// A 401 counts as expiry when either the body carries one of the configured
/// markers, or the `WWW-Authenticate` challenge is an `invalid_token` error
/// whose `error_description` is one of them. Other 401s (bad credentials, missing
/// scope) never trigger renewal.
#[derive(Debug, Clone)]
pub struct ExpiryDetector {
    markers: Vec<String>,
}

impl ExpiryDetector {
    pub fn new<I, M>(markers: I) -> Self
    where
        I: IntoIterator<Item = M>,
        M: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// Classify a response for a request with the given retry state
    pub fn classify(
        &self,
        response: &ApiResponse,
        already_retried: bool,
        has_refresh_token: bool,
    ) -> Classification {
        if !self.is_expiry_signal(response) {
            return Classification::NotAuthRelated;
        }

        if already_retried || !has_refresh_token {
            Classification::TerminalExpiry
        } else {
            Classification::RenewableExpiry
        }
    }

    /// Whether the response is a 401 carrying the expiry marker
    pub fn is_expiry_signal(&self, response: &ApiResponse) -> bool {
        if response.status != StatusCode::UNAUTHORIZED {
            return false;
        }

        self.challenge_signals_expiry(response) || self.body_signals_expiry(response)
    }

    fn challenge_signals_expiry(&self, response: &ApiResponse) -> bool {
        response
            .headers
            .get_all(WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .any(|challenge| {
                let params = auth_params(challenge);
                let param = |name: &str| {
                    params
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.as_str())
                };

                param("error").is_some_and(|error| error.eq_ignore_ascii_case("invalid_token"))
                    && param("error_description").is_some_and(|text| self.matches_marker(text))
            })
    }

    fn body_signals_expiry(&self, response: &ApiResponse) -> bool {
        match serde_json::from_slice::<Value>(&response.body) {
            Ok(body) => self.value_has_marker(&body),
            Err(_) => self.matches_marker(&response.text()),
        }
    }

    fn value_has_marker(&self, body: &Value) -> bool {
        let Some(object) = body.as_object() else {
            return body.as_str().is_some_and(|text| self.matches_marker(text));
        };

        MARKER_FIELDS.iter().any(|field| match object.get(*field) {
            Some(Value::String(text)) => self.matches_marker(text),
            // {"error": {"code": "TOKEN_EXPIRED", ...}}
            Some(nested @ Value::Object(_)) => self.value_has_marker(nested),
            _ => false,
        })
    }

    fn matches_marker(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.markers.iter().any(|marker| *marker == text)
    }
}

/// Parameters of a `WWW-Authenticate` challenge as lowercased names and
/// unquoted values
fn auth_params(challenge: &str) -> Vec<(String, String)> {
    let Some((_scheme, rest)) = challenge.trim().split_once(char::is_whitespace) else {
        return Vec::new();
    };

    let mut params = Vec::new();
    let mut chars = rest.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}

        let name: String =
            std::iter::from_fn(|| chars.next_if(|c| *c != '=' && *c != ',')).collect();
        if name.is_empty() {
            break;
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }

        let value = if chars.next_if_eq(&'"').is_some() {
            let mut value = String::new();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.extend(chars.next()),
                    '"' => break,
                    _ => value.push(c),
                }
            }
            value
        } else {
            let token: String = std::iter::from_fn(|| chars.next_if(|c| *c != ',')).collect();
            token.trim().to_string()
        };

        params.push((name.trim().to_lowercase(), value));
    }
    params
}
