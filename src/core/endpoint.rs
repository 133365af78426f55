use std::fmt;

/// A single `host:port` backing store address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse a single `host` or `host:port` token, falling back to `default_port`
    pub fn parse(token: &str, default_port: u16) -> Result<Self, EndpointError> {
        let token = token.trim();
        let (host, port) = match token.split_once(':') {
            Some((host, port_text)) => {
                let port = port_text
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| EndpointError::InvalidPort {
                        token: token.to_string(),
                    })?;
                (host.trim(), port)
            }
            None => (token, default_port),
        };

        if host.is_empty() {
            return Err(EndpointError::EmptyHost {
                token: token.to_string(),
            });
        }

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Resolve a comma and/or whitespace separated host list into endpoints.
///
/// Order is preserved. Tokens without an explicit port use `default_port`.
/// Empty tokens produced by leading, trailing or repeated separators are skipped.
pub fn resolve_endpoints(hosts: &str, default_port: u16) -> Result<Vec<Endpoint>, EndpointError> {
    hosts
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| Endpoint::parse(token, default_port))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("Invalid port in host token '{token}'")]
    InvalidPort { token: String },
    #[error("Missing host in token '{token}'")]
    EmptyHost { token: String },
}
