use crate::error::TransportError;

pub const DEFAULT_RTMP_PORT: u16 = 1935;

/// A parsed `rtmp://host[:port]/app/stream_key` publish URL.
///
/// Everything between the host and the last `/` is the application name, so
/// `rtmp://host/live/instance/key` publishes `key` to app `live/instance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtmpUrl {
    pub host: String,
    pub port: u16,
    pub app: String,
    pub stream_key: String,
}

impl RtmpUrl {
    pub fn parse(url: &str) -> Result<RtmpUrl, TransportError> {
        let invalid = || TransportError::InvalidUrl(url.to_string());

        let rest = url
            .strip_prefix("rtmp://")
            .or_else(|| url.strip_prefix("RTMP://"))
            .ok_or_else(invalid)?;
        let (authority, path) = rest.split_once('/').ok_or_else(invalid)?;
        let (app, stream_key) = path.rsplit_once('/').ok_or_else(invalid)?;
        if authority.is_empty() || app.is_empty() || stream_key.is_empty() {
            return Err(invalid());
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, DEFAULT_RTMP_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(RtmpUrl {
            host: host.to_string(),
            port,
            app: app.to_string(),
            stream_key: stream_key.to_string(),
        })
    }

    /// The `tcUrl` sent with `connect`.
    pub fn tc_url(&self) -> String {
        format!("rtmp://{}:{}/{}", self.host, self.port, self.app)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_port() {
        let url = RtmpUrl::parse("rtmp://127.0.0.1:1936/live/stream1").unwrap();
        assert_eq!(url.host, "127.0.0.1");
        assert_eq!(url.port, 1936);
        assert_eq!(url.app, "live");
        assert_eq!(url.stream_key, "stream1");
        assert_eq!(url.tc_url(), "rtmp://127.0.0.1:1936/live");
    }

    #[test]
    fn test_parse_default_port_and_nested_app() {
        let url = RtmpUrl::parse("rtmp://example.com/live/instance/key?token=abc").unwrap();
        assert_eq!(url.port, DEFAULT_RTMP_PORT);
        assert_eq!(url.app, "live/instance");
        assert_eq!(url.stream_key, "key?token=abc");
    }

    #[test]
    fn test_parse_invalid() {
        for url in [
            "http://example.com/live/key",
            "rtmp://example.com/live",
            "rtmp://example.com/live/",
            "rtmp:///live/key",
            "rtmp://example.com:port/live/key",
        ] {
            assert!(
                matches!(RtmpUrl::parse(url), Err(TransportError::InvalidUrl(_))),
                "{url}"
            );
        }
    }
}
