use crate::error::EndpointError;
use url::Url;

/// Socket URL for a project, `<ws|wss>://<host>/ws/projects/<encoded name>`.
/// The scheme follows the origin's security context.
pub fn project_ws_url(origin: &Url, scope: &str) -> Result<Url, EndpointError> {
    if scope.is_empty() {
        return Err(EndpointError::EmptyScope);
    }
    let scheme = match origin.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    };
    let mut url = origin.clone();
    url.set_scheme(scheme)
        .map_err(|_| EndpointError::UnsupportedScheme(origin.scheme().to_string()))?;
    url.set_query(None);
    url.set_fragment(None);
    replace_path(&mut url, &["ws", "projects", scope])?;
    Ok(url)
}

/// REST URL under `/api/projects/<encoded name>/...` on the origin.
pub fn project_api_url(origin: &Url, scope: &str, tail: &[&str]) -> Result<Url, EndpointError> {
    if scope.is_empty() {
        return Err(EndpointError::EmptyScope);
    }
    let mut url = origin.clone();
    match url.scheme() {
        "http" | "https" => {}
        "ws" => url
            .set_scheme("http")
            .map_err(|_| EndpointError::UnsupportedScheme("ws".to_string()))?,
        "wss" => url
            .set_scheme("https")
            .map_err(|_| EndpointError::UnsupportedScheme("wss".to_string()))?,
        other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
    url.set_query(None);
    url.set_fragment(None);
    let mut segments = vec!["api", "projects", scope];
    segments.extend_from_slice(tail);
    replace_path(&mut url, &segments)?;
    Ok(url)
}

fn replace_path(url: &mut Url, segments: &[&str]) -> Result<(), EndpointError> {
    let display = url.to_string();
    let mut path = url
        .path_segments_mut()
        .map_err(|_| EndpointError::CannotBeABase(display))?;
    path.clear();
    for segment in segments {
        path.push(segment);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(raw: &str) -> Url {
        Url::parse(raw).expect("origin")
    }

    #[test]
    fn insecure_origin_maps_to_ws() {
        let url = project_ws_url(&origin("http://127.0.0.1:8888/"), "alpha").expect("url");
        assert_eq!(url.as_str(), "ws://127.0.0.1:8888/ws/projects/alpha");
    }

    #[test]
    fn secure_origin_maps_to_wss() {
        let url = project_ws_url(&origin("https://dash.example.com/board?tab=2#top"), "alpha")
            .expect("url");
        assert_eq!(url.as_str(), "wss://dash.example.com/ws/projects/alpha");
    }

    #[test]
    fn scope_is_percent_encoded_as_one_segment() {
        let url = project_ws_url(&origin("http://localhost:8888"), "my app/v2?").expect("url");
        assert_eq!(url.as_str(), "ws://localhost:8888/ws/projects/my%20app%2Fv2%3F");
    }

    #[test]
    fn rejects_empty_scope_and_foreign_schemes() {
        assert_eq!(
            project_ws_url(&origin("http://localhost"), ""),
            Err(EndpointError::EmptyScope)
        );
        assert_eq!(
            project_ws_url(&origin("ftp://localhost"), "alpha"),
            Err(EndpointError::UnsupportedScheme("ftp".to_string()))
        );
    }

    #[test]
    fn api_urls_stay_on_http() {
        let url = project_api_url(&origin("wss://dash.example.com"), "alpha", &["agent", "status"])
            .expect("url");
        assert_eq!(url.as_str(), "https://dash.example.com/api/projects/alpha/agent/status");

        let url = project_api_url(&origin("http://127.0.0.1:8888"), "alpha", &[]).expect("url");
        assert_eq!(url.as_str(), "http://127.0.0.1:8888/api/projects/alpha");
    }
}
