// URL rewriting rules shared by media resolution, search and the scene nodes.
// Kept in sync with the hub client's media utilities.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;

use crate::config::ApiConfig;

const KNOWN_CONTENT_TYPES: &[(&str, &str)] = &[
    ("gltf", "model/gltf"),
    ("glb", "model/gltf-binary"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("pdf", "application/pdf"),
    ("mp4", "video/mp4"),
    ("mp3", "audio/mpeg"),
];

pub const GLTF_ZIP_CONTENT_TYPE: &str = "model/gltf+zip";

pub fn should_cors_proxy(config: &ApiConfig, url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            !config
                .direct_domains()
                .iter()
                .any(|domain| host.ends_with(domain.as_str()))
        }
        Err(_) => true,
    }
}

pub fn proxied_url_for(config: &ApiConfig, url: &str) -> String {
    if !(url.starts_with("http:") || url.starts_with("https:")) {
        return url.to_string();
    }

    if !should_cors_proxy(config, url) {
        return url.to_string();
    }

    match config.cors_proxy_prefix() {
        Some(proxy) => format!("{}/{}", proxy, url),
        None => url.to_string(),
    }
}

/// Undo proxying, resolve `url` against `base_url` when relative, then
/// re-apply the proxy rule. Streaming playlists reference segments relative
/// to the original, unproxied location.
pub fn unproxy_url(config: &ApiConfig, base_url: &str, url: &str) -> String {
    let mut base = base_url;
    let mut target = url;

    if let Some(proxy) = config.cors_proxy_prefix() {
        let prefix = format!("{}/", proxy);
        base = base.strip_prefix(prefix.as_str()).unwrap_or(base);
        target = target.strip_prefix(prefix.as_str()).unwrap_or(target);
    }

    let absolute = if target.starts_with("http") {
        target.to_string()
    } else {
        let path = if target.starts_with('/') {
            target.to_string()
        } else {
            format!("/{}", target)
        };

        match Url::parse(base).and_then(|b| b.join(&path)) {
            Ok(joined) => joined.to_string(),
            Err(e) => {
                log::warn!("Could not resolve {} against {}: {}", target, base, e);
                target.to_string()
            }
        }
    };

    proxied_url_for(config, &absolute)
}

/// URL-safe base64 without padding, the only form the thumbnail server reads.
pub fn farspark_encode_url(url: &str) -> String {
    URL_SAFE_NO_PAD.encode(url.as_bytes())
}

pub fn scaled_thumbnail_url_for(config: &ApiConfig, url: &str, width: u32, height: u32) -> String {
    if config.reticulum_server.contains("hubs.local") && url.contains("hubs.local") {
        return url.to_string();
    }

    format!(
        "{}/thumbnail/{}?w={}&h={}",
        config.thumbnail_server.trim_end_matches('/'),
        farspark_encode_url(url),
        width,
        height
    )
}

pub fn guess_content_type(url: &str) -> Option<&'static str> {
    let parsed = Url::parse(url).ok()?;
    let extension = parsed.path().rsplit('.').next()?.to_lowercase();

    KNOWN_CONTENT_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, content_type)| *content_type)
}

pub fn scene_url(config: &ApiConfig, scene_id: &str) -> String {
    if config.hubs_server == "localhost:8080" || config.hubs_server == "hubs.local:8080" {
        format!("https://{}/scene.html?scene_id={}", config.hubs_server, scene_id)
    } else {
        format!("https://{}/scenes/{}", config.hubs_server, scene_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ApiConfig {
        ApiConfig {
            reticulum_server: "https://api.example.com".to_string(),
            cors_proxy_server: Some("https://proxy.example.com".to_string()),
            thumbnail_server: "https://thumbs.example.com/".to_string(),
            non_cors_proxy_domains: vec!["assets.example.com".to_string()],
            hubs_server: "hubs.example.com".to_string(),
            ..ApiConfig::default()
        }
    }

    #[test]
    fn test_proxied_url_for() {
        let config = test_config();

        assert_eq!(
            proxied_url_for(&config, "https://other.org/a.png"),
            "https://proxy.example.com/https://other.org/a.png"
        );
        assert_eq!(
            proxied_url_for(&config, "https://cdn.assets.example.com/a.png"),
            "https://cdn.assets.example.com/a.png"
        );
        assert_eq!(proxied_url_for(&config, "blob:abc"), "blob:abc");
        assert_eq!(
            proxied_url_for(&config, "https://proxy.example.com/x"),
            "https://proxy.example.com/x"
        );
    }

    #[test]
    fn test_unproxy_url_resolves_relative_segments() {
        let config = test_config();
        let base = "https://proxy.example.com/https://video.org/live/index.m3u8";

        assert_eq!(
            unproxy_url(&config, base, "segment1.ts"),
            "https://proxy.example.com/https://video.org/segment1.ts"
        );
        assert_eq!(
            unproxy_url(&config, base, "https://proxy.example.com/https://video.org/x.ts"),
            "https://proxy.example.com/https://video.org/x.ts"
        );
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(
            guess_content_type("https://x.org/models/duck.glb?v=2"),
            Some("model/gltf-binary")
        );
        assert_eq!(guess_content_type("https://x.org/photo.JPG"), Some("image/jpeg"));
        assert_eq!(guess_content_type("https://x.org/page"), None);
        assert_eq!(guess_content_type("not a url"), None);
    }

    #[test]
    fn test_scaled_thumbnail_url() {
        let config = test_config();
        let url = scaled_thumbnail_url_for(&config, "https://x.org/a.png", 200, 200);

        assert!(url.starts_with("https://thumbs.example.com/thumbnail/"));
        assert!(url.ends_with("?w=200&h=200"));
        assert!(!url.contains("=="));
        assert_eq!(farspark_encode_url("https://x.org/?a"), "aHR0cHM6Ly94Lm9yZy8_YQ");
    }

    #[test]
    fn test_scene_url() {
        let mut config = test_config();
        assert_eq!(
            scene_url(&config, "abc"),
            "https://hubs.example.com/scenes/abc"
        );

        config.hubs_server = "localhost:8080".to_string();
        assert_eq!(
            scene_url(&config, "abc"),
            "https://localhost:8080/scene.html?scene_id=abc"
        );
    }
}
