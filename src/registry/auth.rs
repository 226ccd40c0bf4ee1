//! Registry authentication is deliberately out of scope for the replication
//! engine: token acquisition is treated as an external collaborator. All the
//! engine needs is an opaque bearer token string per registry, obtained
//! however the caller likes.

use async_trait::async_trait;

/// Supplies an opaque bearer token for a registry host. The engine never
/// parses a `WWW-Authenticate` challenge or talks to a token service itself;
/// implementors of this trait may do so, or simply hand back a
/// pre-obtained token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token_for(&self, registry_host: &str) -> Option<String>;
}

/// Reads `FREIGHTLINER_TOKEN_<REGISTRY_HOST>` (host uppercased, `.`/`-`
/// replaced with `_`) or falls back to `FREIGHTLINER_TOKEN`. Suitable for
/// CI/CLI use where a token is already available in the environment.
pub struct EnvTokenProvider;

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn token_for(&self, registry_host: &str) -> Option<String> {
        let key = format!(
            "FREIGHTLINER_TOKEN_{}",
            registry_host
                .to_uppercase()
                .replace(['.', '-'], "_")
        );
        std::env::var(key)
            .ok()
            .or_else(|| std::env::var("FREIGHTLINER_TOKEN").ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_to_generic_token() {
        std::env::remove_var("FREIGHTLINER_TOKEN_REGISTRY_EXAMPLE_COM");
        std::env::set_var("FREIGHTLINER_TOKEN", "generic-token");
        let provider = EnvTokenProvider;
        assert_eq!(
            provider.token_for("registry.example.com").await,
            Some("generic-token".to_string())
        );
        std::env::remove_var("FREIGHTLINER_TOKEN");
    }
}
