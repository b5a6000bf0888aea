//! Configuration for Kalike
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::auth::MIN_SECRET_CHARS;

/// Kalike - server backend for the Kannada learning platform
#[derive(Parser, Debug, Clone)]
#[command(name = "kalike")]
#[command(about = "Server backend for the Kalike Kannada learning platform")]
pub struct Args {
    /// Unique node identifier for this server instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (relaxed auth, optional MongoDB)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "kalike")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Chat-completion endpoint for exercise feedback
    #[arg(
        long,
        env = "MODEL_API_URL",
        default_value = "https://api.openai.com/v1/chat/completions"
    )]
    pub model_api_url: String,

    /// API key for the language-model endpoint
    /// When unset, writing and speaking submissions are accepted ungraded
    #[arg(long, env = "MODEL_API_KEY")]
    pub model_api_key: Option<String>,

    /// Model name sent to the completion endpoint
    #[arg(long, env = "MODEL_NAME", default_value = "gpt-4o-mini")]
    pub model_name: String,

    /// Timeout for model API requests in milliseconds
    #[arg(long, env = "MODEL_TIMEOUT_MS", default_value = "15000")]
    pub model_timeout_ms: u64,

    /// Shared secret the payment provider sends in X-Webhook-Secret
    /// (required in production)
    #[arg(long, env = "PAYMENT_WEBHOOK_SECRET")]
    pub payment_webhook_secret: Option<String>,

    /// Base URL of the provider-hosted checkout page
    #[arg(
        long,
        env = "CHECKOUT_URL_BASE",
        default_value = "https://pay.kalike.app/checkout"
    )]
    pub checkout_url_base: String,

    /// Maximum concurrent chat connections per room
    #[arg(long, env = "CHAT_MAX_CLIENTS", default_value = "256")]
    pub chat_max_clients: usize,
}

impl Args {
    /// Effective JWT secret: configured value, or the fixed dev-mode secret.
    /// None only in misconfigured production, which `validate` rejects.
    pub fn jwt_secret(&self) -> Option<String> {
        if self.dev_mode {
            Some(
                self.jwt_secret
                    .clone()
                    .unwrap_or_else(|| "dev-only-insecure-secret-0123456789abcdef".to_string()),
            )
        } else {
            self.jwt_secret.clone()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match &self.jwt_secret {
                None => return Err("JWT_SECRET is required in production mode".to_string()),
                // Reject short secrets here so misconfiguration fails at
                // startup, not on the first login
                Some(secret) if secret.chars().count() < MIN_SECRET_CHARS => {
                    return Err(format!(
                        "JWT_SECRET must be at least {} characters",
                        MIN_SECRET_CHARS
                    ));
                }
                Some(_) => {}
            }
            if self.payment_webhook_secret.is_none() {
                return Err(
                    "PAYMENT_WEBHOOK_SECRET is required in production mode".to_string()
                );
            }
        }

        if self.chat_max_clients == 0 {
            return Err("CHAT_MAX_CLIENTS must be at least 1".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        // --dev-mode is a bare flag, it takes no value
        Args::parse_from(["kalike", "--dev-mode"])
    }

    #[test]
    fn test_dev_mode_needs_no_secrets() {
        let args = base_args();
        assert!(args.validate().is_ok());
        assert!(args.jwt_secret().is_some());
    }

    #[test]
    fn test_production_requires_secrets() {
        let args = Args::parse_from(["kalike"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from([
            "kalike",
            "--jwt-secret",
            "a-secret-that-is-at-least-32-characters",
        ]);
        // Still missing the webhook secret
        assert!(args.validate().is_err());

        let args = Args::parse_from([
            "kalike",
            "--jwt-secret",
            "a-secret-that-is-at-least-32-characters",
            "--payment-webhook-secret",
            "whsec_test",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_zero_chat_clients_rejected() {
        let args = Args::parse_from(["kalike", "--dev-mode", "--chat-max-clients", "0"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_dev_mode_flag_rejects_a_value() {
        assert!(Args::try_parse_from(["kalike", "--dev-mode", "true"]).is_err());
    }

    #[test]
    fn test_short_production_jwt_secret_rejected_at_startup() {
        let args = Args::parse_from([
            "kalike",
            "--jwt-secret",
            "too-short",
            "--payment-webhook-secret",
            "whsec_test",
        ]);
        let err = args.validate().unwrap_err();
        assert!(err.contains("at least 32 characters"));
    }
}
