use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MediAgent";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Out-of-band contact channel offered when no availability exists.
pub const CONTACT_PHONE: &str = "01-422-0000";

/// Model used for conversational replies.
pub const DEFAULT_CHAT_MODEL: &str = "llama3.1:8b";
/// Model used for intent parsing — small on purpose, it only emits a number.
pub const DEFAULT_PARSE_MODEL: &str = "llama3.2:1b";

/// Environment variable overriding the Ollama base URL.
pub const OLLAMA_URL_ENV: &str = "MEDIAGENT_OLLAMA_URL";
/// Environment variable holding the Resend API key (email confirmations).
pub const RESEND_API_KEY_ENV: &str = "RESEND_API_KEY";
/// Environment variable overriding the confirmation sender address.
pub const EMAIL_FROM_ENV: &str = "MEDIAGENT_EMAIL_FROM";

/// Get the application data directory
/// ~/MediAgent/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("MediAgent")
}

/// Default path of the scheduling database.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("mediagent.db")
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "mediagent=info"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("MediAgent"));
    }

    #[test]
    fn db_path_under_app_data() {
        let db = default_db_path();
        assert!(db.starts_with(app_data_dir()));
        assert!(db.ends_with("mediagent.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
